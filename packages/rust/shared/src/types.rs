//! Core domain types for cityprep run reports.

use serde::{Deserialize, Serialize};

/// Current schema version for JSON run reports.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// AttributeTarget
// ---------------------------------------------------------------------------

/// Target schema for a lookup-table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeTarget {
    /// Standardized building attribute (`bldg` namespace child element).
    Building,
    /// Generic attribute (`gen:stringAttribute` entry).
    Generic,
}

impl AttributeTarget {
    /// Parse a schema tag from the table's attribute-type row.
    ///
    /// Accepts the short and long spellings used in the field
    /// (`bldg`/`building`, `gen`/`generic`), case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "bldg" | "building" => Some(Self::Building),
            "gen" | "generic" => Some(Self::Generic),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttributeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Building => write!(f, "bldg"),
            Self::Generic => write!(f, "gen"),
        }
    }
}

// ---------------------------------------------------------------------------
// Row issues
// ---------------------------------------------------------------------------

/// A single problem found while processing one row or record.
///
/// Carries enough context (identifier, row number) for manual correction of
/// the source data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowIssue {
    /// 1-based row number in the source file (header rows included).
    pub row: usize,
    /// Building identifier, when one could be read from the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_id: Option<String>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl RowIssue {
    /// Issue attached to a known building identifier.
    pub fn for_building(row: usize, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row,
            building_id: Some(id.into()),
            message: message.into(),
        }
    }

    /// Issue with no usable identifier.
    pub fn anonymous(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            building_id: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.building_id {
            Some(id) => write!(f, "row {}: {} ({})", self.row, self.message, id),
            None => write!(f, "row {}: {}", self.row, self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// InsertReport
// ---------------------------------------------------------------------------

/// Outcome of one attribute-insertion run over one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertReport {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Buildings present in both the document and the table.
    pub buildings_matched: usize,
    /// Attribute values written (inserted or overwritten).
    pub attributes_written: usize,
    /// Table identifiers with no building in the document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched_ids: Vec<String>,
    /// Malformed rows rejected during table parsing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<RowIssue>,
}

impl InsertReport {
    /// Fresh report with current schema version and zeroed counters.
    pub fn new() -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            buildings_matched: 0,
            attributes_written: 0,
            unmatched_ids: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// True when any row failed and the run must exit non-zero.
    pub fn has_failures(&self) -> bool {
        !self.unmatched_ids.is_empty() || !self.issues.is_empty()
    }
}

impl Default for InsertReport {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// RemapReport
// ---------------------------------------------------------------------------

/// An occurrence of a use-type code missing from the translation table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownCode {
    /// `gml:id` of the building carrying the code, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_id: Option<String>,
    /// The unmapped source code.
    pub code: String,
}

/// Outcome of one use-type remapping run over one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemapReport {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Codes replaced via the translation table.
    pub replaced: usize,
    /// Codes replaced by the configured default.
    pub defaulted: usize,
    /// Codes outside the translation table that were left unchanged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown: Vec<UnknownCode>,
}

impl RemapReport {
    /// Fresh report with current schema version and zeroed counters.
    pub fn new() -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            replaced: 0,
            defaulted: 0,
            unknown: Vec::new(),
        }
    }

    /// True when unknown codes were left unchanged in the output.
    pub fn has_failures(&self) -> bool {
        !self.unknown.is_empty()
    }
}

impl Default for RemapReport {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// MergeReport
// ---------------------------------------------------------------------------

/// Outcome of merging several documents into one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Number of input documents consumed.
    pub documents: usize,
    /// City-object members appended from the non-base documents.
    pub members_appended: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_target_accepts_both_spellings() {
        assert_eq!(
            AttributeTarget::from_tag("bldg"),
            Some(AttributeTarget::Building)
        );
        assert_eq!(
            AttributeTarget::from_tag("Building"),
            Some(AttributeTarget::Building)
        );
        assert_eq!(
            AttributeTarget::from_tag(" GEN "),
            Some(AttributeTarget::Generic)
        );
        assert_eq!(AttributeTarget::from_tag("xal"), None);
    }

    #[test]
    fn insert_report_serialization() {
        let mut report = InsertReport::new();
        report.buildings_matched = 3;
        report.attributes_written = 7;
        report.unmatched_ids.push("DEBW_LOD2_1".into());

        let json = serde_json::to_string_pretty(&report).expect("serialize");
        let parsed: InsertReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.schema_version, REPORT_SCHEMA_VERSION);
        assert_eq!(parsed.buildings_matched, 3);
        assert!(parsed.has_failures());
    }

    #[test]
    fn remap_report_without_unknowns_passes() {
        let mut report = RemapReport::new();
        report.replaced = 12;
        assert!(!report.has_failures());

        report.unknown.push(UnknownCode {
            building_id: Some("b1".into()),
            code: "31001_9999".into(),
        });
        assert!(report.has_failures());
    }

    #[test]
    fn merge_report_serialization() {
        let report = MergeReport {
            schema_version: REPORT_SCHEMA_VERSION,
            documents: 2,
            members_appended: 5,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        let parsed: MergeReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.documents, 2);
        assert_eq!(parsed.members_appended, 5);
    }

    #[test]
    fn row_issue_display_includes_context() {
        let issue = RowIssue::for_building(4, "DEBW_LOD2_2960", "duplicate identifier");
        let text = issue.to_string();
        assert!(text.contains("row 4"));
        assert!(text.contains("DEBW_LOD2_2960"));
    }
}
