//! Attribute lookup table parser.
//!
//! Accepted file shape:
//! - Row 1: `BuildingID` followed by one attribute name per column
//!   (e.g. `BuildingID, yearOfConstruction, function, comment`)
//! - Row 2: `attribute_type` (or empty) followed by a schema tag per column
//!   (`bldg`/`building` or `gen`/`generic`)
//! - Data rows keyed by building identifier; empty cells mean "no value".

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use cityprep_shared::{AttributeTarget, CityPrepError, Result, RowIssue};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One attribute column with its target schema.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Attribute name as it will appear in the document.
    pub name: String,
    /// Schema namespace the value is routed to.
    pub target: AttributeTarget,
}

/// Values of one accepted data row, aligned with the table's columns.
#[derive(Debug, Clone)]
pub struct TableRow {
    /// 1-based row number in the source file.
    pub row_number: usize,
    /// One entry per column; `None` where the cell was empty.
    pub values: Vec<Option<String>>,
}

/// A parsed attribute lookup table.
///
/// Malformed rows are collected as issues instead of aborting the parse;
/// only structural problems in the two header rows are fatal.
#[derive(Debug)]
pub struct AttributeTable {
    columns: Vec<ColumnSpec>,
    rows: BTreeMap<String, TableRow>,
    issues: Vec<RowIssue>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl AttributeTable {
    /// Read a lookup table from a CSV file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| CityPrepError::io(path, e))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Read a lookup table from any reader.
    pub fn from_reader(reader: impl io::Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = rdr.records();

        let header = next_record(&mut records)?
            .ok_or_else(|| CityPrepError::Lookup("table is empty".into()))?;
        let type_row = next_record(&mut records)?.ok_or_else(|| {
            CityPrepError::Lookup("missing attribute-type row (expected on row 2)".into())
        })?;

        let columns = parse_headers(&header, &type_row)?;

        let mut rows: BTreeMap<String, TableRow> = BTreeMap::new();
        let mut issues = Vec::new();

        // Data rows start on row 3; header rows occupy rows 1 and 2.
        for (i, record) in records.enumerate() {
            let row_number = i + 3;
            let record = record.map_err(|e| {
                CityPrepError::Lookup(format!("row {row_number}: unreadable record: {e}"))
            })?;

            match parse_data_row(&record, row_number, &columns) {
                Ok((id, row)) => {
                    if rows.contains_key(&id) {
                        issues.push(RowIssue::for_building(
                            row_number,
                            id,
                            "duplicate identifier, keeping first occurrence",
                        ));
                    } else {
                        rows.insert(id, row);
                    }
                }
                Err(issue) => issues.push(issue),
            }
        }

        tracing::debug!(
            rows = rows.len(),
            columns = columns.len(),
            issues = issues.len(),
            "lookup table parsed"
        );

        Ok(Self {
            columns,
            rows,
            issues,
        })
    }

    /// Attribute columns in file order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Look up the row for a building identifier.
    pub fn get(&self, id: &str) -> Option<&TableRow> {
        self.rows.get(id)
    }

    /// All building identifiers in the table, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Number of accepted data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no data row was accepted.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Malformed rows rejected during parsing.
    pub fn issues(&self) -> &[RowIssue] {
        &self.issues
    }

    /// Drain the collected issues into a run report.
    pub fn take_issues(&mut self) -> Vec<RowIssue> {
        std::mem::take(&mut self.issues)
    }
}

fn next_record(
    records: &mut csv::StringRecordsIter<'_, impl io::Read>,
) -> Result<Option<csv::StringRecord>> {
    match records.next() {
        Some(Ok(record)) => Ok(Some(record)),
        Some(Err(e)) => Err(CityPrepError::Lookup(format!("unreadable header row: {e}"))),
        None => Ok(None),
    }
}

fn parse_headers(header: &csv::StringRecord, type_row: &csv::StringRecord) -> Result<Vec<ColumnSpec>> {
    let id_header = clean_cell(header.get(0).unwrap_or_default());
    if !id_header.eq_ignore_ascii_case("BuildingID") {
        return Err(CityPrepError::Lookup(format!(
            "first header cell must be `BuildingID`, found `{id_header}`"
        )));
    }

    let names: Vec<String> = header.iter().skip(1).map(clean_cell).collect();
    if names.is_empty() {
        return Err(CityPrepError::Lookup(
            "table has no attribute columns".into(),
        ));
    }
    if let Some(pos) = names.iter().position(String::is_empty) {
        return Err(CityPrepError::Lookup(format!(
            "attribute column {} has an empty name",
            pos + 2
        )));
    }

    let label = clean_cell(type_row.get(0).unwrap_or_default());
    if !label.is_empty() && !label.eq_ignore_ascii_case("attribute_type") {
        return Err(CityPrepError::Lookup(format!(
            "row 2 must be the attribute-type row, found leading cell `{label}`"
        )));
    }

    let tags: Vec<String> = type_row.iter().skip(1).map(clean_cell).collect();
    if tags.len() != names.len() {
        return Err(CityPrepError::Lookup(format!(
            "attribute-type row has {} tags for {} columns",
            tags.len(),
            names.len()
        )));
    }

    names
        .into_iter()
        .zip(tags)
        .map(|(name, tag)| {
            let target = AttributeTarget::from_tag(&tag).ok_or_else(|| {
                CityPrepError::Lookup(format!(
                    "column `{name}`: unknown schema tag `{tag}` (expected `bldg` or `gen`)"
                ))
            })?;
            Ok(ColumnSpec { name, target })
        })
        .collect()
}

fn parse_data_row(
    record: &csv::StringRecord,
    row_number: usize,
    columns: &[ColumnSpec],
) -> std::result::Result<(String, TableRow), RowIssue> {
    let id = clean_cell(record.get(0).unwrap_or_default());
    if id.is_empty() {
        return Err(RowIssue::anonymous(row_number, "missing identifier"));
    }

    if record.len() > columns.len() + 1 {
        return Err(RowIssue::for_building(
            row_number,
            id,
            format!(
                "expected at most {} fields, found {}",
                columns.len() + 1,
                record.len()
            ),
        ));
    }

    // Trailing empty cells may be omitted entirely; missing means "no value".
    let mut values = Vec::with_capacity(columns.len());
    for (j, column) in columns.iter().enumerate() {
        let cell = clean_cell(record.get(j + 1).unwrap_or_default());
        if cell.is_empty() {
            values.push(None);
            continue;
        }

        if column.name == "yearOfConstruction" && cell.parse::<i32>().is_err() {
            return Err(RowIssue::for_building(
                row_number,
                id,
                format!("unparseable yearOfConstruction `{cell}`"),
            ));
        }

        values.push(Some(cell));
    }

    Ok((id, TableRow { row_number, values }))
}

/// Trim a cell and strip one layer of surrounding double quotes.
///
/// Tables exported with a space after each comma defeat the CSV quoting
/// rules (`, "text"` keeps the quotes in the field), so both spellings of
/// the quoted-comment column arrive here.
fn clean_cell(cell: &str) -> String {
    let trimmed = cell.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = "\
BuildingID, yearOfConstruction, function, comment
attribute_type, bldg, bldg, gen
DEBW_LOD2_2960, 1978, 1010, \"Some old residential building\"
DEBW_LOD2_2961, 2003, 2020,
";

    #[test]
    fn parses_two_header_rows_and_data() {
        let table = AttributeTable::from_reader(BASIC.as_bytes()).expect("parse");

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns().len(), 3);
        assert_eq!(table.columns()[0].name, "yearOfConstruction");
        assert_eq!(table.columns()[0].target, AttributeTarget::Building);
        assert_eq!(table.columns()[2].name, "comment");
        assert_eq!(table.columns()[2].target, AttributeTarget::Generic);
        assert!(table.issues().is_empty());
    }

    #[test]
    fn values_survive_quoting_and_padding() {
        let table = AttributeTable::from_reader(BASIC.as_bytes()).expect("parse");

        let row = table.get("DEBW_LOD2_2960").expect("row present");
        assert_eq!(row.values[0].as_deref(), Some("1978"));
        assert_eq!(row.values[1].as_deref(), Some("1010"));
        assert_eq!(
            row.values[2].as_deref(),
            Some("Some old residential building")
        );
    }

    #[test]
    fn empty_cells_mean_no_value() {
        let table = AttributeTable::from_reader(BASIC.as_bytes()).expect("parse");

        let row = table.get("DEBW_LOD2_2961").expect("row present");
        assert_eq!(row.values[2], None);
    }

    #[test]
    fn duplicate_identifier_keeps_first_and_reports() {
        let input = "\
BuildingID,yearOfConstruction
attribute_type,bldg
b1,1950
b1,1999
";
        let table = AttributeTable::from_reader(input.as_bytes()).expect("parse");

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get("b1").unwrap().values[0].as_deref(),
            Some("1950")
        );
        assert_eq!(table.issues().len(), 1);
        assert_eq!(table.issues()[0].row, 4);
        assert!(table.issues()[0].message.contains("duplicate"));
    }

    #[test]
    fn unparseable_year_rejects_row() {
        let input = "\
BuildingID,yearOfConstruction
attribute_type,bldg
b1,around 1950
b2,1950
";
        let table = AttributeTable::from_reader(input.as_bytes()).expect("parse");

        assert!(table.get("b1").is_none());
        assert!(table.get("b2").is_some());
        assert_eq!(table.issues().len(), 1);
        assert_eq!(table.issues()[0].building_id.as_deref(), Some("b1"));
    }

    #[test]
    fn missing_identifier_reported_with_row_number() {
        let input = "\
BuildingID,function
attribute_type,bldg
,1010
";
        let table = AttributeTable::from_reader(input.as_bytes()).expect("parse");

        assert!(table.is_empty());
        assert_eq!(table.issues().len(), 1);
        assert_eq!(table.issues()[0].row, 3);
    }

    #[test]
    fn too_many_fields_rejects_row() {
        let input = "\
BuildingID,function
attribute_type,bldg
b1,1010,extra
";
        let table = AttributeTable::from_reader(input.as_bytes()).expect("parse");

        assert!(table.is_empty());
        assert_eq!(table.issues().len(), 1);
        assert!(table.issues()[0].message.contains("fields"));
    }

    #[test]
    fn unknown_schema_tag_is_fatal() {
        let input = "\
BuildingID,function
attribute_type,xal
b1,1010
";
        let err = AttributeTable::from_reader(input.as_bytes()).expect_err("must fail");
        assert!(err.to_string().contains("unknown schema tag"));
    }

    #[test]
    fn missing_type_row_is_fatal() {
        let input = "BuildingID,function\n";
        let err = AttributeTable::from_reader(input.as_bytes()).expect_err("must fail");
        assert!(err.to_string().contains("attribute-type row"));
    }

    #[test]
    fn wrong_id_header_is_fatal() {
        let input = "Id,function\nattribute_type,bldg\n";
        let err = AttributeTable::from_reader(input.as_bytes()).expect_err("must fail");
        assert!(err.to_string().contains("BuildingID"));
    }
}
