//! Use-type remapping: translate `bldg:function` codes between vocabularies.
//!
//! LoD2 exports carry ALKIS-prefixed building-function codes
//! (`31001_1010`); the simulation side expects the plain CityGML code
//! (`1010`). The translation table is closed: codes it does not list are
//! reported instead of guessed at, so typos in source data surface early.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesText, Event};

use cityprep_shared::{CityPrepError, RemapReport, Result, UnknownCode};

use crate::namespaces::{NamespaceContext, Schema};

/// Remapping behavior for codes outside the translation table.
#[derive(Debug, Clone, Default)]
pub struct UsetypeOptions {
    /// Replacement for unknown codes; `None` leaves them unchanged.
    pub default_code: Option<String>,
    /// Extra source → target pairs consulted before the built-in table.
    pub overrides: BTreeMap<String, String>,
}

/// Built-in ALKIS → CityGML building-function translation table.
pub fn builtin_code(code: &str) -> Option<&'static str> {
    let target = match code {
        // residential
        "31001_1000" => "1000",
        "31001_1010" => "1010",
        "31001_1020" => "1020",
        "31001_1021" => "1021",
        "31001_1022" => "1022",
        "31001_1023" => "1023",
        "31001_1024" => "1024",
        "31001_1025" => "1025",
        // mixed use
        "31001_1100" => "1100",
        "31001_1110" => "1110",
        "31001_1120" => "1120",
        "31001_1121" => "1121",
        "31001_1122" => "1122",
        "31001_1123" => "1123",
        "31001_1130" => "1130",
        "31001_1131" => "1131",
        // trade and industry
        "31001_2000" => "2000",
        "31001_2010" => "2010",
        "31001_2020" => "2020",
        "31001_2030" => "2030",
        "31001_2040" => "2040",
        "31001_2050" => "2050",
        "31001_2051" => "2051",
        "31001_2052" => "2052",
        "31001_2100" => "2100",
        "31001_2110" => "2110",
        "31001_2120" => "2120",
        "31001_2140" => "2140",
        // public
        "31001_3000" => "3000",
        "31001_3010" => "3010",
        "31001_3020" => "3020",
        "31001_3021" => "3021",
        "31001_3023" => "3023",
        "31001_3040" => "3040",
        "31001_3041" => "3041",
        "31001_3060" => "3060",
        "31001_3070" => "3070",
        _ => return None,
    };
    Some(target)
}

#[derive(Default)]
struct Frame {
    building_id: Option<String>,
    /// Set while inside a `bldg:function` whose text was already rewritten.
    function_rewritten: bool,
    in_function: bool,
}

/// Remap every `bldg:function` code in a document.
///
/// Returns the rewritten document and a report; codes left unchanged are
/// listed in [`RemapReport::unknown`] with the owning building's `gml:id`.
pub fn remap_usetypes(xml: &str, opts: &UsetypeOptions) -> Result<(String, RemapReport)> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut report = RemapReport::new();
    let mut ns = NamespaceContext::default();
    let mut stack: Vec<Frame> = Vec::new();
    let mut seen_root = false;

    loop {
        let ev = reader.read_event().map_err(|e| {
            CityPrepError::citygml(format!(
                "parse error at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match ev {
            Event::Start(e) => {
                if !seen_root {
                    ns = NamespaceContext::from_root(&e)?;
                    seen_root = true;
                }
                let mut frame = Frame::default();
                if ns.is_building(e.name()) {
                    frame.building_id = ns.gml_id(&e)?;
                } else if ns.in_schema(e.name(), Schema::Building)
                    && e.name().local_name().as_ref() == b"function"
                {
                    frame.in_function = true;
                }
                writer.write_event(Event::Start(e)).map_err(write_err)?;
                stack.push(frame);
            }
            Event::End(e) => {
                stack.pop();
                writer.write_event(Event::End(e)).map_err(write_err)?;
            }
            Event::Text(t) => {
                let Some(frame) = stack.last_mut().filter(|f| f.in_function) else {
                    writer.write_event(Event::Text(t)).map_err(write_err)?;
                    continue;
                };
                if frame.function_rewritten {
                    continue;
                }

                let text = t
                    .unescape()
                    .map_err(|e| CityPrepError::citygml(format!("bad text content: {e}")))?;
                let code = text.trim();
                if code.is_empty() {
                    writer.write_event(Event::Text(t)).map_err(write_err)?;
                    continue;
                }

                let mapped = opts
                    .overrides
                    .get(code)
                    .map(String::as_str)
                    .or_else(|| builtin_code(code));

                match mapped {
                    Some(target) => {
                        writer
                            .write_event(Event::Text(BytesText::new(target)))
                            .map_err(write_err)?;
                        frame.function_rewritten = true;
                        report.replaced += 1;
                    }
                    None => {
                        let building_id = nearest_building_id(&stack);
                        if let Some(default) = &opts.default_code {
                            tracing::warn!(
                                code,
                                building_id = ?building_id,
                                default = %default,
                                "use-type code not in translation table, applying default"
                            );
                            writer
                                .write_event(Event::Text(BytesText::new(default)))
                                .map_err(write_err)?;
                            // frame borrow ended above; re-borrow to flag it
                            if let Some(frame) = stack.last_mut() {
                                frame.function_rewritten = true;
                            }
                            report.defaulted += 1;
                        } else {
                            tracing::warn!(
                                code,
                                building_id = ?building_id,
                                "use-type code not in translation table, leaving unchanged"
                            );
                            report.unknown.push(UnknownCode {
                                building_id,
                                code: code.to_string(),
                            });
                            writer.write_event(Event::Text(t)).map_err(write_err)?;
                        }
                    }
                }
            }
            Event::Eof => break,
            other => {
                writer.write_event(other).map_err(write_err)?;
            }
        }
    }

    tracing::info!(
        replaced = report.replaced,
        defaulted = report.defaulted,
        unknown = report.unknown.len(),
        "use types remapped"
    );

    String::from_utf8(writer.into_inner())
        .map(|out| (out, report))
        .map_err(|e| CityPrepError::citygml(format!("output is not valid UTF-8: {e}")))
}

fn nearest_building_id(stack: &[Frame]) -> Option<String> {
    stack.iter().rev().find_map(|f| f.building_id.clone())
}

fn write_err(e: impl std::fmt::Display) -> CityPrepError {
    CityPrepError::citygml(format!("write error: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(function: &str) -> String {
        format!(
            concat!(
                r#"<CityModel xmlns:gml="http://www.opengis.net/gml" "#,
                r#"xmlns:bldg="http://www.opengis.net/citygml/building/1.0">"#,
                r#"<cityObjectMember>"#,
                r#"<bldg:Building gml:id="b1">"#,
                r#"<bldg:function>{}</bldg:function>"#,
                r#"</bldg:Building>"#,
                r#"</cityObjectMember>"#,
                r#"</CityModel>"#
            ),
            function
        )
    }

    #[test]
    fn known_codes_are_replaced() {
        let (out, report) = remap_usetypes(&doc("31001_1010"), &UsetypeOptions::default())
            .expect("remap");

        assert!(out.contains("<bldg:function>1010</bldg:function>"));
        assert_eq!(report.replaced, 1);
        assert!(!report.has_failures());
    }

    #[test]
    fn unknown_codes_are_reported_and_left_unchanged() {
        let (out, report) = remap_usetypes(&doc("31001_9999"), &UsetypeOptions::default())
            .expect("remap");

        assert!(out.contains("<bldg:function>31001_9999</bldg:function>"));
        assert_eq!(report.replaced, 0);
        assert_eq!(report.unknown.len(), 1);
        assert_eq!(report.unknown[0].code, "31001_9999");
        assert_eq!(report.unknown[0].building_id.as_deref(), Some("b1"));
        assert!(report.has_failures());
    }

    #[test]
    fn configured_default_replaces_unknown_codes() {
        let opts = UsetypeOptions {
            default_code: Some("2000".to_string()),
            ..Default::default()
        };
        let (out, report) = remap_usetypes(&doc("31001_9999"), &opts).expect("remap");

        assert!(out.contains("<bldg:function>2000</bldg:function>"));
        assert_eq!(report.defaulted, 1);
        assert!(report.unknown.is_empty());
        assert!(!report.has_failures());
    }

    #[test]
    fn overrides_win_over_builtin_table() {
        let mut opts = UsetypeOptions::default();
        opts.overrides
            .insert("31001_1010".to_string(), "9000".to_string());
        let (out, report) = remap_usetypes(&doc("31001_1010"), &opts).expect("remap");

        assert!(out.contains("<bldg:function>9000</bldg:function>"));
        assert_eq!(report.replaced, 1);
    }

    #[test]
    fn functions_in_building_parts_are_remapped() {
        let xml = doc("31001_1010").replace(
            "</bldg:Building>",
            concat!(
                r#"<bldg:consistsOfBuildingPart>"#,
                r#"<bldg:BuildingPart gml:id="p1">"#,
                r#"<bldg:function>31001_2020</bldg:function>"#,
                r#"</bldg:BuildingPart>"#,
                r#"</bldg:consistsOfBuildingPart>"#,
                r#"</bldg:Building>"#
            ),
        );
        let (out, report) = remap_usetypes(&xml, &UsetypeOptions::default()).expect("remap");

        assert!(out.contains("<bldg:function>1010</bldg:function>"));
        assert!(out.contains("<bldg:function>2020</bldg:function>"));
        assert_eq!(report.replaced, 2);
    }

    #[test]
    fn non_function_text_passes_through() {
        let xml = doc("31001_1010").replace(
            "<bldg:function>31001_1010</bldg:function>",
            "<bldg:roofType>31001_1010</bldg:roofType>",
        );
        let (out, report) = remap_usetypes(&xml, &UsetypeOptions::default()).expect("remap");

        assert!(out.contains("<bldg:roofType>31001_1010</bldg:roofType>"));
        assert_eq!(report.replaced, 0);
        assert!(report.unknown.is_empty());
    }

    #[test]
    fn builtin_table_is_prefix_consistent() {
        assert_eq!(builtin_code("31001_1010"), Some("1010"));
        assert_eq!(builtin_code("31001_3041"), Some("3041"));
        assert_eq!(builtin_code("1010"), None);
        assert_eq!(builtin_code(""), None);
    }
}
