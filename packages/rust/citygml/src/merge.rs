//! Merge several CityGML documents into one.
//!
//! The first document is the base; every direct child of each further
//! document's root is appended before the base root's closing tag, copied
//! verbatim. Inputs are expected to share namespace prefix declarations.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, Event};

use cityprep_shared::{CityPrepError, MergeReport, REPORT_SCHEMA_VERSION, Result};

/// Merge `others` into `base`, appending their root children.
pub fn merge_documents(base: &str, others: &[&str]) -> Result<(String, MergeReport)> {
    let mut reader = Reader::from_str(base);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut root_name: Option<String> = None;
    let mut members_appended = 0usize;

    loop {
        match reader.read_event().map_err(parse_err(&reader))? {
            Event::Start(e) => {
                if depth == 0 {
                    root_name = Some(local_of(e.name()));
                }
                depth += 1;
                writer.write_event(Event::Start(e)).map_err(write_err)?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    for other in others {
                        members_appended +=
                            copy_members(other, root_name.as_deref(), &mut writer)?;
                    }
                }
                writer.write_event(Event::End(e)).map_err(write_err)?;
            }
            Event::Empty(e) if depth == 0 => {
                // Self-closing root: reopen it so members have somewhere to go.
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                root_name = Some(local_of(e.name()));
                writer.write_event(Event::Start(e)).map_err(write_err)?;
                for other in others {
                    members_appended += copy_members(other, root_name.as_deref(), &mut writer)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new(tag)))
                    .map_err(write_err)?;
            }
            Event::Eof => break,
            other => {
                writer.write_event(other).map_err(write_err)?;
            }
        }
    }

    if root_name.is_none() {
        return Err(CityPrepError::citygml("base document has no root element"));
    }

    let report = MergeReport {
        schema_version: REPORT_SCHEMA_VERSION,
        documents: 1 + others.len(),
        members_appended,
    };

    tracing::info!(
        documents = report.documents,
        members = report.members_appended,
        "documents merged"
    );

    String::from_utf8(writer.into_inner())
        .map(|out| (out, report))
        .map_err(|e| CityPrepError::citygml(format!("output is not valid UTF-8: {e}")))
}

/// Copy the direct children of a document's root into the writer.
///
/// Returns the number of child elements copied.
fn copy_members(
    xml: &str,
    base_root: Option<&str>,
    writer: &mut Writer<Vec<u8>>,
) -> Result<usize> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut inside_root = false;
    let mut members = 0usize;

    loop {
        match reader.read_event().map_err(parse_err(&reader))? {
            Event::Start(e) => {
                if !inside_root {
                    check_root(base_root, e.name());
                    inside_root = true;
                    continue;
                }
                if depth == 0 {
                    members += 1;
                }
                depth += 1;
                writer.write_event(Event::Start(e)).map_err(write_err)?;
            }
            Event::End(e) => {
                if depth == 0 {
                    // Root end of the copied document.
                    break;
                }
                depth -= 1;
                writer.write_event(Event::End(e)).map_err(write_err)?;
            }
            Event::Empty(e) => {
                if !inside_root {
                    // Self-closing root: nothing to copy.
                    check_root(base_root, e.name());
                    break;
                }
                if depth == 0 {
                    members += 1;
                }
                writer.write_event(Event::Empty(e)).map_err(write_err)?;
            }
            Event::Eof => {
                if inside_root {
                    return Err(CityPrepError::citygml(
                        "unexpected end of input inside merged document",
                    ));
                }
                break;
            }
            Event::Decl(_) | Event::DocType(_) => {}
            other => {
                if inside_root {
                    writer.write_event(other).map_err(write_err)?;
                }
            }
        }
    }

    Ok(members)
}

fn check_root(base_root: Option<&str>, name: quick_xml::name::QName<'_>) {
    let local = local_of(name);
    if let Some(base) = base_root {
        if base != local {
            tracing::warn!(
                base,
                other = %local,
                "merging documents with different root elements"
            );
        }
    }
}

fn local_of(name: quick_xml::name::QName<'_>) -> String {
    String::from_utf8_lossy(name.local_name().as_ref()).into_owned()
}

fn parse_err<'a>(reader: &'a Reader<&'a [u8]>) -> impl Fn(quick_xml::Error) -> CityPrepError + 'a {
    move |e| {
        CityPrepError::citygml(format!(
            "parse error at byte {}: {e}",
            reader.buffer_position()
        ))
    }
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

    const NS: &str = concat!(
        r#"xmlns:gml="http://www.opengis.net/gml" "#,
        r#"xmlns:bldg="http://www.opengis.net/citygml/building/1.0""#
    );

    fn model(members: &str) -> String {
        format!("<CityModel {NS}>{members}</CityModel>")
    }

    fn member(id: &str) -> String {
        format!(
            "<cityObjectMember><bldg:Building gml:id=\"{id}\"/></cityObjectMember>"
        )
    }

    #[test]
    fn appends_members_of_every_further_document() {
        let base = model(&member("a"));
        let second = model(&(member("b") + &member("c")));
        let third = model(&member("d"));

        let (out, report) =
            merge_documents(&base, &[second.as_str(), third.as_str()]).expect("merge");

        for id in ["a", "b", "c", "d"] {
            assert!(out.contains(&format!("gml:id=\"{id}\"")), "missing {id}");
        }
        assert_eq!(report.documents, 3);
        assert_eq!(report.members_appended, 3);
        // Members land inside the (single) root element.
        assert_eq!(out.matches("<CityModel").count(), 1);
        assert!(out.ends_with("</CityModel>"));
    }

    #[test]
    fn base_member_order_is_preserved() {
        let base = model(&member("a"));
        let second = model(&member("b"));
        let (out, _) = merge_documents(&base, &[second.as_str()]).expect("merge");

        let a = out.find("gml:id=\"a\"").expect("a");
        let b = out.find("gml:id=\"b\"").expect("b");
        assert!(a < b);
    }

    #[test]
    fn self_closing_base_root_is_reopened() {
        let base = format!("<CityModel {NS}/>");
        let second = model(&member("b"));
        let (out, report) = merge_documents(&base, &[second.as_str()]).expect("merge");

        assert!(out.contains("gml:id=\"b\""));
        assert!(out.ends_with("</CityModel>"));
        assert_eq!(report.members_appended, 1);
    }

    #[test]
    fn nested_children_are_not_counted_as_members() {
        let base = model(&member("a"));
        let second = model(
            "<cityObjectMember><bldg:Building gml:id=\"b\">\
             <bldg:measuredHeight>7.4</bldg:measuredHeight>\
             </bldg:Building></cityObjectMember>",
        );
        let (out, report) = merge_documents(&base, &[second.as_str()]).expect("merge");

        assert_eq!(report.members_appended, 1);
        assert!(out.contains("<bldg:measuredHeight>7.4</bldg:measuredHeight>"));
    }

    #[test]
    fn base_without_root_is_an_error() {
        let err = merge_documents("  ", &[]).expect_err("must fail");
        assert!(err.to_string().contains("root"));
    }
}
