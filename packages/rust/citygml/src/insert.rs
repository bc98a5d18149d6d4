//! Attribute insertion: route lookup-table values into building elements.
//!
//! Two passes per document. The scan pass (see [`crate::scan`]) indexes
//! buildings and their existing attributes; the rewrite pass streams every
//! event through a writer, overwriting existing attribute text in place and
//! inserting what is missing. Generic attributes go directly after the
//! building start tag, building attributes directly before the end tag.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use cityprep_lookup::AttributeTable;
use cityprep_shared::{AttributeTarget, CityPrepError, InsertReport, Result};

use crate::namespaces::{GEN_NS, NamespaceContext, Schema};
use crate::scan::scan_document;

/// Formatting options for inserted elements.
#[derive(Debug, Clone)]
pub struct InsertOptions {
    /// Give every inserted element its own indented line.
    pub pretty: bool,
    /// Spaces per nesting level when `pretty` is set.
    pub indent: usize,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            indent: 2,
        }
    }
}

/// Everything to be written into one building.
#[derive(Debug, Default)]
struct Plan {
    gen_inserts: Vec<(String, String)>,
    gen_overwrites: HashMap<String, String>,
    bldg_overwrites: HashMap<String, String>,
    bldg_appends: Vec<(String, String)>,
}

impl Plan {
    fn writes(&self) -> usize {
        self.gen_inserts.len()
            + self.gen_overwrites.len()
            + self.bldg_overwrites.len()
            + self.bldg_appends.len()
    }
}

#[derive(Default)]
struct Frame {
    building: Option<Plan>,
    suppress_text: bool,
    gen_value_pending: Option<String>,
}

enum Action {
    Plain,
    Building(Plan),
    TextOverwrite(String),
    GenAttr(String),
    GenValue(String),
}

/// Insert the table's attributes into a document.
///
/// Returns the rewritten document and a report with match counts, table
/// identifiers that matched no building, and the table's own row issues.
pub fn insert_attributes(
    xml: &str,
    table: &AttributeTable,
    opts: &InsertOptions,
) -> Result<(String, InsertReport)> {
    let (ns, index) = scan_document(xml)?;

    let mut report = InsertReport::new();
    report.issues = table.issues().to_vec();

    // Build one write plan per building present in both document and table.
    let mut plans: HashMap<String, Plan> = HashMap::new();
    for id in table.ids() {
        let Some(present) = index.get(id) else {
            report.unmatched_ids.push(id.to_string());
            continue;
        };

        let row = table.get(id).expect("id comes from the table");
        let mut plan = Plan::default();
        for (column, value) in table.columns().iter().zip(&row.values) {
            let Some(value) = value else { continue };
            match column.target {
                AttributeTarget::Building => {
                    if present.bldg.contains(&column.name) {
                        plan.bldg_overwrites
                            .insert(column.name.clone(), value.clone());
                    } else {
                        plan.bldg_appends.push((column.name.clone(), value.clone()));
                    }
                }
                AttributeTarget::Generic => {
                    if present.r#gen.contains(&column.name) {
                        plan.gen_overwrites
                            .insert(column.name.clone(), value.clone());
                    } else {
                        plan.gen_inserts.push((column.name.clone(), value.clone()));
                    }
                }
            }
        }

        report.attributes_written += plan.writes();
        plans.insert(id.to_string(), plan);
    }
    report.buildings_matched = plans.len();

    let output = rewrite(xml, &ns, &mut plans, opts)?;

    tracing::info!(
        matched = report.buildings_matched,
        written = report.attributes_written,
        unmatched = report.unmatched_ids.len(),
        "attributes inserted"
    );

    Ok((output, report))
}

fn rewrite(
    xml: &str,
    ns: &NamespaceContext,
    plans: &mut HashMap<String, Plan>,
    opts: &InsertOptions,
) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut stack: Vec<Frame> = Vec::new();
    // Whitespace directly before a building's end tag is held back so
    // appended elements land between the last child and that whitespace.
    let mut pending_ws: Option<Event<'static>> = None;

    loop {
        let ev = reader.read_event().map_err(|e| {
            CityPrepError::citygml(format!(
                "parse error at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        let defer_ws = matches!(&ev, Event::End(_))
            && stack
                .last()
                .is_some_and(|f| f.building.as_ref().is_some_and(|p| !p.bldg_appends.is_empty()));
        if !defer_ws {
            if let Some(ws) = pending_ws.take() {
                writer.write_event(ws).map_err(write_err)?;
            }
        }

        match ev {
            Event::Start(e) => {
                let action = classify(ns, &e, &mut stack, plans)?;
                let mut frame = Frame::default();
                match action {
                    Action::Plain => {
                        writer.write_event(Event::Start(e)).map_err(write_err)?;
                    }
                    Action::Building(mut plan) => {
                        writer.write_event(Event::Start(e)).map_err(write_err)?;
                        let child_depth = stack.len() + 1;
                        for (name, value) in plan.gen_inserts.drain(..) {
                            write_break(&mut writer, opts, child_depth)?;
                            write_generic_attribute(&mut writer, ns, &name, &value)?;
                        }
                        frame.building = Some(plan);
                    }
                    Action::TextOverwrite(value) | Action::GenValue(value) => {
                        writer.write_event(Event::Start(e)).map_err(write_err)?;
                        writer
                            .write_event(Event::Text(BytesText::new(&value)))
                            .map_err(write_err)?;
                        frame.suppress_text = true;
                    }
                    Action::GenAttr(value) => {
                        writer.write_event(Event::Start(e)).map_err(write_err)?;
                        frame.gen_value_pending = Some(value);
                    }
                }
                stack.push(frame);
            }
            Event::Empty(e) => {
                let action = classify(ns, &e, &mut stack, plans)?;
                match action {
                    Action::Plain => {
                        writer.write_event(Event::Empty(e)).map_err(write_err)?;
                    }
                    Action::Building(plan) => {
                        expand_empty_building(&mut writer, ns, e, plan, opts, stack.len())?;
                    }
                    Action::TextOverwrite(value) | Action::GenValue(value) => {
                        let tag = qname_owned(&e);
                        writer.write_event(Event::Start(e)).map_err(write_err)?;
                        writer
                            .write_event(Event::Text(BytesText::new(&value)))
                            .map_err(write_err)?;
                        writer
                            .write_event(Event::End(BytesEnd::new(tag)))
                            .map_err(write_err)?;
                    }
                    Action::GenAttr(value) => {
                        let tag = qname_owned(&e);
                        writer.write_event(Event::Start(e)).map_err(write_err)?;
                        write_generic_value(&mut writer, ns, &value)?;
                        writer
                            .write_event(Event::End(BytesEnd::new(tag)))
                            .map_err(write_err)?;
                    }
                }
            }
            Event::End(e) => {
                let mut frame = stack.pop().ok_or_else(|| {
                    CityPrepError::citygml(format!(
                        "unbalanced end tag at byte {}",
                        reader.buffer_position()
                    ))
                })?;

                if let Some(mut plan) = frame.building.take() {
                    let child_depth = stack.len() + 1;
                    if !plan.bldg_appends.is_empty() {
                        for (name, value) in plan.bldg_appends.drain(..) {
                            write_break(&mut writer, opts, child_depth)?;
                            write_building_attribute(&mut writer, ns, &name, &value)?;
                        }
                        match pending_ws.take() {
                            Some(ws) => writer.write_event(ws).map_err(write_err)?,
                            None => write_break(&mut writer, opts, stack.len())?,
                        }
                    }
                } else if let Some(value) = frame.gen_value_pending.take() {
                    // stringAttribute had no value child; synthesize one.
                    write_generic_value(&mut writer, ns, &value)?;
                }
                writer.write_event(Event::End(e)).map_err(write_err)?;
            }
            Event::Text(t) => {
                let suppress = stack.last().is_some_and(|f| f.suppress_text);
                if suppress {
                    continue;
                }
                let stash = stack
                    .last()
                    .is_some_and(|f| f.building.as_ref().is_some_and(|p| !p.bldg_appends.is_empty()))
                    && t.iter().all(u8::is_ascii_whitespace);
                if stash {
                    pending_ws = Some(Event::Text(t.into_owned()));
                } else {
                    writer.write_event(Event::Text(t)).map_err(write_err)?;
                }
            }
            Event::CData(c) => {
                if stack.last().is_some_and(|f| f.suppress_text) {
                    continue;
                }
                writer.write_event(Event::CData(c)).map_err(write_err)?;
            }
            Event::Eof => break,
            other => {
                writer.write_event(other).map_err(write_err)?;
            }
        }
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| CityPrepError::citygml(format!("output is not valid UTF-8: {e}")))
}

/// Decide what to do with an opening element, consuming plan entries.
fn classify(
    ns: &NamespaceContext,
    e: &BytesStart<'_>,
    stack: &mut [Frame],
    plans: &mut HashMap<String, Plan>,
) -> Result<Action> {
    let name = e.name();

    if ns.is_building(name) {
        if let Some(id) = ns.gml_id(e)? {
            if let Some(plan) = plans.remove(&id) {
                return Ok(Action::Building(plan));
            }
        }
        return Ok(Action::Plain);
    }

    let Some(parent) = stack.last_mut() else {
        return Ok(Action::Plain);
    };

    if let Some(plan) = parent.building.as_mut() {
        if ns.in_schema(name, Schema::Building) {
            let local = NamespaceContext::local(name);
            if let Some(value) = plan.bldg_overwrites.remove(&local) {
                return Ok(Action::TextOverwrite(value));
            }
        } else if ns.in_schema(name, Schema::Generic)
            && name.local_name().as_ref() == b"stringAttribute"
        {
            if let Some(attr_name) = string_attribute_name(e)? {
                if let Some(value) = plan.gen_overwrites.remove(&attr_name) {
                    return Ok(Action::GenAttr(value));
                }
            }
        }
    } else if parent.gen_value_pending.is_some()
        && ns.in_schema(name, Schema::Generic)
        && name.local_name().as_ref() == b"value"
    {
        let value = parent.gen_value_pending.take().expect("checked above");
        return Ok(Action::GenValue(value));
    }

    Ok(Action::Plain)
}

/// `<bldg:Building gml:id="…"/>` with a plan becomes a full element.
fn expand_empty_building(
    writer: &mut Writer<Vec<u8>>,
    ns: &NamespaceContext,
    e: BytesStart<'_>,
    plan: Plan,
    opts: &InsertOptions,
    depth: usize,
) -> Result<()> {
    let tag = qname_owned(&e);
    writer.write_event(Event::Start(e)).map_err(write_err)?;
    for (name, value) in &plan.gen_inserts {
        write_break(writer, opts, depth + 1)?;
        write_generic_attribute(writer, ns, name, value)?;
    }
    for (name, value) in &plan.bldg_appends {
        write_break(writer, opts, depth + 1)?;
        write_building_attribute(writer, ns, name, value)?;
    }
    if opts.pretty && plan.writes() > 0 {
        write_break(writer, opts, depth)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(write_err)?;
    Ok(())
}

/// `<bldg:yearOfConstruction>1978</bldg:yearOfConstruction>`
fn write_building_attribute(
    writer: &mut Writer<Vec<u8>>,
    ns: &NamespaceContext,
    name: &str,
    value: &str,
) -> Result<()> {
    let (tag, xmlns) = ns.qualified(Schema::Building, name);
    let mut start = BytesStart::new(tag.clone());
    if let Some((key, uri)) = &xmlns {
        start.push_attribute((key.as_str(), uri.as_str()));
    }
    writer.write_event(Event::Start(start)).map_err(write_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(write_err)?;
    Ok(())
}

/// `<gen:stringAttribute name="…"><gen:value>…</gen:value></gen:stringAttribute>`
fn write_generic_attribute(
    writer: &mut Writer<Vec<u8>>,
    ns: &NamespaceContext,
    name: &str,
    value: &str,
) -> Result<()> {
    let tag = match ns.schema_prefix(Schema::Generic) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:stringAttribute"),
        _ => "stringAttribute".to_string(),
    };
    let mut start = BytesStart::new(tag.clone());
    // Without a declared prefix the element carries its own declaration,
    // which the nested value element then inherits.
    if !tag.contains(':') {
        start.push_attribute(("xmlns", GEN_NS[1]));
    }
    start.push_attribute(("name", name));
    writer.write_event(Event::Start(start)).map_err(write_err)?;
    write_generic_value(writer, ns, value)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(write_err)?;
    Ok(())
}

/// `<gen:value>…</gen:value>`
fn write_generic_value(
    writer: &mut Writer<Vec<u8>>,
    ns: &NamespaceContext,
    value: &str,
) -> Result<()> {
    let tag = match ns.schema_prefix(Schema::Generic) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:value"),
        _ => "value".to_string(),
    };
    writer
        .write_event(Event::Start(BytesStart::new(tag.clone())))
        .map_err(write_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(write_err)?;
    Ok(())
}

/// Newline plus `level` levels of indentation, when pretty-printing.
fn write_break(writer: &mut Writer<Vec<u8>>, opts: &InsertOptions, level: usize) -> Result<()> {
    if !opts.pretty {
        return Ok(());
    }
    let text = format!("\n{}", " ".repeat(opts.indent * level));
    writer
        .write_event(Event::Text(BytesText::new(&text)))
        .map_err(write_err)
}

fn qname_owned(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn string_attribute_name(e: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| CityPrepError::citygml(format!("bad attribute: {e}")))?;
        if attr.key.as_ref() == b"name" {
            let value = attr
                .unescape_value()
                .map_err(|e| CityPrepError::citygml(format!("bad attribute value: {e}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
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
    use cityprep_lookup::AttributeTable;

    const TABLE: &str = "\
BuildingID, yearOfConstruction, function, comment
attribute_type, bldg, bldg, gen
DEBW_LOD2_2960, 1978, 1010, \"Some old residential building\"
";

    const DOC: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        r#"<CityModel xmlns:gml="http://www.opengis.net/gml" "#,
        r#"xmlns:bldg="http://www.opengis.net/citygml/building/1.0" "#,
        r#"xmlns:gen="http://www.opengis.net/citygml/generics/1.0">"#,
        r#"<cityObjectMember>"#,
        r#"<bldg:Building gml:id="DEBW_LOD2_2960">"#,
        r#"<bldg:measuredHeight>7.4</bldg:measuredHeight>"#,
        r#"</bldg:Building>"#,
        r#"</cityObjectMember>"#,
        r#"<cityObjectMember>"#,
        r#"<bldg:Building gml:id="DEBW_LOD2_9999">"#,
        r#"<bldg:measuredHeight>12.1</bldg:measuredHeight>"#,
        r#"</bldg:Building>"#,
        r#"</cityObjectMember>"#,
        r#"</CityModel>"#,
    );

    fn table() -> AttributeTable {
        AttributeTable::from_reader(TABLE.as_bytes()).expect("table")
    }

    fn compact() -> InsertOptions {
        InsertOptions {
            pretty: false,
            indent: 2,
        }
    }

    #[test]
    fn inserts_all_three_attributes() {
        let (out, report) = insert_attributes(DOC, &table(), &compact()).expect("insert");

        assert!(out.contains("<bldg:yearOfConstruction>1978</bldg:yearOfConstruction>"));
        assert!(out.contains("<bldg:function>1010</bldg:function>"));
        assert!(out.contains(
            "<gen:stringAttribute name=\"comment\">\
             <gen:value>Some old residential building</gen:value>\
             </gen:stringAttribute>"
        ));
        assert_eq!(report.buildings_matched, 1);
        assert_eq!(report.attributes_written, 3);
    }

    #[test]
    fn generic_attributes_lead_and_building_attributes_trail() {
        let (out, _) = insert_attributes(DOC, &table(), &compact()).expect("insert");

        let gen_pos = out.find("gen:stringAttribute").expect("gen inserted");
        let height_pos = out.find("bldg:measuredHeight").expect("kept");
        let year_pos = out.find("bldg:yearOfConstruction").expect("appended");
        assert!(gen_pos < height_pos);
        assert!(height_pos < year_pos);
    }

    #[test]
    fn buildings_absent_from_table_pass_through_unchanged() {
        let (out, _) = insert_attributes(DOC, &table(), &compact()).expect("insert");

        assert!(out.contains(
            "<bldg:Building gml:id=\"DEBW_LOD2_9999\">\
             <bldg:measuredHeight>12.1</bldg:measuredHeight>\
             </bldg:Building>"
        ));
    }

    #[test]
    fn overwrites_existing_values_in_place() {
        let doc = DOC.replace(
            "<bldg:measuredHeight>7.4</bldg:measuredHeight>",
            "<bldg:yearOfConstruction>1900</bldg:yearOfConstruction>\
             <gen:stringAttribute name=\"comment\"><gen:value>stale</gen:value></gen:stringAttribute>",
        );
        let (out, report) = insert_attributes(&doc, &table(), &compact()).expect("insert");

        assert!(out.contains("<bldg:yearOfConstruction>1978</bldg:yearOfConstruction>"));
        assert!(!out.contains("1900"));
        assert!(out.contains("<gen:value>Some old residential building</gen:value>"));
        assert!(!out.contains("stale"));
        assert_eq!(report.attributes_written, 3);
    }

    #[test]
    fn running_twice_equals_running_once() {
        let (once, _) = insert_attributes(DOC, &table(), &compact()).expect("first");
        let (twice, _) = insert_attributes(&once, &table(), &compact()).expect("second");
        assert_eq!(once, twice);
    }

    #[test]
    fn unmatched_identifiers_are_reported() {
        let table_text = "\
BuildingID,comment
attribute_type,gen
NOT_IN_DOCUMENT,hello
";
        let table = AttributeTable::from_reader(table_text.as_bytes()).expect("table");
        let (out, report) = insert_attributes(DOC, &table, &compact()).expect("insert");

        assert_eq!(report.buildings_matched, 0);
        assert_eq!(report.unmatched_ids, vec!["NOT_IN_DOCUMENT".to_string()]);
        assert!(report.has_failures());
        assert!(!out.contains("hello"));
    }

    #[test]
    fn empty_building_element_is_expanded() {
        let doc = DOC.replace(
            "<bldg:Building gml:id=\"DEBW_LOD2_2960\">\
             <bldg:measuredHeight>7.4</bldg:measuredHeight>\
             </bldg:Building>",
            "<bldg:Building gml:id=\"DEBW_LOD2_2960\"/>",
        );
        let (out, report) = insert_attributes(&doc, &table(), &compact()).expect("insert");

        assert!(out.contains("<bldg:yearOfConstruction>1978</bldg:yearOfConstruction>"));
        assert_eq!(report.attributes_written, 3);
    }

    #[test]
    fn values_are_routed_to_building_parts() {
        let table_text = "\
BuildingID,yearOfConstruction
attribute_type,bldg
PART_1,1955
";
        let doc = DOC.replace(
            "<bldg:measuredHeight>7.4</bldg:measuredHeight>",
            "<bldg:consistsOfBuildingPart>\
             <bldg:BuildingPart gml:id=\"PART_1\"></bldg:BuildingPart>\
             </bldg:consistsOfBuildingPart>",
        );
        let table = AttributeTable::from_reader(table_text.as_bytes()).expect("table");
        let (out, report) = insert_attributes(&doc, &table, &compact()).expect("insert");

        assert!(out.contains(
            "<bldg:BuildingPart gml:id=\"PART_1\">\
             <bldg:yearOfConstruction>1955</bldg:yearOfConstruction>\
             </bldg:BuildingPart>"
        ));
        assert_eq!(report.buildings_matched, 1);
    }

    #[test]
    fn pretty_mode_indents_appended_elements() {
        let doc = r#"<CityModel xmlns:gml="http://www.opengis.net/gml" xmlns:bldg="http://www.opengis.net/citygml/building/1.0" xmlns:gen="http://www.opengis.net/citygml/generics/1.0">
  <cityObjectMember>
    <bldg:Building gml:id="DEBW_LOD2_2960">
      <bldg:measuredHeight>7.4</bldg:measuredHeight>
    </bldg:Building>
  </cityObjectMember>
</CityModel>"#;
        let opts = InsertOptions {
            pretty: true,
            indent: 2,
        };
        let (out, _) = insert_attributes(doc, &table(), &opts).expect("insert");

        assert!(out.contains("\n      <bldg:yearOfConstruction>1978</bldg:yearOfConstruction>"));
        // End tag keeps its original indentation.
        assert!(out.contains("\n    </bldg:Building>"));
    }
}
