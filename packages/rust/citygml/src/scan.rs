//! Scan pass: index buildings and their already-present attributes.
//!
//! The rewrite pass needs to know, before it reaches a building's end tag,
//! which attributes exist somewhere in that building. One cheap pass over
//! the event stream collects that index up front.

use std::collections::{HashMap, HashSet};

use quick_xml::Reader;
use quick_xml::events::Event;

use cityprep_shared::{CityPrepError, Result};

use crate::namespaces::{NamespaceContext, Schema};

/// Attributes already present on one building or building part.
#[derive(Debug, Default)]
pub struct PresentAttributes {
    /// Local names of direct `bldg`-namespace child elements.
    pub bldg: HashSet<String>,
    /// `name` attributes of direct `gen:stringAttribute` children.
    pub r#gen: HashSet<String>,
}

/// Index of all identified buildings in a document.
#[derive(Debug, Default)]
pub struct BuildingIndex {
    buildings: HashMap<String, PresentAttributes>,
}

impl BuildingIndex {
    /// Look up a building by `gml:id`.
    pub fn get(&self, id: &str) -> Option<&PresentAttributes> {
        self.buildings.get(id)
    }

    /// True when the document contains a building with this `gml:id`.
    pub fn contains(&self, id: &str) -> bool {
        self.buildings.contains_key(id)
    }

    /// Number of identified buildings and building parts.
    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    /// True when the document has no identified building.
    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    fn add(&mut self, id: String) {
        self.buildings.entry(id).or_default();
    }
}

enum Frame {
    Building(String),
    Other,
}

/// Walk a document once, returning its namespace bindings and building index.
///
/// Buildings without a `gml:id` cannot be addressed by the lookup table and
/// are not indexed.
pub fn scan_document(xml: &str) -> Result<(NamespaceContext, BuildingIndex)> {
    let mut reader = Reader::from_str(xml);
    let mut ns = NamespaceContext::default();
    let mut index = BuildingIndex::default();
    let mut stack: Vec<Frame> = Vec::new();
    let mut seen_root = false;

    loop {
        match reader.read_event().map_err(|e| {
            CityPrepError::citygml(format!(
                "parse error at byte {}: {e}",
                reader.buffer_position()
            ))
        })? {
            Event::Start(e) => {
                if !seen_root {
                    ns = NamespaceContext::from_root(&e)?;
                    seen_root = true;
                }
                let frame = classify(&ns, &e, stack.last(), &mut index)?;
                stack.push(frame);
            }
            Event::Empty(e) => {
                if !seen_root {
                    ns = NamespaceContext::from_root(&e)?;
                    seen_root = true;
                }
                classify(&ns, &e, stack.last(), &mut index)?;
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(CityPrepError::citygml("document has no root element"));
    }

    tracing::debug!(buildings = index.len(), "document scanned");
    Ok((ns, index))
}

/// Record what this element contributes to the index and build its frame.
fn classify(
    ns: &NamespaceContext,
    e: &quick_xml::events::BytesStart<'_>,
    parent: Option<&Frame>,
    index: &mut BuildingIndex,
) -> Result<Frame> {
    if ns.is_building(e.name()) {
        if let Some(id) = ns.gml_id(e)? {
            index.add(id.clone());
            return Ok(Frame::Building(id));
        }
        return Ok(Frame::Other);
    }

    if let Some(Frame::Building(id)) = parent {
        let present = index
            .buildings
            .get_mut(id)
            .expect("building frame implies index entry");

        if ns.in_schema(e.name(), Schema::Building) {
            present.bldg.insert(NamespaceContext::local(e.name()));
        } else if ns.in_schema(e.name(), Schema::Generic)
            && e.name().local_name().as_ref() == b"stringAttribute"
        {
            if let Some(name) = attribute_name(ns, e)? {
                present.r#gen.insert(name);
            }
        }
    }

    Ok(Frame::Other)
}

/// The `name="…"` attribute of a `gen:stringAttribute`.
fn attribute_name(
    _ns: &NamespaceContext,
    e: &quick_xml::events::BytesStart<'_>,
) -> Result<Option<String>> {
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
