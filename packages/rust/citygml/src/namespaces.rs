//! Namespace resolution for CityGML documents.
//!
//! Prefix bindings are taken from the root element, which is where LoD2
//! exports declare them. CityGML 1.0 and 2.0 building/generics namespaces
//! are both recognized.

use std::collections::HashMap;

use quick_xml::events::BytesStart;
use quick_xml::name::QName;

use cityprep_shared::{CityPrepError, Result};

/// GML namespace (gml:id lives here).
pub const GML_NS: &str = "http://www.opengis.net/gml";

/// CityGML building module namespaces, versions 1.0 and 2.0.
pub const BLDG_NS: [&str; 2] = [
    "http://www.opengis.net/citygml/building/1.0",
    "http://www.opengis.net/citygml/building/2.0",
];

/// CityGML generics module namespaces, versions 1.0 and 2.0.
pub const GEN_NS: [&str; 2] = [
    "http://www.opengis.net/citygml/generics/1.0",
    "http://www.opengis.net/citygml/generics/2.0",
];

/// Which of the two attribute schemas a new element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Building,
    Generic,
}

/// Prefix bindings collected from a document's root element.
#[derive(Debug, Clone, Default)]
pub struct NamespaceContext {
    /// prefix → namespace URI; the default namespace uses the empty prefix.
    prefixes: HashMap<String, String>,
}

impl NamespaceContext {
    /// Collect `xmlns` declarations from the root start tag.
    pub fn from_root(root: &BytesStart<'_>) -> Result<Self> {
        let mut prefixes = HashMap::new();

        for attr in root.attributes() {
            let attr = attr.map_err(|e| CityPrepError::citygml(format!("bad attribute: {e}")))?;
            let key = attr.key.as_ref();
            let value = attr
                .unescape_value()
                .map_err(|e| CityPrepError::citygml(format!("bad attribute value: {e}")))?
                .into_owned();

            if key == b"xmlns" {
                prefixes.insert(String::new(), value);
            } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                prefixes.insert(String::from_utf8_lossy(prefix).into_owned(), value);
            }
        }

        Ok(Self { prefixes })
    }

    /// Resolve the namespace URI a qualified name lives in.
    pub fn resolve(&self, name: QName<'_>) -> Option<&str> {
        let prefix = name
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
            .unwrap_or_default();
        self.prefixes.get(&prefix).map(String::as_str)
    }

    /// Local name of a qualified name, as UTF-8.
    pub fn local(name: QName<'_>) -> String {
        String::from_utf8_lossy(name.local_name().as_ref()).into_owned()
    }

    /// True for `bldg:Building` and `bldg:BuildingPart` elements.
    pub fn is_building(&self, name: QName<'_>) -> bool {
        let local = name.local_name();
        (local.as_ref() == b"Building" || local.as_ref() == b"BuildingPart")
            && self.in_schema(name, Schema::Building)
    }

    /// True when the qualified name resolves into the given schema.
    pub fn in_schema(&self, name: QName<'_>, schema: Schema) -> bool {
        let uris: &[&str] = match schema {
            Schema::Building => &BLDG_NS,
            Schema::Generic => &GEN_NS,
        };
        self.resolve(name).is_some_and(|uri| uris.contains(&uri))
    }

    /// The prefix bound to a schema namespace, if any is declared.
    pub fn schema_prefix(&self, schema: Schema) -> Option<&str> {
        let uris: &[&str] = match schema {
            Schema::Building => &BLDG_NS,
            Schema::Generic => &GEN_NS,
        };
        // Prefer a non-empty prefix so new elements stay readable.
        self.prefixes
            .iter()
            .filter(|(_, uri)| uris.contains(&uri.as_str()))
            .map(|(prefix, _)| prefix.as_str())
            .max_by_key(|prefix| !prefix.is_empty())
    }

    /// Tag name for a new element in a schema namespace.
    ///
    /// Uses the document's declared prefix when one exists; otherwise the
    /// element carries its own `xmlns` declaration (CityGML 2.0 URI).
    pub fn qualified(&self, schema: Schema, local: &str) -> (String, Option<(String, String)>) {
        match self.schema_prefix(schema) {
            Some("") | None => {
                let uri = match schema {
                    Schema::Building => BLDG_NS[1],
                    Schema::Generic => GEN_NS[1],
                };
                (local.to_string(), Some(("xmlns".to_string(), uri.to_string())))
            }
            Some(prefix) => (format!("{prefix}:{local}"), None),
        }
    }

    /// Read the `gml:id` attribute of an element, if present.
    pub fn gml_id(&self, element: &BytesStart<'_>) -> Result<Option<String>> {
        for attr in element.attributes() {
            let attr = attr.map_err(|e| CityPrepError::citygml(format!("bad attribute: {e}")))?;
            let key = QName(attr.key.as_ref());

            let is_gml_id = key.local_name().as_ref() == b"id"
                && (self.resolve(key) == Some(GML_NS) || attr.key.as_ref() == b"gml:id");
            if is_gml_id {
                let value = attr
                    .unescape_value()
                    .map_err(|e| CityPrepError::citygml(format!("bad gml:id value: {e}")))?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_with(attrs: &str) -> NamespaceContext {
        let xml = format!("<CityModel {attrs}/>");
        let mut reader = quick_xml::Reader::from_str(&xml);
        loop {
            match reader.read_event().expect("read") {
                quick_xml::events::Event::Empty(e) | quick_xml::events::Event::Start(e) => {
                    return NamespaceContext::from_root(&e).expect("ns context");
                }
                quick_xml::events::Event::Eof => panic!("no root element"),
                _ => {}
            }
        }
    }

    #[test]
    fn collects_prefix_bindings() {
        let ns = root_with(
            r#"xmlns:gml="http://www.opengis.net/gml"
               xmlns:bldg="http://www.opengis.net/citygml/building/1.0""#,
        );
        assert_eq!(ns.schema_prefix(Schema::Building), Some("bldg"));
        assert_eq!(ns.schema_prefix(Schema::Generic), None);
    }

    #[test]
    fn recognizes_building_elements_by_uri_not_prefix() {
        let ns = root_with(r#"xmlns:b="http://www.opengis.net/citygml/building/2.0""#);
        assert!(ns.is_building(QName(b"b:Building")));
        assert!(ns.is_building(QName(b"b:BuildingPart")));
        assert!(!ns.is_building(QName(b"b:function")));
        assert!(!ns.is_building(QName(b"bldg:Building")));
    }

    #[test]
    fn qualified_falls_back_to_inline_declaration() {
        let ns = root_with(r#"xmlns:gml="http://www.opengis.net/gml""#);
        let (tag, xmlns) = ns.qualified(Schema::Generic, "stringAttribute");
        assert_eq!(tag, "stringAttribute");
        assert_eq!(
            xmlns,
            Some((
                "xmlns".to_string(),
                "http://www.opengis.net/citygml/generics/2.0".to_string()
            ))
        );
    }

    #[test]
    fn qualified_uses_declared_prefix() {
        let ns = root_with(r#"xmlns:gen="http://www.opengis.net/citygml/generics/1.0""#);
        let (tag, xmlns) = ns.qualified(Schema::Generic, "stringAttribute");
        assert_eq!(tag, "gen:stringAttribute");
        assert_eq!(xmlns, None);
    }
}
