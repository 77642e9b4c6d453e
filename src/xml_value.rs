//! A reflection-free, algebraic stand-in for an XML subtree.
//!
//! The side-payload JSON columns (`comments_data`, `features_data`, ...) are
//! derived from this type rather than from ad-hoc string building, so the
//! shape of the JSON always mirrors the shape of the element it came from.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Attribute order is preserved (insertion order, not sorted) so that
/// serialization is deterministic without an extra sort pass. Field order
/// here is also the JSON key order: `derive(Serialize)` emits struct fields
/// in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct XmlValue {
    pub tag: String,
    #[serde(serialize_with = "serialize_attributes")]
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlValue>,
}

fn serialize_attributes<S>(attributes: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(attributes.len()))?;
    for (key, value) in attributes {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

impl XmlValue {
    pub fn new(tag: impl Into<String>) -> Self {
        XmlValue {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: XmlValue) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Serialize as a single-line JSON object: `{"tag":...,"attributes":{...},"text":...,"children":[...]}`.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).expect("XmlValue contains only serializable primitives")
    }
}

/// Encode a sequence of top-level values as a JSON array, e.g. the entry's
/// `comments` or `features` columns.
pub fn encode_array(values: &[XmlValue]) -> String {
    serde_json::to_string(values).expect("XmlValue contains only serializable primitives")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_empty_element() {
        let value = XmlValue::new("comment");
        assert_eq!(value.to_json_string(), r#"{"tag":"comment","attributes":{},"text":null,"children":[]}"#);
    }

    #[test]
    fn serializes_nested_value_with_attributes_and_text() {
        let value = XmlValue::new("comment")
            .with_attribute("type", "function")
            .with_child(XmlValue::new("text").with_text("Binds calcium"));

        let json = value.to_json_string();
        assert!(json.starts_with(r#"{"tag":"comment","attributes":{"type":"function"}"#));
        assert!(json.contains(r#""children":[{"tag":"text","attributes":{},"text":"Binds calcium","children":[]}]"#));
    }

    #[test]
    fn escapes_control_characters() {
        let value = XmlValue::new("note").with_text("line one\nline\ttwo \"quoted\"");
        let json = value.to_json_string();
        assert!(json.contains(r#"line one\nline\ttwo \"quoted\""#));
    }

    #[test]
    fn encodes_array_of_values() {
        let values = vec![XmlValue::new("a"), XmlValue::new("b")];
        assert_eq!(encode_array(&values), r#"[{"tag":"a","attributes":{},"text":null,"children":[]},{"tag":"b","attributes":{},"text":null,"children":[]}]"#);
    }
}
