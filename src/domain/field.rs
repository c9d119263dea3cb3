//! Collected field values
//!
//! Step submissions carry tenant-defined fields. Values are restricted to text,
//! numbers, booleans and nested maps so that merging stays well defined.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name to value, ordered for stable serialization
pub type CollectedData = BTreeMap<String, FieldValue>;

/// A single collected value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Borrow the value as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_fields() {
        let data: CollectedData = serde_json::from_str(
            r#"{"first_name": "Ada", "age": 36, "consent": true, "address": {"city": "London", "zip": 123}}"#,
        )
        .unwrap();

        assert_eq!(data["first_name"], FieldValue::from("Ada"));
        assert_eq!(data["age"], FieldValue::from(36i64));
        assert_eq!(data["consent"], FieldValue::Bool(true));
        match &data["address"] {
            FieldValue::Map(inner) => assert_eq!(inner["city"].as_text(), Some("London")),
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_arrays_and_null() {
        assert!(serde_json::from_str::<CollectedData>(r#"{"tags": ["a", "b"]}"#).is_err());
        assert!(serde_json::from_str::<CollectedData>(r#"{"note": null}"#).is_err());
    }

    #[test]
    fn test_serializes_without_tags() {
        let mut data = CollectedData::new();
        data.insert("selfie".into(), "t/s/selfie.jpg".into());
        data.insert("score".into(), FieldValue::from(7i64));

        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"score":7,"selfie":"t/s/selfie.jpg"}"#);
    }
}
