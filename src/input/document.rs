//! Document representation
//!
//! A Document is one JSON object from a bundle. Its `type` field selects the
//! mapping used to compile it; everything else is data the mapping reads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A source document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub fields: Fields,
}

/// Field values a document can carry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Fields),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JSON form of this value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.fields)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A map of field names to values
pub type Fields = HashMap<String, Value>;

impl From<Fields> for Document {
    fn from(fields: Fields) -> Self {
        Self { fields }
    }
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document carrying only a type discriminator
    pub fn typed(type_name: impl Into<String>) -> Self {
        Self::new().with("type", type_name.into())
    }

    /// Builder-style field setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set a field value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The `type` discriminator
    pub fn type_name(&self) -> Option<&str> {
        self.get("type").and_then(Value::as_str)
    }

    /// The `id` field, when it is a string
    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    /// Human-readable label used in logs and error reports
    pub fn origin(&self, index: usize) -> String {
        match (self.id(), self.type_name()) {
            (Some(id), _) => id.to_string(),
            (None, Some(t)) => format!("{}#{}", t, index),
            (None, None) => format!("#{}", index),
        }
    }

    /// JSON form of this document
    pub fn to_json(&self) -> serde_json::Value {
        Value::Object(self.fields.clone()).to_json()
    }

    /// Build a document from a JSON object; anything else yields `None`
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match Value::from(json) {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_creation() {
        let mut doc = Document::typed("person");
        doc.set("id", "p1").set("age", 30i64).set("active", false);

        assert_eq!(doc.type_name(), Some("person"));
        assert_eq!(doc.id(), Some("p1"));
        assert_eq!(doc.get("age"), Some(&Value::Int(30)));
        assert_eq!(doc.origin(0), "p1");
    }

    #[test]
    fn test_origin_without_id() {
        let doc = Document::typed("external-reference");
        assert_eq!(doc.origin(3), "external-reference#3");
        assert_eq!(Document::new().origin(1), "#1");
    }

    #[test]
    fn test_deserialize_untagged_values() {
        let doc: Document = serde_json::from_str(
            r#"{"type":"indicator","confidence":85,"score":0.5,"revoked":false,
                "labels":["a","b"],"extra":null,"nested":{"k":"v"}}"#,
        )
        .unwrap();

        assert_eq!(doc.get("confidence"), Some(&Value::Int(85)));
        assert_eq!(doc.get("score"), Some(&Value::Float(0.5)));
        assert_eq!(doc.get("revoked"), Some(&Value::Bool(false)));
        assert_eq!(doc.get("labels"), Some(&Value::from(vec!["a", "b"])));
        assert_eq!(doc.get("extra"), Some(&Value::Null));
        assert!(doc.get("nested").and_then(Value::as_object).is_some());
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"id": "p1", "tags": ["x"], "n": 2});
        let doc = Document::from_json(json.clone()).unwrap();
        assert_eq!(doc.to_json(), json);
        assert!(Document::from_json(serde_json::json!([1, 2])).is_none());
    }
}
