//! Attribute values attached to features

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open, string-keyed attribute mapping. Key order carries no meaning.
pub type Properties = BTreeMap<String, AttributeValue>;

/// Attribute value types
///
/// Scalars cover source attributes; `Array` and `Object` carry the
/// provenance blocks operations attach to their outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<AttributeValue>),
    Object(Properties),
}

impl AttributeValue {
    /// Convert any serializable value (typically operation metadata).
    ///
    /// Values that fail to serialize collapse to `Null`.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        serde_json::to_value(value)
            .map(AttributeValue::from)
            .unwrap_or(AttributeValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Properties> {
        match self {
            AttributeValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Int(i),
                None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
            },
            serde_json::Value::String(s) => AttributeValue::String(s),
            serde_json::Value::Array(items) => {
                AttributeValue::Array(items.into_iter().map(AttributeValue::from).collect())
            }
            serde_json::Value::Object(map) => AttributeValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, AttributeValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&AttributeValue> for serde_json::Value {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            AttributeValue::Int(i) => serde_json::Value::from(*i),
            // Non-finite floats have no JSON form
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
            AttributeValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            AttributeValue::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(v as i64)
    }
}

impl From<usize> for AttributeValue {
    fn from(v: usize) -> Self {
        AttributeValue::Int(v as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<Properties> for AttributeValue {
    fn from(v: Properties) -> Self {
        AttributeValue::Object(v)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(AttributeValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_integers() {
        let v = AttributeValue::from(json!({"count": 3, "ratio": 0.5, "tags": ["a", null]}));
        let obj = v.as_object().unwrap();
        assert_eq!(obj["count"], AttributeValue::Int(3));
        assert_eq!(obj["ratio"], AttributeValue::Float(0.5));
        assert_eq!(
            obj["tags"],
            AttributeValue::Array(vec![AttributeValue::String("a".into()), AttributeValue::Null])
        );
    }

    #[test]
    fn test_untagged_serialization() {
        let mut props = Properties::new();
        props.insert("name".into(), "lake".into());
        props.insert("area".into(), 12.0.into());
        let text = serde_json::to_string(&AttributeValue::Object(props)).unwrap();
        assert_eq!(text, r#"{"area":12.0,"name":"lake"}"#);
    }

    #[test]
    fn test_nan_becomes_null() {
        let v = serde_json::Value::from(&AttributeValue::Float(f64::NAN));
        assert!(v.is_null());
    }

    #[test]
    fn test_from_serialize_struct() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Stats {
            point_count: usize,
        }
        let v = AttributeValue::from_serialize(&Stats { point_count: 4 });
        assert_eq!(v.as_object().unwrap()["pointCount"], AttributeValue::Int(4));
    }
}
