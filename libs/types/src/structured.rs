//! Free-form structured values
//!
//! Document tags, request parameters and compression parameters are
//! schemaless key-value trees. They are modelled as a closed enum rather than
//! `serde_json::Value` so that non self-describing wire formats (bincode) can
//! decode them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered string-keyed map of structured values
pub type Struct = BTreeMap<String, StructValue>;

/// One node of a structured value tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum StructValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<StructValue>),
    Map(Struct),
}

impl StructValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StructValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StructValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StructValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StructValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for StructValue {
    fn from(value: &str) -> Self {
        StructValue::String(value.to_string())
    }
}

impl From<String> for StructValue {
    fn from(value: String) -> Self {
        StructValue::String(value)
    }
}

impl From<f64> for StructValue {
    fn from(value: f64) -> Self {
        StructValue::Number(value)
    }
}

impl From<i64> for StructValue {
    fn from(value: i64) -> Self {
        StructValue::Number(value as f64)
    }
}

impl From<bool> for StructValue {
    fn from(value: bool) -> Self {
        StructValue::Bool(value)
    }
}

impl From<serde_json::Value> for StructValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => StructValue::Null,
            serde_json::Value::Bool(b) => StructValue::Bool(b),
            serde_json::Value::Number(n) => StructValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => StructValue::String(s),
            serde_json::Value::Array(items) => {
                StructValue::List(items.into_iter().map(StructValue::from).collect())
            }
            serde_json::Value::Object(map) => StructValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, StructValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&StructValue> for serde_json::Value {
    fn from(value: &StructValue) -> Self {
        match value {
            StructValue::Null => serde_json::Value::Null,
            StructValue::Bool(b) => serde_json::Value::Bool(*b),
            StructValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            StructValue::String(s) => serde_json::Value::String(s.clone()),
            StructValue::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            StructValue::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Build a `Struct` from a JSON object; non-object values yield an empty map
pub fn struct_from_json(value: serde_json::Value) -> Struct {
    match StructValue::from(value) {
        StructValue::Map(map) => map,
        _ => Struct::new(),
    }
}
