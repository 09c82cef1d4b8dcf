//! Conversions between JSON values and Rhai dynamics.
//!
//! Everything crossing the sandbox boundary goes through these two
//! functions, so scripts only ever see and return plain data.

use rhai::{Array, Dynamic, Map};
use serde_json::Value;

pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::from(n.to_string())
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => {
            let array: Array = items.iter().map(json_to_dynamic).collect();
            Dynamic::from(array)
        }
        Value::Object(fields) => {
            let mut map = Map::new();
            for (key, field) in fields {
                map.insert(key.as_str().into(), json_to_dynamic(field));
            }
            Dynamic::from(map)
        }
    }
}

/// Custom types and function pointers degrade to their display string.
pub fn dynamic_to_json(value: &Dynamic) -> Value {
    if value.is_unit() {
        Value::Null
    } else if value.is::<bool>() {
        Value::Bool(value.as_bool().unwrap_or(false))
    } else if value.is::<i64>() {
        Value::from(value.as_int().unwrap_or(0))
    } else if value.is::<f64>() {
        value
            .as_float()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if value.is::<String>() || value.is::<rhai::ImmutableString>() {
        Value::String(value.clone().into_string().unwrap_or_default())
    } else if value.is::<char>() {
        Value::String(value.as_char().map(String::from).unwrap_or_default())
    } else if value.is::<Array>() {
        let items = value.clone().into_array().unwrap_or_default();
        Value::Array(items.iter().map(dynamic_to_json).collect())
    } else if value.is::<Map>() {
        match value.clone().try_cast::<Map>() {
            Some(map) => Value::Object(
                map.iter()
                    .map(|(key, field)| (key.to_string(), dynamic_to_json(field)))
                    .collect(),
            ),
            None => Value::String(value.to_string()),
        }
    } else {
        Value::String(value.to_string())
    }
}

/// Truthiness of a script value as used by condition expressions.
pub fn dynamic_truthy(value: &Dynamic) -> bool {
    match dynamic_to_json(value) {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
