//! Runtime variables and `{$name}` template resolution.
//!
//! All coercion rules used by the interpreter live here so they can be
//! tested without running a program:
//! - [`RuntimeVars::resolve`] interpolates references into a string;
//! - [`RuntimeVars::lookup_bare`] returns the typed value of an input that is
//!   exactly one reference;
//! - [`parse_value`] turns a resolved string into a richer JSON value.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};

pub const BLOCK_OUTPUT: &str = "block.output";
pub const LOOP_INDEX: &str = "loop.index";
pub const LOOP_COUNT: &str = "loop.count";
pub const LOOP_ITEM: &str = "loop.item";
pub const LOOP_TEXT: &str = "loop.text";
pub const LOOP_HTML: &str = "loop.html";

/// Reserved reference that resolves to the current timestamp.
pub const NOW: &str = "now";

static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\$([A-Za-z0-9_.\-]+)\}").expect("reference pattern compiles"));
static BARE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\{\$([A-Za-z0-9_.\-]+)\}\s*$").expect("bare reference pattern compiles")
});
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("number pattern compiles"));

/// Mutable variable store owned by one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RuntimeVars {
    values: BTreeMap<String, Value>,
}

impl RuntimeVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            values: map.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Current value of `block.output`, `null` when unset.
    pub fn block_output(&self) -> Value {
        self.get(BLOCK_OUTPUT).cloned().unwrap_or(Value::Null)
    }

    /// Copy of the store as a JSON object.
    pub fn to_map(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values.into_iter().collect()
    }

    /// Replaces every `{$name}` reference in `text`.
    pub fn resolve(&self, text: &str) -> String {
        if !text.contains("{$") {
            return text.to_string();
        }
        REFERENCE
            .replace_all(text, |caps: &Captures<'_>| self.reference_text(&caps[1]))
            .into_owned()
    }

    /// Resolves string values; every other JSON value passes through unchanged.
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => Value::String(self.resolve(text)),
            other => other.clone(),
        }
    }

    /// Typed value of an input that is exactly one reference.
    ///
    /// Returns `None` when `text` is not a bare reference or names an unknown
    /// variable.
    pub fn lookup_bare(&self, text: &str) -> Option<Value> {
        let name = bare_reference(text)?;
        if name == NOW {
            return Some(Value::String(now_iso()));
        }
        self.get(name).cloned()
    }

    /// Looks up a variable given either a bare reference or a plain name.
    pub fn lookup_name_or_reference(&self, text: &str) -> Option<Value> {
        match bare_reference(text) {
            Some(_) => self.lookup_bare(text),
            None => self.get(text.trim()).cloned(),
        }
    }

    /// Binds the reserved loop variables for one iteration.
    pub fn bind_loop(&mut self, index: usize, count: usize, item: &Value) {
        self.set(LOOP_INDEX, Value::from(index as u64));
        self.set(LOOP_COUNT, Value::from(count as u64));
        self.set(LOOP_ITEM, item.clone());
        let (text, html) = match item {
            Value::Object(fields) => (
                fields
                    .get("text")
                    .map(display_value)
                    .unwrap_or_else(|| display_value(item)),
                fields.get("html").map(display_value).unwrap_or_default(),
            ),
            other => (display_value(other), String::new()),
        };
        self.set(LOOP_TEXT, Value::String(text));
        self.set(LOOP_HTML, Value::String(html));
    }

    fn reference_text(&self, name: &str) -> String {
        if name == NOW {
            return now_iso();
        }
        self.get(name).map(display_value).unwrap_or_default()
    }
}

/// Name inside `text` when it is exactly one `{$name}` token.
pub fn bare_reference(text: &str) -> Option<&str> {
    BARE_REFERENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Names of every reference in `text`, in order of appearance.
pub fn references(text: &str) -> Vec<&str> {
    REFERENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// String form used for interpolation: primitives verbatim, containers as
/// JSON, null as the empty string.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => format_number(number),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn format_number(number: &serde_json::Number) -> String {
    if let Some(int) = number.as_i64() {
        return int.to_string();
    }
    if let Some(uint) = number.as_u64() {
        return uint.to_string();
    }
    match number.as_f64() {
        Some(float) if float.fract() == 0.0 && float.abs() < 1e15 => format!("{}", float as i64),
        Some(float) => float.to_string(),
        None => number.to_string(),
    }
}

/// Coerces a resolved string into a boolean, number or JSON container when
/// the text is unambiguous; otherwise keeps the string.
pub fn parse_value(text: &str) -> Value {
    let trimmed = text.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if NUMBER.is_match(trimmed) {
        if let Ok(int) = trimmed.parse::<i64>() {
            return Value::from(int);
        }
        if let Some(number) = trimmed
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return Value::Number(number);
        }
    }
    let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if looks_like_json {
        if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
            return parsed;
        }
    }
    Value::String(text.to_string())
}

/// Numeric view of a value; `NaN` when it has no numeric reading.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(f64::NAN),
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                f64::NAN
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

/// Truthiness of a value: empty strings, zero, NaN and null are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
