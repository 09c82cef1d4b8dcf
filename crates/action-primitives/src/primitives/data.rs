//! Data primitives: `set`, `merge` and `csv`
//!
//! These never touch the page; they read and write run variables only.

use crate::{errors::ActionError, types::ActionReport};
use action_flow::vars::{display_value, parse_value, references};
use action_flow::RuntimeVars;
use chrono::Utc;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::debug;

/// Execute set primitive
///
/// A value that is exactly one `{$name}` reference copies the variable with
/// its type; anything else is template-resolved and then coerced.
pub fn execute_set(
    vars: &mut RuntimeVars,
    var_name: &str,
    raw: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let value = vars
        .lookup_bare(raw)
        .unwrap_or_else(|| parse_value(&vars.resolve(raw)));
    debug!(var = %var_name, value = %value, "Setting variable");
    vars.set(var_name, value.clone());

    Ok(ActionReport::success(started_at, start_instant).with_output(value))
}

/// Execute merge primitive
///
/// Sources are the references in `sources` or, without any reference, a
/// comma or whitespace separated list of variable names. Unknown names are
/// skipped.
///
/// * all objects: shallow merge, later keys win
/// * any array: concatenation, arrays flattened one level
/// * otherwise: string concatenation of the display forms
pub fn execute_merge(
    vars: &mut RuntimeVars,
    sources: &str,
    var_name: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let names: Vec<String> = {
        let refs = references(sources);
        if refs.is_empty() {
            sources
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            refs.into_iter().map(str::to_string).collect()
        }
    };
    if names.is_empty() {
        return Err(ActionError::Data("merge needs at least one source".to_string()));
    }

    let values: Vec<Value> = names.iter().filter_map(|name| vars.get(name).cloned()).collect();
    debug!(sources = ?names, found = values.len(), "Merging variables");
    let merged = merge_values(values);
    vars.set(var_name, merged.clone());

    Ok(ActionReport::success(started_at, start_instant).with_output(merged))
}

pub fn merge_values(values: Vec<Value>) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    if values.iter().all(Value::is_object) {
        let mut merged = Map::new();
        for value in values {
            if let Value::Object(fields) = value {
                merged.extend(fields);
            }
        }
        return Value::Object(merged);
    }
    if values.iter().any(Value::is_array) {
        let mut merged = Vec::new();
        for value in values {
            match value {
                Value::Array(items) => merged.extend(items),
                other => merged.push(other),
            }
        }
        return Value::Array(merged);
    }
    Value::String(values.iter().map(display_value).collect())
}

/// Execute csv primitive
///
/// Parses `text` (already resolved) with a header row into an array of
/// objects keyed by column name. Short rows are padded with empty strings;
/// extra cells are kept under `column_<n>`.
pub fn execute_csv(
    vars: &mut RuntimeVars,
    text: &str,
    delimiter: u8,
    var_name: Option<&str>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let rows = parse_csv(text, delimiter)?;
    debug!(rows = rows.len(), "Parsed CSV");
    let value = Value::Array(rows);
    if let Some(name) = var_name {
        vars.set(name, value.clone());
    }

    Ok(ActionReport::success(started_at, start_instant).with_output(value))
}

fn parse_csv(text: &str, delimiter: u8) -> Result<Vec<Value>, ActionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| ActionError::Data(format!("invalid CSV header: {err}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ActionError::Data(format!("invalid CSV row: {err}")))?;
        let mut row = Map::new();
        for (position, header) in headers.iter().enumerate() {
            let cell = record.get(position).unwrap_or_default();
            row.insert(header.clone(), Value::String(cell.to_string()));
        }
        for position in headers.len()..record.len() {
            let cell = record.get(position).unwrap_or_default();
            row.insert(format!("column_{}", position + 1), Value::String(cell.to_string()));
        }
        rows.push(Value::Object(row));
    }
    Ok(rows)
}
