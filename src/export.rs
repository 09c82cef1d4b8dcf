//! Result bundle persistence and CSV export of extraction data

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::fs;
use tracing::info;

use action_flow::vars::display_value;

use crate::config::DataFormat;
use crate::errors::RunnerError;
use crate::task_runner::RunBundle;

/// Column used for arrays of scalars
pub const SCALAR_COLUMN: &str = "value";

/// Renders extraction data as CSV.
///
/// Arrays of objects become one row per object with the union of keys as
/// header, in first-seen order. Arrays of scalars and lone scalars use a
/// single `value` column; a lone object is one row. Nested objects are
/// flattened one level, anything deeper is written as JSON.
pub fn data_to_csv(data: &Value) -> Result<String, RunnerError> {
    let rows: Vec<Value> = match data {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.iter().all(Value::is_object) && !rows.is_empty() {
        let flat: Vec<Map<String, Value>> = rows
            .iter()
            .filter_map(Value::as_object)
            .map(flatten_row)
            .collect();
        let headers = collect_headers(&flat);
        writer.write_record(&headers)?;
        for fields in &flat {
            let record: Vec<String> = headers
                .iter()
                .map(|header| fields.get(header).map(display_value).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
    } else {
        writer.write_record([SCALAR_COLUMN])?;
        for row in &rows {
            writer.write_record([display_value(row)])?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| RunnerError::Export(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| RunnerError::Export(err.to_string()))
}

fn collect_headers(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for key in rows.iter().flat_map(|row| row.keys()) {
        if !headers.iter().any(|existing| existing == key) {
            headers.push(key.clone());
        }
    }
    headers
}

/// Writes `<dir>/<run_id>.json` and, for CSV output, `<dir>/<run_id>.csv`.
/// Returns the written paths.
pub async fn write_bundle(
    bundle: &RunBundle,
    dir: &Path,
    format: DataFormat,
) -> Result<Vec<PathBuf>, RunnerError> {
    fs::create_dir_all(dir).await?;
    let mut written = Vec::new();

    let json_path = dir.join(format!("{}.json", bundle.run_id));
    fs::write(&json_path, serde_json::to_vec_pretty(bundle)?).await?;
    written.push(json_path);

    if format == DataFormat::Csv {
        let csv_path = dir.join(format!("{}.csv", bundle.run_id));
        fs::write(&csv_path, data_to_csv(&bundle.data)?).await?;
        written.push(csv_path);
    }

    info!(run_id = %bundle.run_id, files = written.len(), dir = %dir.display(), "Run bundle written");
    Ok(written)
}

/// Flattens one level of nested objects into `parent.child` keys.
pub fn flatten_row(row: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in row {
        match value {
            Value::Object(inner) => {
                for (child, nested) in inner {
                    flat.insert(format!("{key}.{child}"), nested.clone());
                }
            }
            other => {
                flat.insert(key.clone(), other.clone());
            }
        }
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_share_a_header() {
        let csv = data_to_csv(&json!([
            {"name": "Tea", "price": 3},
            {"name": "Coffee", "origin": "BR"},
            {"name": "Cocoa, dark", "tags": ["sweet"]}
        ]))
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "name,price,origin,tags");
        assert_eq!(lines[1], "Tea,3,,");
        assert_eq!(lines[2], "Coffee,,BR,");
        assert_eq!(lines[3], r#""Cocoa, dark",,,"[""sweet""]""#);
    }

    #[test]
    fn scalars_use_a_value_column() {
        let csv = data_to_csv(&json!(["a", 2, true])).unwrap();
        assert_eq!(csv, "value\na\n2\ntrue\n");
        assert_eq!(data_to_csv(&json!("solo")).unwrap(), "value\nsolo\n");
        assert_eq!(data_to_csv(&Value::Null).unwrap(), "value\n");
    }

    #[test]
    fn nested_columns_are_flattened() {
        let csv = data_to_csv(&json!([{"id": 1, "seller": {"name": "Ann"}}])).unwrap();
        assert_eq!(csv, "id,seller.name\n1,Ann\n");
    }

    #[test]
    fn nested_objects_flatten_one_level() {
        let row = json!({"id": 1, "meta": {"a": 1, "b": {"deep": true}}});
        let flat = flatten_row(row.as_object().unwrap());
        assert_eq!(flat.get("meta.a"), Some(&json!(1)));
        assert_eq!(flat.get("meta.b"), Some(&json!({"deep": true})));
        assert_eq!(flat.get("id"), Some(&json!(1)));
    }
}
