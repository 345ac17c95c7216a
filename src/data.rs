// Plot data loading — CSV or JSON files into a JSON value for the plot pipeline

use anyhow::{Context, Result};
use serde_json::{Map, Number, Value};
use std::path::Path;

/// Load `path` as plot data. `.json` files are parsed as-is; anything else is
/// read as CSV with a header row and becomes an array of row objects.
pub fn load_plot_data(path: &Path) -> Result<Value> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data file: {}", path.display()))?;
        return serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in {}", path.display()));
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Malformed CSV row {} in {}", line + 1, path.display()))?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.to_string(), cell_value(cell)))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}

/// Numeric cells become numbers, empty cells null, everything else strings.
fn cell_value(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(cell.to_string())
}

/// Source context handed to the planner for a plot request.
pub fn plot_context(data: &Value) -> String {
    let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
    format!("Data for plotting:\n{}", pretty)
}
