//! Rendering merged tables as a pretty table, CSV or JSON.

use clap::ValueEnum;
use fmp_engine::MergedTable;
use serde_json::Value;
use std::io::Write;
use thiserror::Error;

/// Errors that can occur while writing output.
#[derive(Debug, Error)]
pub(crate) enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Polars table view
    #[default]
    Table,
    /// Comma-separated values, key columns first
    Csv,
    /// Pretty-printed JSON array of rows
    Json,
}

/// Column order of the CSV output: the frame's columns.
fn columns(table: &MergedTable) -> Vec<String> {
    table
        .frame()
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render `table` in `format`.
pub(crate) fn render(table: &MergedTable, format: OutputFormat) -> Result<String, ExportError> {
    match format {
        OutputFormat::Table => Ok(format!("{}", table.frame())),
        OutputFormat::Csv => {
            let columns = columns(table);
            let mut wtr = csv::Writer::from_writer(vec![]);
            wtr.write_record(&columns)?;
            for row in table.rows() {
                wtr.write_record(columns.iter().map(|c| cell(row.get(c))))?;
            }
            let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(table.rows())?),
    }
}

/// Write `table` to stdout.
pub(crate) fn print(table: &MergedTable, format: OutputFormat) -> Result<(), ExportError> {
    let rendered = render(table, format)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", rendered.trim_end())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmp_engine::KeySpec;
    use serde_json::json;

    fn table() -> MergedTable {
        let rows = [
            json!({"symbol": "AAPL", "date": "2024-06-30", "revenue": 85.8, "note": "a,b"}),
            json!({"symbol": "MSFT", "date": "2024-06-30", "revenue": null}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        MergedTable::from_rows(KeySpec::new("symbol", ["date"]), rows).unwrap()
    }

    #[test]
    fn test_csv_output() {
        let csv = render(&table(), OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("symbol,date"));
        assert!(lines[1].contains("\"a,b\""));
        assert!(lines[2].starts_with("MSFT,2024-06-30"));
    }

    #[test]
    fn test_json_output() {
        let json = render(&table(), OutputFormat::Json).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["symbol"], "AAPL");
    }

    #[test]
    fn test_table_output() {
        let rendered = render(&table(), OutputFormat::Table).unwrap();
        assert!(rendered.contains("AAPL"));
        assert!(rendered.contains("MSFT"));
    }
}
