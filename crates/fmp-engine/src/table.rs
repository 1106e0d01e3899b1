//! Key-indexed merged tables.

use crate::error::Result;
use crate::identifier::Symbol;
use crate::partial::Record;
use polars::prelude::*;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Fields that uniquely identify a row.
///
/// The identifier field (usually `symbol`) is always the first key field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    identifier: String,
    fields: Vec<String>,
}

impl KeySpec {
    /// Create a key over `fields`, led by `identifier`.
    ///
    /// # Example
    /// ```
    /// use fmp_engine::KeySpec;
    ///
    /// let key = KeySpec::new("symbol", ["date", "period"]);
    /// assert_eq!(key.fields(), ["symbol", "date", "period"]);
    /// ```
    pub fn new<I, S>(identifier: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let identifier = identifier.into();
        let mut all = vec![identifier.clone()];
        for field in fields {
            let field = field.into();
            if !all.contains(&field) {
                all.push(field);
            }
        }
        Self {
            identifier,
            fields: all,
        }
    }

    /// Name of the identifier column.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// All key fields, identifier first.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Extract the composite key of `record`, or `None` if a key field is
    /// missing or null.
    pub fn extract(&self, record: &Record) -> Option<CompositeKey> {
        self.fields
            .iter()
            .map(|field| record.get(field).and_then(key_part))
            .collect::<Option<Vec<_>>>()
            .map(CompositeKey)
    }
}

fn key_part(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Values of the key fields of one row, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey(pub Vec<String>);

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("|"))
    }
}

/// A source that failed during a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    /// Identifiers covered by the source
    pub identifiers: Vec<Symbol>,
    /// Page, for paginated sources
    pub page: Option<u32>,
    /// Error message
    pub message: String,
}

/// Accounting of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Number of sources (batches or pages) considered
    pub sources: usize,
    /// Sources that returned data or an empty result
    pub succeeded: usize,
    /// Sources past a truncation point, ignored
    pub past_truncation: usize,
    /// Rows removed as duplicates of an earlier key
    pub duplicates: usize,
    /// Rows dropped because a key field was missing
    pub missing_key: usize,
    /// Failed sources
    pub failures: Vec<SourceFailure>,
    /// Identifiers with at least one failed source, in input order
    pub failed_identifiers: Vec<Symbol>,
    /// Identifiers whose pages stopped at the page cap, in input order
    pub truncated_identifiers: Vec<Symbol>,
}

impl MergeReport {
    /// Number of failed sources.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether anything failed or was cut off at the page cap.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() || !self.truncated_identifiers.is_empty()
    }

    /// One-line description, e.g.
    /// `17 of 20 sources succeeded; failed identifiers: [A, B, C]`.
    pub fn summary(&self) -> String {
        let considered = self.sources.saturating_sub(self.past_truncation);
        let mut line = format!("{} of {} sources succeeded", self.succeeded, considered);
        if !self.failed_identifiers.is_empty() {
            let names: Vec<&str> = self.failed_identifiers.iter().map(Symbol::as_str).collect();
            line.push_str(&format!("; failed identifiers: [{}]", names.join(", ")));
        }
        if !self.truncated_identifiers.is_empty() {
            let names: Vec<&str> = self.truncated_identifiers.iter().map(Symbol::as_str).collect();
            line.push_str(&format!("; truncated at page cap: [{}]", names.join(", ")));
        }
        line
    }
}

/// The merged, de-duplicated result of a fetch.
///
/// Rows are unique by [`KeySpec`] and ordered by identifier input order,
/// then batch or page order, then provider order. The table is immutable
/// once built.
#[derive(Debug, Clone)]
pub struct MergedTable {
    key: KeySpec,
    rows: Vec<Record>,
    index: HashMap<CompositeKey, usize>,
    frame: DataFrame,
    report: MergeReport,
    empty_identifiers: Vec<Symbol>,
}

impl MergedTable {
    pub(crate) fn build(
        key: KeySpec,
        rows: Vec<(CompositeKey, Record)>,
        report: MergeReport,
        empty_identifiers: Vec<Symbol>,
    ) -> Result<Self> {
        let index = rows
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
        let rows: Vec<Record> = rows.into_iter().map(|(_, r)| r).collect();
        let frame = records_to_frame(&rows, key.fields())?;
        Ok(Self {
            key,
            rows,
            index,
            frame,
            report,
            empty_identifiers,
        })
    }

    /// Rebuild a table from previously merged rows, e.g. loaded from a cache.
    ///
    /// Rows are taken in the given order and must already be unique by key;
    /// later duplicates and rows missing a key field are skipped.
    pub fn from_rows(key: KeySpec, rows: Vec<Record>) -> Result<Self> {
        let mut report = MergeReport::default();
        let mut seen = std::collections::HashSet::new();
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            match key.extract(&row) {
                Some(k) if seen.insert(k.clone()) => keyed.push((k, row)),
                Some(_) => report.duplicates += 1,
                None => report.missing_key += 1,
            }
        }
        Self::build(key, keyed, report, Vec::new())
    }

    /// Polars view of the rows, key columns first.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Consume into the DataFrame.
    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Rows in canonical order.
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Key this table is indexed by.
    pub const fn key(&self) -> &KeySpec {
        &self.key
    }

    /// Look a row up by its composite key.
    pub fn get(&self, key: &CompositeKey) -> Option<&Record> {
        self.index.get(key).map(|&i| &self.rows[i])
    }

    /// Look a row up by key parts, e.g. `["AAPL", "2024-09-28", "FY"]`.
    pub fn lookup<S: AsRef<str>>(&self, parts: &[S]) -> Option<&Record> {
        let key = CompositeKey(parts.iter().map(|p| p.as_ref().to_string()).collect());
        self.get(&key)
    }

    /// Composite keys in row order.
    pub fn keys(&self) -> impl Iterator<Item = CompositeKey> + '_ {
        self.rows.iter().filter_map(|row| self.key.extract(row))
    }

    /// Merge accounting.
    pub const fn report(&self) -> &MergeReport {
        &self.report
    }

    /// Identifiers whose data is missing or incomplete because a fetch failed.
    pub fn failed_identifiers(&self) -> &[Symbol] {
        &self.report.failed_identifiers
    }

    /// Identifiers whose rows stop at the page cap.
    pub fn truncated_identifiers(&self) -> &[Symbol] {
        &self.report.truncated_identifiers
    }

    /// Identifiers that were fetched successfully but produced no rows.
    pub fn empty_identifiers(&self) -> &[Symbol] {
        &self.empty_identifiers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Json,
}

impl ColumnKind {
    fn widen(self, value: &Value) -> Self {
        let observed = match value {
            Value::Null => return self,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_i64() => Self::Int,
            Value::Number(_) => Self::Float,
            Value::String(_) => Self::Str,
            Value::Array(_) | Value::Object(_) => Self::Json,
        };
        match (self, observed) {
            (Self::Null, o) => o,
            (a, b) if a == b => a,
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => Self::Float,
            _ => Self::Json,
        }
    }
}

/// Convert records into a DataFrame.
///
/// `leading` columns come first, then every other field in order of first
/// appearance. Column types are inferred per column; mixed columns fall back
/// to strings.
pub fn records_to_frame<S: AsRef<str>>(records: &[Record], leading: &[S]) -> Result<DataFrame> {
    let mut names: Vec<String> = leading.iter().map(|s| s.as_ref().to_string()).collect();
    for record in records {
        for field in record.keys() {
            if !names.iter().any(|n| n == field) {
                names.push(field.clone());
            }
        }
    }

    let height = records.len();
    let columns: Vec<Column> = names
        .iter()
        .map(|name| {
            let values: Vec<&Value> = records
                .iter()
                .map(|r| r.get(name).unwrap_or(&Value::Null))
                .collect();
            let kind = values
                .iter()
                .fold(ColumnKind::Null, |kind, v| kind.widen(v));
            build_series(name, kind, &values, height).into()
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

fn build_series(name: &str, kind: ColumnKind, values: &[&Value], height: usize) -> Series {
    match kind {
        ColumnKind::Null => Series::new_null(name.into(), height),
        ColumnKind::Bool => {
            let data: Vec<Option<bool>> = values.iter().map(|v| v.as_bool()).collect();
            Series::new(name.into(), data)
        }
        ColumnKind::Int => {
            let data: Vec<Option<i64>> = values.iter().map(|v| v.as_i64()).collect();
            Series::new(name.into(), data)
        }
        ColumnKind::Float => {
            let data: Vec<Option<f64>> = values.iter().map(|v| v.as_f64()).collect();
            Series::new(name.into(), data)
        }
        ColumnKind::Str => {
            let data: Vec<Option<String>> = values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect();
            Series::new(name.into(), data)
        }
        ColumnKind::Json => {
            let data: Vec<Option<String>> = values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect();
            Series::new(name.into(), data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_key_extract() {
        let key = KeySpec::new("symbol", ["symbol", "date"]);
        assert_eq!(key.fields(), ["symbol", "date"]);

        let row = record(json!({"symbol": "AAPL", "date": "2024-01-02", "close": 1.5}));
        assert_eq!(key.extract(&row).unwrap().to_string(), "AAPL|2024-01-02");

        let missing = record(json!({"symbol": "AAPL", "date": null}));
        assert!(key.extract(&missing).is_none());
    }

    #[test]
    fn test_frame_column_inference() {
        let rows = vec![
            record(json!({"symbol": "AAPL", "volume": 10, "close": 1.5, "flag": true})),
            record(json!({"symbol": "MSFT", "volume": 20, "close": 2, "extra": [1, 2]})),
        ];
        let frame = records_to_frame(&rows, &["symbol"]).unwrap();

        let names: Vec<&str> = frame.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["symbol", "volume", "close", "flag", "extra"]);
        assert_eq!(frame.column("volume").unwrap().dtype(), &DataType::Int64);
        assert_eq!(frame.column("close").unwrap().dtype(), &DataType::Float64);
        assert_eq!(frame.column("flag").unwrap().dtype(), &DataType::Boolean);
        assert_eq!(frame.column("extra").unwrap().dtype(), &DataType::String);
        assert_eq!(frame.height(), 2);
    }

    #[test]
    fn test_from_rows_indexes_and_skips_duplicates() {
        let key = KeySpec::new("symbol", ["date"]);
        let rows = vec![
            record(json!({"symbol": "AAPL", "date": "d1", "close": 1.0})),
            record(json!({"symbol": "AAPL", "date": "d1", "close": 9.0})),
            record(json!({"symbol": "AAPL", "date": "d2", "close": 2.0})),
        ];
        let table = MergedTable::from_rows(key, rows).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.report().duplicates, 1);
        assert_eq!(table.lookup(&["AAPL", "d1"]).unwrap()["close"], json!(1.0));
    }

    #[test]
    fn test_summary() {
        let report = MergeReport {
            sources: 20,
            succeeded: 17,
            failures: vec![
                SourceFailure {
                    identifiers: vec![Symbol::new("A")],
                    page: None,
                    message: "HTTP 500".into(),
                };
                3
            ],
            failed_identifiers: vec![Symbol::new("A"), Symbol::new("B"), Symbol::new("C")],
            ..Default::default()
        };
        assert_eq!(
            report.summary(),
            "17 of 20 sources succeeded; failed identifiers: [A, B, C]"
        );
    }
}
