//! Converting nested provider responses into flat records.

use fmp_engine::{EngineError, PartialResult, Record, Result, Symbol};
use serde_json::Value;

/// Flatten a historical price or rate response into `(symbol, date, ...)`
/// records.
///
/// Accepts the three shapes the provider uses:
/// - `{"symbol": .., "historical": [..]}` for a single identifier,
/// - `{"historicalStockList": [{"symbol": .., "historical": [..]}, ..]}` for
///   batched identifiers,
/// - a bare array of bars (intraday charts), tagged with the only target.
///
/// # Example
/// ```
/// use fmp_data::reshape::flatten_historical;
/// use fmp_engine::Symbol;
/// use serde_json::json;
///
/// let value = json!({"symbol": "EURUSD", "historical": [{"date": "2024-01-02", "close": 1.09}]});
/// let rows = flatten_historical(&[Symbol::new("EURUSD")], value).unwrap().into_records();
/// assert_eq!(rows[0]["symbol"], "EURUSD");
/// ```
pub fn flatten_historical(target: &[Symbol], value: Value) -> Result<PartialResult> {
    match value {
        Value::Object(mut object) => {
            if let Some(list) = object.remove("historicalStockList") {
                let Value::Array(entries) = list else {
                    return Err(EngineError::Payload(
                        "historicalStockList is not an array".to_string(),
                    ));
                };
                let mut records = Vec::new();
                for entry in entries {
                    match entry {
                        Value::Object(entry) => records.extend(series_records(entry, None)?),
                        _ => {
                            return Err(EngineError::Payload(
                                "historicalStockList entry is not an object".to_string(),
                            ));
                        }
                    }
                }
                return Ok(records.into());
            }
            if object.is_empty() {
                return Ok(PartialResult::Empty);
            }
            Ok(series_records(object, single(target))?.into())
        }
        Value::Array(_) | Value::Null => {
            let mut records = PartialResult::from_value(value)?.into_records();
            if let Some(symbol) = single(target) {
                for record in &mut records {
                    record
                        .entry("symbol")
                        .or_insert_with(|| Value::String(symbol.to_string()));
                }
            }
            Ok(records.into())
        }
        other => PartialResult::from_value(other),
    }
}

fn single(target: &[Symbol]) -> Option<&Symbol> {
    match target {
        [only] => Some(only),
        _ => None,
    }
}

/// Records of one `{"symbol": .., "historical": [..]}` object.
fn series_records(mut object: Record, fallback: Option<&Symbol>) -> Result<Vec<Record>> {
    let symbol = match object.remove("symbol") {
        Some(Value::String(symbol)) => Some(symbol),
        _ => fallback.map(Symbol::to_string),
    };
    let bars = match object.remove("historical") {
        Some(Value::Array(bars)) => bars,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(EngineError::Payload(
                "historical is not an array".to_string(),
            ));
        }
    };

    let mut records = Vec::with_capacity(bars.len());
    for bar in bars {
        let Value::Object(mut bar) = bar else {
            return Err(EngineError::Payload(
                "historical entry is not an object".to_string(),
            ));
        };
        if let Some(symbol) = &symbol {
            bar.insert("symbol".to_string(), Value::String(symbol.clone()));
        }
        records.push(bar);
    }
    Ok(records)
}

/// Flatten revenue segmentation into `(symbol, date, segment, value)` rows.
///
/// The provider answers with `[{"2023-09-30": {"iPhone": 2.0e11, ..}}, ..]`.
pub fn flatten_segments(symbol: &Symbol, value: Value) -> Result<PartialResult> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(object) => vec![Value::Object(object)],
        Value::Null => return Ok(PartialResult::Empty),
        _ => {
            return Err(EngineError::Payload(
                "segmentation response is not an array".to_string(),
            ));
        }
    };

    let mut records = Vec::new();
    for entry in entries {
        let Value::Object(by_date) = entry else {
            return Err(EngineError::Payload(
                "segmentation entry is not an object".to_string(),
            ));
        };
        for (date, segments) in by_date {
            let Value::Object(segments) = segments else {
                continue;
            };
            for (segment, amount) in segments {
                let mut record = Record::new();
                record.insert("symbol".to_string(), Value::String(symbol.to_string()));
                record.insert("date".to_string(), Value::String(date.clone()));
                record.insert("segment".to_string(), Value::String(segment));
                record.insert("value".to_string(), amount);
                records.push(record);
            }
        }
    }
    Ok(records.into())
}

/// Keep only records whose `symbol` is one of `wanted`.
pub fn retain_symbols(records: Vec<Record>, wanted: &[Symbol]) -> Vec<Record> {
    if wanted.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| {
            record
                .get("symbol")
                .and_then(Value::as_str)
                .is_some_and(|s| wanted.iter().any(|w| w.as_str().eq_ignore_ascii_case(s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batched_historical() {
        let value = json!({
            "historicalStockList": [
                {"symbol": "AAPL", "historical": [{"date": "d2", "close": 2}, {"date": "d1", "close": 1}]},
                {"symbol": "MSFT", "historical": [{"date": "d2", "close": 3}]}
            ]
        });
        let records = flatten_historical(&Symbol::parse_list("AAPL,MSFT"), value)
            .unwrap()
            .into_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["symbol"], "MSFT");
        assert_eq!(records[0]["date"], "d2");
    }

    #[test]
    fn test_intraday_bars_tagged_with_target() {
        let value = json!([{"date": "2024-01-02 09:30:00", "close": 1.0}]);
        let records = flatten_historical(&[Symbol::new("AAPL")], value)
            .unwrap()
            .into_records();
        assert_eq!(records[0]["symbol"], "AAPL");
    }

    #[test]
    fn test_empty_historical() {
        assert!(flatten_historical(&[Symbol::new("X")], json!({})).unwrap().is_empty());
        assert!(
            flatten_historical(&[Symbol::new("X")], json!({"symbol": "X", "historical": []}))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_segments() {
        let value = json!([
            {"2023-09-30": {"iPhone": 200.0, "Mac": 29.0}},
            {"2022-09-24": {"iPhone": 205.0}}
        ]);
        let records = flatten_segments(&Symbol::new("AAPL"), value)
            .unwrap()
            .into_records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r["symbol"] == "AAPL"));
        assert!(
            records
                .iter()
                .any(|r| r["date"] == "2022-09-24" && r["segment"] == "iPhone" && r["value"] == 205.0)
        );
    }

    #[test]
    fn test_retain_symbols() {
        let records = PartialResult::from_value(json!([
            {"symbol": "EURUSD"}, {"symbol": "GBPUSD"}, {"name": "no symbol"}
        ]))
        .unwrap()
        .into_records();
        let kept = retain_symbols(records.clone(), &[Symbol::new("eurusd")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(retain_symbols(records, &[]).len(), 3);
    }
}
