//! Partial results produced by a single batch or page fetch.

use crate::error::{EngineError, Result};
use serde_json::{Map, Value};

/// One provider record: a JSON object keyed by provider field names.
pub type Record = Map<String, Value>;

/// Raw result of one unit of work, before merging.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PartialResult {
    /// A list of records (batch endpoints, page contents)
    Records(Vec<Record>),
    /// A single record (profile-style endpoints)
    Single(Record),
    /// Nothing returned; terminates pagination
    #[default]
    Empty,
}

impl PartialResult {
    /// Interpret a decoded JSON body.
    ///
    /// `null`, `[]` and `{}` are empty. Arrays must contain only objects.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Empty),
            Value::Array(items) if items.is_empty() => Ok(Self::Empty),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(EngineError::Payload(format!(
                        "expected an object in the response array, got {}",
                        kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::Records),
            Value::Object(record) if record.is_empty() => Ok(Self::Empty),
            Value::Object(record) => Ok(Self::Single(record)),
            other => Err(EngineError::Payload(format!(
                "expected an array or object, got {}",
                kind(&other)
            ))),
        }
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Records(records) => records.is_empty(),
            Self::Single(_) => false,
            Self::Empty => true,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        match self {
            Self::Records(records) => records.len(),
            Self::Single(_) => 1,
            Self::Empty => 0,
        }
    }

    /// Consume into a flat list of records.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Records(records) => records,
            Self::Single(record) => vec![record],
            Self::Empty => Vec::new(),
        }
    }
}

impl From<Vec<Record>> for PartialResult {
    fn from(records: Vec<Record>) -> Self {
        if records.is_empty() {
            Self::Empty
        } else {
            Self::Records(records)
        }
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
