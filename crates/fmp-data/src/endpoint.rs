//! Declarative description of provider endpoints.

use crate::reshape::{flatten_historical, flatten_segments};
use fmp_engine::{ApiVersion, Endpoint, KeySpec, PartialResult, Request, Result, Symbol};
use serde_json::Value;

/// How the target identifiers are placed in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Comma-joined in the last path segment: `quote/AAPL,MSFT`
    Path,
    /// Comma-joined in the `symbol` query parameter
    SymbolParam,
    /// Single identifier in the `name` query parameter (economic indicators)
    NameParam,
}

/// How a response body becomes records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Array of records or a single record
    Records,
    /// Historical series, flattened to one record per bar
    Historical,
    /// Revenue segmentation, flattened to one record per segment and date
    Segments,
}

/// A provider endpoint built from a path, a version and request options.
#[derive(Debug, Clone)]
pub struct Resource {
    label: String,
    version: ApiVersion,
    path: String,
    addressing: Addressing,
    shape: Shape,
    identifier: &'static str,
    key_fields: Vec<&'static str>,
    max_batch: Option<usize>,
    params: Vec<(String, String)>,
    require_rows: bool,
}

impl Resource {
    /// Endpoint at `path` keyed by `(symbol, key_fields..)`.
    pub fn new(version: ApiVersion, path: impl Into<String>, key_fields: &[&'static str]) -> Self {
        let path = path.into();
        Self {
            label: path.trim_end_matches('/').to_string(),
            version,
            path,
            addressing: Addressing::Path,
            shape: Shape::Records,
            identifier: "symbol",
            key_fields: key_fields.to_vec(),
            max_batch: None,
            params: Vec::new(),
            require_rows: true,
        }
    }

    /// Place identifiers according to `addressing`.
    pub const fn addressed(mut self, addressing: Addressing) -> Self {
        self.addressing = addressing;
        self
    }

    /// Reshape responses according to `shape`.
    pub const fn shaped(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    /// Use `identifier` as the identifier column instead of `symbol`.
    pub const fn identified_by(mut self, identifier: &'static str) -> Self {
        self.identifier = identifier;
        self
    }

    /// At most `max` identifiers per request.
    pub const fn batch_limit(mut self, max: usize) -> Self {
        self.max_batch = Some(max);
        self
    }

    /// Add a fixed query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter when `value` is present.
    pub fn param_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// Allow a fetch to produce no rows.
    pub const fn allow_empty(mut self) -> Self {
        self.require_rows = false;
        self
    }

    /// Override the name used in logs.
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Endpoint for Resource {
    fn key_spec(&self) -> KeySpec {
        KeySpec::new(self.identifier, self.key_fields.iter().copied())
    }

    fn request(&self, target: &[Symbol], page: Option<u32>) -> Request {
        let joined = Symbol::join(target);
        let path = self.path.trim_end_matches('/');
        let mut request = match self.addressing {
            Addressing::Path => Request::new(self.version, format!("{path}/{joined}")),
            Addressing::SymbolParam => Request::new(self.version, path).param("symbol", &joined),
            Addressing::NameParam => Request::new(self.version, path).param("name", &joined),
        };
        for (key, value) in &self.params {
            request = request.param(key.as_str(), value);
        }
        request.param_opt("page", page)
    }

    fn max_batch(&self) -> Option<usize> {
        self.max_batch
    }

    fn reshape(&self, target: &[Symbol], value: Value) -> Result<PartialResult> {
        match (self.shape, target) {
            (Shape::Historical, _) => flatten_historical(target, value),
            (Shape::Segments, [symbol]) => flatten_segments(symbol, value),
            _ => PartialResult::from_value(value),
        }
    }

    fn require_rows(&self) -> bool {
        self.require_rows
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_addressing() {
        let endpoint = Resource::new(ApiVersion::V3, "income-statement/", &["date", "period"])
            .param("period", "quarter")
            .param("limit", 8);
        let request = endpoint.request(&Symbol::parse_list("AAPL,MSFT"), None);
        assert_eq!(
            request.to_string(),
            "v3/income-statement/AAPL,MSFT?period=quarter&limit=8"
        );
        assert_eq!(endpoint.key_spec().fields(), ["symbol", "date", "period"]);
    }

    #[test]
    fn test_symbol_param_with_page() {
        let endpoint = Resource::new(ApiVersion::V4, "institutional-ownership/symbol-ownership", &["cik", "date"])
            .addressed(Addressing::SymbolParam);
        let request = endpoint.request(&[Symbol::new("AAPL")], Some(3));
        assert_eq!(request.version, ApiVersion::V4);
        assert_eq!(request.query_value("symbol"), Some("AAPL"));
        assert_eq!(request.query_value("page"), Some("3"));
    }

    #[test]
    fn test_name_param() {
        let endpoint = Resource::new(ApiVersion::V4, "economic", &["date"])
            .addressed(Addressing::NameParam)
            .identified_by("indicator");
        let request = endpoint.request(&[Symbol::verbatim("realGDP")], None);
        assert_eq!(request.to_string(), "v4/economic?name=realGDP");
        assert_eq!(endpoint.key_spec().fields(), ["indicator", "date"]);
    }
}
