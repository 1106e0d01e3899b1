//! Transport abstraction.
//!
//! The engine issues one logical request per batch or page. Everything
//! HTTP-specific (base URL, credentials, retries, rate limiting) lives
//! behind [`Transport`].

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Provider API version a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApiVersion {
    /// `/api/v3/`
    #[default]
    V3,
    /// `/api/v4/`
    V4,
}

impl ApiVersion {
    /// Path segment for this version.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V3 => "v3",
            Self::V4 => "v4",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single GET request relative to the provider's API root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// API version
    pub version: ApiVersion,
    /// Path below `/api/{version}/`
    pub path: String,
    /// Query parameters, in insertion order
    pub query: Vec<(String, String)>,
}

impl Request {
    /// Create a request with no query parameters.
    pub fn new(version: ApiVersion, path: impl Into<String>) -> Self {
        Self {
            version,
            path: path.into(),
            query: Vec::new(),
        }
    }

    /// Add a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter when `value` is present.
    pub fn param_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// Value of the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.path)?;
        for (i, (key, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

/// Executes requests against the data provider.
///
/// Implementations must be shareable across concurrently running tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request and return the decoded JSON body.
    async fn fetch(&self, request: &Request) -> Result<Value, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn fetch(&self, request: &Request) -> Result<Value, TransportError> {
        (**self).fetch(request).await
    }
}
