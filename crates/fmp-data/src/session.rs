//! Shared state of a client: transport, engine settings and the provider
//! catalogues.

use crate::client::HttpTransport;
use crate::company::Company;
use crate::config::Config;
use crate::economics::Economics;
use crate::error::Result;
use crate::forex::Forex;
use async_trait::async_trait;
use fmp_engine::{
    ApiVersion, BatchFetcher, Catalog, EngineError, EngineSettings, IdentifierSource, Request,
    Symbol, Transport,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Path of the "available identifiers" list of `catalog`.
const fn catalogue_path(catalog: Catalog) -> &'static str {
    match catalog {
        Catalog::Statements => "financial-statement-symbol-lists",
        Catalog::MarketData => "available-traded/list",
        Catalog::Forex => "symbol/available-forex-pairs",
    }
}

/// A connection to the provider.
///
/// The session owns the transport and caches each catalogue after its first
/// download, so repeated validation costs one request per catalogue.
pub struct Session<T: Transport = HttpTransport> {
    transport: T,
    settings: EngineSettings,
    catalogues: Mutex<HashMap<Catalog, Arc<HashSet<String>>>>,
}

impl Session<HttpTransport> {
    /// Session over HTTPS configured from `config`.
    ///
    /// # Errors
    /// Returns [`crate::DataError::MissingApiKey`] when no key is configured
    /// and a configuration error for invalid settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Self::new(transport, config.engine_settings())
    }
}

impl<T: Transport> Session<T> {
    /// Session over any transport.
    pub fn new(transport: T, settings: EngineSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            transport,
            settings,
            catalogues: Mutex::new(HashMap::new()),
        })
    }

    /// The transport in use.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Engine settings in use.
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// A fetcher borrowing this session's transport.
    pub fn fetcher(&self) -> Result<BatchFetcher<'_, T>> {
        Ok(BatchFetcher::new(&self.transport, self.settings)?)
    }

    /// Fetch one request outside the batching engine.
    pub(crate) async fn fetch_raw(&self, request: &Request) -> Result<Value> {
        log::debug!("GET {request}");
        self.transport
            .fetch(request)
            .await
            .map_err(|e| EngineError::from(e).into())
    }

    /// Validate `symbols` against `catalog`.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidIdentifier`] naming every unknown symbol.
    pub async fn resolve(&self, catalog: Catalog, symbols: &[Symbol]) -> Result<Vec<Symbol>> {
        Ok(fmp_engine::resolve(self, catalog, symbols).await?)
    }

    /// Company handle for a comma-separated symbol list, validated against
    /// the statements catalogue.
    ///
    /// # Example
    /// ```no_run
    /// # async fn example(session: fmp_data::Session) -> fmp_data::Result<()> {
    /// let company = session.company("aapl, msft").await?;
    /// assert_eq!(company.symbols().len(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn company(&self, symbols: &str) -> Result<Company<'_, T>> {
        self.company_in(Catalog::Statements, &Symbol::parse_list(symbols))
            .await
    }

    /// Company handle validated against a specific catalogue.
    pub async fn company_in(&self, catalog: Catalog, symbols: &[Symbol]) -> Result<Company<'_, T>> {
        let symbols = self.resolve(catalog, symbols).await?;
        Ok(Company::new(self, symbols))
    }

    /// Forex endpoints.
    pub const fn forex(&self) -> Forex<'_, T> {
        Forex::new(self)
    }

    /// Economic indicator endpoints.
    pub const fn economics(&self) -> Economics<'_, T> {
        Economics::new(self)
    }

    async fn download_catalogue(&self, catalog: Catalog) -> fmp_engine::Result<HashSet<String>> {
        let request = Request::new(ApiVersion::V3, catalogue_path(catalog));
        log::debug!("downloading {catalog} catalogue");
        let value = self.transport.fetch(&request).await?;
        parse_catalogue(value)
    }
}

/// Identifiers of a catalogue response: either a list of strings or a list
/// of objects with a `symbol` field.
fn parse_catalogue(value: Value) -> fmp_engine::Result<HashSet<String>> {
    let Value::Array(entries) = value else {
        return Err(EngineError::Payload(
            "catalogue response is not an array".to_string(),
        ));
    };
    Ok(entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(symbol) => Some(symbol.as_str()),
            Value::Object(object) => object.get("symbol").and_then(Value::as_str),
            _ => None,
        })
        .map(|symbol| symbol.trim().to_uppercase())
        .collect())
}

#[async_trait]
impl<T: Transport> IdentifierSource for Session<T> {
    async fn available_identifiers(&self, catalog: Catalog) -> fmp_engine::Result<HashSet<String>> {
        let mut catalogues = self.catalogues.lock().await;
        if let Some(cached) = catalogues.get(&catalog) {
            return Ok(cached.as_ref().clone());
        }
        let downloaded = Arc::new(self.download_catalogue(catalog).await?);
        log::info!("{catalog} catalogue: {} identifier(s)", downloaded.len());
        catalogues.insert(catalog, Arc::clone(&downloaded));
        Ok(downloaded.as_ref().clone())
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalogue_of_strings() {
        let parsed = parse_catalogue(json!(["aapl", "MSFT"])).unwrap();
        assert!(parsed.contains("AAPL"));
        assert!(parsed.contains("MSFT"));
    }

    #[test]
    fn test_catalogue_of_objects() {
        let parsed = parse_catalogue(json!([
            {"symbol": "EURUSD", "name": "EUR/USD"},
            {"name": "no symbol"}
        ]))
        .unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains("EURUSD"));
    }

    #[test]
    fn test_catalogue_rejects_object() {
        assert!(matches!(
            parse_catalogue(json!({"symbol": "AAPL"})),
            Err(EngineError::Payload(_))
        ));
    }

    #[test]
    fn test_catalogue_paths() {
        assert_eq!(catalogue_path(Catalog::Statements), "financial-statement-symbol-lists");
        assert_eq!(catalogue_path(Catalog::MarketData), "available-traded/list");
        assert_eq!(catalogue_path(Catalog::Forex), "symbol/available-forex-pairs");
    }
}
