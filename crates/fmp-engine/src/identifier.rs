//! Identifiers and catalogue validation.
//!
//! Every fetch entry point resolves the caller's identifiers against the
//! provider's catalogue once, before any work is dispatched. Unknown tokens
//! fail the whole call with [`EngineError::InvalidIdentifier`].

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A provider identifier such as a ticker symbol or a forex pair.
///
/// Symbols are normalised to trimmed upper-case on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a normalised symbol.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_uppercase())
    }

    /// Create a symbol without changing case (indicator names are case-sensitive).
    pub fn verbatim(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    /// The symbol as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a comma-separated list ("aapl, msft") into symbols.
    ///
    /// Blank entries are skipped and duplicates collapse onto their first
    /// occurrence.
    pub fn parse_list(input: &str) -> Vec<Self> {
        dedup(input.split(',').filter(|s| !s.trim().is_empty()).map(Self::new))
    }

    /// Join symbols with commas, the form batch endpoints expect.
    pub fn join(symbols: &[Self]) -> String {
        symbols
            .iter()
            .map(Self::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Remove duplicate symbols, keeping the first occurrence.
pub fn dedup(symbols: impl IntoIterator<Item = Symbol>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Provider catalogue an identifier is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Catalog {
    /// Symbols with financial statements
    Statements,
    /// Symbols with traded market data
    MarketData,
    /// Forex currency pairs
    Forex,
}

impl Catalog {
    /// Canonical name used in configuration and on the command line.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Statements => "statements",
            Self::MarketData => "market_data",
            Self::Forex => "forex",
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Catalog {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "statements" => Ok(Self::Statements),
            "market_data" | "market-data" => Ok(Self::MarketData),
            "forex" | "fx" => Ok(Self::Forex),
            other => Err(EngineError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Source of the provider's "available identifiers" lists.
#[async_trait]
pub trait IdentifierSource: Send + Sync {
    /// All identifiers the provider serves for `catalog`, upper-cased.
    async fn available_identifiers(&self, catalog: Catalog) -> Result<HashSet<String>>;
}

/// Check `requested` against `available`.
///
/// Returns the de-duplicated symbols in input order, or
/// [`EngineError::InvalidIdentifier`] naming every unknown symbol.
pub fn validate(requested: &[Symbol], available: &HashSet<String>) -> Result<Vec<Symbol>> {
    if requested.is_empty() {
        return Err(EngineError::InvalidArgument(
            "at least one identifier is required".to_string(),
        ));
    }

    let unknown: Vec<String> = requested
        .iter()
        .filter(|s| !available.contains(s.as_str()))
        .map(|s| s.to_string())
        .collect();

    if !unknown.is_empty() {
        return Err(EngineError::InvalidIdentifier(unknown));
    }

    Ok(dedup(requested.iter().cloned()))
}

/// Fetch the catalogue from `source` and validate `requested` against it.
pub async fn resolve<S>(source: &S, catalog: Catalog, requested: &[Symbol]) -> Result<Vec<Symbol>>
where
    S: IdentifierSource + ?Sized,
{
    if requested.is_empty() {
        return Err(EngineError::InvalidArgument(
            "at least one identifier is required".to_string(),
        ));
    }
    let available = source.available_identifiers(catalog).await?;
    validate(requested, &available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn catalogue(symbols: &[&str]) -> HashSet<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_symbol_normalisation() {
        assert_eq!(Symbol::new("  aapl ").as_str(), "AAPL");
        assert_eq!(Symbol::verbatim(" realGDP ").as_str(), "realGDP");
    }

    #[test]
    fn test_parse_list_dedups_and_skips_blanks() {
        let symbols = Symbol::parse_list("aapl, msft,,AAPL , nvda");
        assert_eq!(
            symbols,
            vec![Symbol::new("AAPL"), Symbol::new("MSFT"), Symbol::new("NVDA")]
        );
        assert_eq!(Symbol::join(&symbols), "AAPL,MSFT,NVDA");
    }

    #[test]
    fn test_validate_reports_all_unknown() {
        let available = catalogue(&["AAPL", "MSFT"]);
        let requested = Symbol::parse_list("AAPL,FOO,BAR");
        let err = validate(&requested, &available).unwrap_err();
        match err {
            EngineError::InvalidIdentifier(unknown) => {
                assert_eq!(unknown, vec!["FOO".to_string(), "BAR".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_empty_request() {
        let available = catalogue(&["AAPL"]);
        assert!(matches!(
            validate(&[], &available),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[rstest]
    #[case("statements", Catalog::Statements)]
    #[case("market_data", Catalog::MarketData)]
    #[case("Market-Data", Catalog::MarketData)]
    #[case("fx", Catalog::Forex)]
    fn test_catalog_from_str(#[case] input: &str, #[case] expected: Catalog) {
        assert_eq!(input.parse::<Catalog>().unwrap(), expected);
    }

    #[test]
    fn test_catalog_unsupported_mode() {
        assert!(matches!(
            "index".parse::<Catalog>(),
            Err(EngineError::UnsupportedMode(m)) if m == "index"
        ));
    }
}
