//! Company-level endpoints: statements, ratios, profiles, quotes, segments,
//! transcripts and historical prices.
//!
//! A [`Company`] is a validated list of symbols bound to a [`Session`]; every
//! method fetches all of its symbols in batches and returns one
//! [`MergedTable`]. Institutional ownership lives in [`crate::ownership`].

use crate::endpoint::{Addressing, Resource, Shape};
use crate::error::{DataError, Result};
use crate::frequency::{Frequency, Period};
use crate::session::Session;
use chrono::NaiveDate;
use fmp_engine::{ApiVersion, EngineError, MergedTable, Symbol, Transport};
use std::fmt;
use std::str::FromStr;

/// Date format of `from`/`to` query parameters
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Period-indexed fundamental reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Report {
    /// Income statement
    IncomeStatement,
    /// Balance sheet statement
    BalanceSheet,
    /// Cash flow statement
    CashFlow,
    /// Financial ratios
    Ratios,
    /// Key metrics
    KeyMetrics,
    /// Financial growth
    Growth,
}

impl Report {
    /// Endpoint path.
    pub const fn path(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "income-statement",
            Self::BalanceSheet => "balance-sheet-statement",
            Self::CashFlow => "cash-flow-statement",
            Self::Ratios => "ratios",
            Self::KeyMetrics => "key-metrics",
            Self::Growth => "financial-growth",
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Report {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, EngineError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" | "income-statement" => Ok(Self::IncomeStatement),
            "balance" | "balance-sheet" | "balance-sheet-statement" => Ok(Self::BalanceSheet),
            "cashflow" | "cash-flow" | "cash-flow-statement" => Ok(Self::CashFlow),
            "ratios" => Ok(Self::Ratios),
            "metrics" | "key-metrics" => Ok(Self::KeyMetrics),
            "growth" | "financial-growth" => Ok(Self::Growth),
            other => Err(EngineError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Revenue segmentation breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segmentation {
    /// Revenue by product line
    Product,
    /// Revenue by region
    Geographic,
}

impl Segmentation {
    const fn path(&self) -> &'static str {
        match self {
            Self::Product => "revenue-product-segmentation",
            Self::Geographic => "revenue-geographic-segmentation",
        }
    }
}

/// One or more validated companies.
#[derive(Debug)]
pub struct Company<'s, T: Transport> {
    pub(crate) session: &'s Session<T>,
    pub(crate) symbols: Vec<Symbol>,
}

impl<'s, T: Transport> Company<'s, T> {
    /// Bind already validated `symbols` to `session`.
    pub(crate) const fn new(session: &'s Session<T>, symbols: Vec<Symbol>) -> Self {
        Self { session, symbols }
    }

    /// The validated symbols, in input order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub(crate) async fn fetch(&self, resource: &Resource) -> Result<MergedTable> {
        Ok(self
            .session
            .fetcher()?
            .fetch_batches(resource, &self.symbols)
            .await?)
    }

    /// Fundamental report for every symbol, keyed by `(symbol, date, period)`.
    ///
    /// # Arguments
    /// * `report` - Which statement or derived report
    /// * `period` - Annual or quarterly figures
    /// * `limit` - Number of most recent periods per symbol
    pub async fn report(
        &self,
        report: Report,
        period: Period,
        limit: Option<u32>,
    ) -> Result<MergedTable> {
        let resource = Resource::new(ApiVersion::V3, report.path(), &["date", "period"])
            .param_opt("period", period.query_value())
            .param_opt("limit", limit);
        self.fetch(&resource).await
    }

    /// Company profiles, one row per symbol.
    pub async fn profile(&self) -> Result<MergedTable> {
        self.fetch(&Resource::new(ApiVersion::V3, "profile", &[]))
            .await
    }

    /// Real-time quotes, one row per symbol.
    pub async fn quote(&self) -> Result<MergedTable> {
        self.fetch(&Resource::new(ApiVersion::V3, "quote", &[])).await
    }

    /// Key executives, keyed by `(symbol, name, title)`.
    pub async fn executives(&self) -> Result<MergedTable> {
        let resource =
            Resource::new(ApiVersion::V3, "key-executives", &["name", "title"]).batch_limit(1);
        self.fetch(&resource).await
    }

    /// Peer lists.
    pub async fn peers(&self) -> Result<MergedTable> {
        let resource = Resource::new(ApiVersion::V4, "stock_peers", &[])
            .addressed(Addressing::SymbolParam);
        self.fetch(&resource).await
    }

    /// Core company information (CIK, exchange, SIC code, addresses).
    pub async fn core_info(&self) -> Result<MergedTable> {
        let resource = Resource::new(ApiVersion::V4, "company-core-information", &[])
            .addressed(Addressing::SymbolParam);
        self.fetch(&resource).await
    }

    /// Revenue segmentation, keyed by `(symbol, date, segment)`.
    pub async fn segments(&self, kind: Segmentation, period: Period) -> Result<MergedTable> {
        let resource = Resource::new(ApiVersion::V4, kind.path(), &["date", "segment"])
            .addressed(Addressing::SymbolParam)
            .shaped(Shape::Segments)
            .batch_limit(1)
            .param("structure", "flat")
            .param_opt("period", period.query_value());
        self.fetch(&resource).await
    }

    /// Revenue by product line.
    pub async fn product_segments(&self, period: Period) -> Result<MergedTable> {
        self.segments(Segmentation::Product, period).await
    }

    /// Revenue by region.
    pub async fn geographic_segments(&self, period: Period) -> Result<MergedTable> {
        self.segments(Segmentation::Geographic, period).await
    }

    /// Earnings call transcripts of `year`, keyed by `(symbol, year, quarter)`.
    ///
    /// With a quarter only that call is fetched, otherwise every call of
    /// the year.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidQuarter`] unless `quarter` is 1-4.
    pub async fn transcripts(&self, year: i32, quarter: Option<u8>) -> Result<MergedTable> {
        let resource = match quarter {
            Some(q @ 1..=4) => {
                Resource::new(ApiVersion::V3, "earning_call_transcript", &["year", "quarter"])
                    .param("year", year)
                    .param("quarter", q)
            }
            Some(other) => return Err(DataError::InvalidQuarter(other)),
            None => Resource::new(
                ApiVersion::V4,
                "batch_earning_call_transcript",
                &["year", "quarter"],
            )
            .param("year", year),
        };
        self.fetch(&resource.batch_limit(1).allow_empty()).await
    }

    /// Historical prices, keyed by `(symbol, date)`.
    ///
    /// Daily series are batched; intraday charts take one symbol per request.
    pub async fn historical_prices(
        &self,
        frequency: Frequency,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<MergedTable> {
        self.fetch(&historical_resource(frequency, from, to)).await
    }
}

/// Endpoint of a historical price or rate series.
pub(crate) fn historical_resource(
    frequency: Frequency,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Resource {
    let resource = match frequency {
        Frequency::Daily => Resource::new(ApiVersion::V3, "historical-price-full", &["date"])
            .batch_limit(5),
        Frequency::Intraday(interval) => Resource::new(
            ApiVersion::V3,
            format!("historical-chart/{}", interval.as_str()),
            &["date"],
        )
        .batch_limit(1),
    };
    resource
        .shaped(Shape::Historical)
        .param_opt("from", from.map(|d| d.format(DATE_FORMAT)))
        .param_opt("to", to.map(|d| d.format(DATE_FORMAT)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::Interval;
    use fmp_engine::Endpoint;
    use rstest::rstest;

    #[rstest]
    #[case("income", Report::IncomeStatement)]
    #[case("balance-sheet", Report::BalanceSheet)]
    #[case("CASHFLOW", Report::CashFlow)]
    #[case("metrics", Report::KeyMetrics)]
    fn test_report_parsing(#[case] input: &str, #[case] expected: Report) {
        assert_eq!(input.parse::<Report>().unwrap(), expected);
    }

    #[test]
    fn test_daily_prices_are_batched() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1);
        let resource = historical_resource(Frequency::Daily, from, None);
        let request = resource.request(&Symbol::parse_list("AAPL,MSFT"), None);
        assert_eq!(request.path, "historical-price-full/AAPL,MSFT");
        assert_eq!(request.query_value("from"), Some("2024-01-01"));
        assert_eq!(request.query_value("to"), None);
        assert_eq!(resource.max_batch(), Some(5));
    }

    #[test]
    fn test_intraday_prices_one_per_request() {
        let resource =
            historical_resource(Frequency::Intraday(Interval::FifteenMinutes), None, None);
        let request = resource.request(&[Symbol::new("AAPL")], None);
        assert_eq!(request.path, "historical-chart/15min/AAPL");
        assert_eq!(resource.max_batch(), Some(1));
    }
}
