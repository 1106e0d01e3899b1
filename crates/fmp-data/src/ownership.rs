//! Institutional ownership disclosed through 13F filings.

use crate::company::{Company, DATE_FORMAT};
use crate::endpoint::{Addressing, Resource};
use crate::error::Result;
use crate::frequency::{last_completed_quarter, quarter_end};
use chrono::{Local, NaiveDate};
use fmp_engine::{ApiVersion, MergedTable, Transport};

const OWNERSHIP_PATH: &str = "institutional-ownership/symbol-ownership";
const HOLDERS_PATH: &str = "institutional-ownership/institutional-holders/symbol-ownership-percent";

/// Holders endpoint for the quarter ending on `date`.
fn holders_resource(date: NaiveDate) -> Resource {
    Resource::new(ApiVersion::V4, HOLDERS_PATH, &["cik", "date"])
        .addressed(Addressing::SymbolParam)
        .param("date", date.format(DATE_FORMAT))
        .labelled("institutional-holders")
}

impl<T: Transport> Company<'_, T> {
    /// Aggregate institutional ownership per reporting date, keyed by
    /// `(symbol, cik, date)`.
    pub async fn institutional_ownership(&self, include_current_quarter: bool) -> Result<MergedTable> {
        let resource = Resource::new(ApiVersion::V4, OWNERSHIP_PATH, &["cik", "date"])
            .addressed(Addressing::SymbolParam)
            .param("includeCurrentQuarter", include_current_quarter)
            .batch_limit(1)
            .labelled("institutional-ownership");
        self.fetch(&resource).await
    }

    /// Every institutional holder of each symbol at a quarter end, keyed by
    /// `(symbol, cik, date)`.
    ///
    /// The holder list is paginated; pages are fetched concurrently until
    /// the first empty page. Without a year and quarter the last completed
    /// quarter is used.
    ///
    /// # Errors
    /// Returns [`crate::DataError::InvalidQuarter`] unless `quarter` is 1-4.
    pub async fn institutional_holders(&self, year: Option<i32>, quarter: Option<u8>) -> Result<MergedTable> {
        let (default_year, default_quarter) = last_completed_quarter(Local::now().date_naive());
        let date = quarter_end(
            year.unwrap_or(default_year),
            quarter.unwrap_or(default_quarter),
        )?;
        log::info!("institutional holders at {date}");
        Ok(self
            .session
            .fetcher()?
            .fetch_pages(&holders_resource(date), &self.symbols)
            .await?)
    }
}
