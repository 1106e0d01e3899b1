//! Macroeconomic indicator series.

use crate::company::DATE_FORMAT;
use crate::endpoint::{Addressing, Resource};
use crate::error::Result;
use crate::session::Session;
use chrono::{Datelike, NaiveDate};
use fmp_engine::{
    ApiVersion, EngineError, Endpoint, KeySpec, MergedTable, PartialResult, Request, Symbol,
    Transport,
};
use serde_json::Value;
use std::str::FromStr;

/// Indicators served by the `economic` endpoint.
pub const INDICATORS: [&str; 23] = [
    "GDP",
    "realGDP",
    "nominalPotentialGDP",
    "realGDPPerCapita",
    "federalFunds",
    "CPI",
    "inflationRate",
    "inflation",
    "retailSales",
    "consumerSentiment",
    "durableGoods",
    "unemploymentRate",
    "totalNonfarmPayroll",
    "initialClaims",
    "industrialProductionTotalIndex",
    "newPrivatelyOwnedHousingUnitsStartedTotalUnits",
    "totalVehicleSales",
    "retailMoneyFunds",
    "smoothedUSRecessionProbabilities",
    "3MonthOr90DayRatesAndYieldsCertificatesOfDeposit",
    "commercialBankInterestRateOnCreditCardPlansAllAccounts",
    "30YearFixedRateMortgageAverage",
    "15YearFixedRateMortgageAverage",
];

/// Map indicator names, in any case, to their canonical spelling.
///
/// # Errors
/// Returns [`EngineError::InvalidIdentifier`] naming every unknown indicator.
pub fn canonical_indicators<S: AsRef<str>>(names: &[S]) -> std::result::Result<Vec<Symbol>, EngineError> {
    let mut unknown = Vec::new();
    let mut resolved = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        match INDICATORS.iter().find(|i| i.eq_ignore_ascii_case(name)) {
            Some(indicator) => resolved.push(Symbol::verbatim(indicator)),
            None => unknown.push(name.to_string()),
        }
    }
    if !unknown.is_empty() {
        return Err(EngineError::InvalidIdentifier(unknown));
    }
    if resolved.is_empty() {
        return Err(EngineError::InvalidArgument(
            "at least one indicator is required".to_string(),
        ));
    }
    Ok(fmp_engine::identifier::dedup(resolved))
}

/// Calendar period an observation date is relabelled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// `2024-03`
    Month,
    /// `2024Q1`
    Quarter,
    /// `2024`
    Year,
}

impl Bucket {
    /// Label of the period containing `date`.
    pub fn label(self, date: NaiveDate) -> String {
        match self {
            Self::Month => date.format("%Y-%m").to_string(),
            Self::Quarter => format!("{}Q{}", date.year(), date.month0() / 3 + 1),
            Self::Year => date.year().to_string(),
        }
    }
}

impl FromStr for Bucket {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "month" | "monthly" => Ok(Self::Month),
            "q" | "quarter" | "quarterly" => Ok(Self::Quarter),
            "y" | "a" | "year" | "annual" => Ok(Self::Year),
            other => Err(EngineError::UnsupportedFrequency(other.to_string())),
        }
    }
}

/// An indicator resource whose `date` column is replaced by period labels.
///
/// Rows that land in the same period collapse onto the first one the
/// provider lists.
struct Bucketed {
    resource: Resource,
    bucket: Bucket,
}

impl Endpoint for Bucketed {
    fn key_spec(&self) -> KeySpec {
        self.resource.key_spec()
    }

    fn request(&self, target: &[Symbol], page: Option<u32>) -> Request {
        self.resource.request(target, page)
    }

    fn max_batch(&self) -> Option<usize> {
        self.resource.max_batch()
    }

    fn reshape(&self, target: &[Symbol], value: Value) -> std::result::Result<PartialResult, EngineError> {
        let mut records = self.resource.reshape(target, value)?.into_records();
        for record in &mut records {
            let Some(raw) = record.get("date").and_then(Value::as_str) else {
                continue;
            };
            let day = raw.get(..10).unwrap_or(raw);
            let date = NaiveDate::parse_from_str(day, DATE_FORMAT)
                .map_err(|e| EngineError::Payload(format!("invalid date {raw}: {e}")))?;
            record.insert("date".to_string(), Value::String(self.bucket.label(date)));
        }
        Ok(if records.is_empty() {
            PartialResult::Empty
        } else {
            PartialResult::Records(records)
        })
    }

    fn require_rows(&self) -> bool {
        self.resource.require_rows()
    }

    fn label(&self) -> String {
        self.resource.label()
    }
}

/// Economic indicator endpoints of a [`Session`].
#[derive(Debug)]
pub struct Economics<'s, T: Transport> {
    session: &'s Session<T>,
}

impl<'s, T: Transport> Economics<'s, T> {
    pub(crate) const fn new(session: &'s Session<T>) -> Self {
        Self { session }
    }

    /// Series of the named indicators, keyed by `(indicator, date)`.
    ///
    /// Each indicator is one request; requests run concurrently. With a
    /// `bucket`, dates become period labels and each indicator keeps one
    /// observation per period.
    pub async fn indicators<S: AsRef<str>>(
        &self,
        names: &[S],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        bucket: Option<Bucket>,
    ) -> Result<MergedTable> {
        let indicators = canonical_indicators(names)?;
        let resource = Resource::new(ApiVersion::V4, "economic", &["date"])
            .addressed(Addressing::NameParam)
            .identified_by("indicator")
            .batch_limit(1)
            .param_opt("from", from.map(|d| d.format(DATE_FORMAT)))
            .param_opt("to", to.map(|d| d.format(DATE_FORMAT)));
        let fetcher = self.session.fetcher()?;
        let table = match bucket {
            Some(bucket) => {
                fetcher
                    .fetch_batches(&Bucketed { resource, bucket }, &indicators)
                    .await?
            }
            None => fetcher.fetch_batches(&resource, &indicators).await?,
        };
        Ok(table)
    }

    /// Series of every known indicator.
    pub async fn all(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        bucket: Option<Bucket>,
    ) -> Result<MergedTable> {
        self.indicators(INDICATORS.as_slice(), from, to, bucket).await
    }
}
