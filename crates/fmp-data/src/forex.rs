//! Currency pairs: catalogue, live quotes and historical rates.

use crate::company::historical_resource;
use crate::error::Result;
use crate::frequency::Frequency;
use crate::reshape::retain_symbols;
use crate::session::Session;
use chrono::NaiveDate;
use fmp_engine::{
    ApiVersion, Catalog, IdentifierSource, KeySpec, MergedTable, PartialResult, Request, Symbol,
    Transport,
};

/// Forex endpoints of a [`Session`].
#[derive(Debug)]
pub struct Forex<'s, T: Transport> {
    session: &'s Session<T>,
}

impl<'s, T: Transport> Forex<'s, T> {
    pub(crate) const fn new(session: &'s Session<T>) -> Self {
        Self { session }
    }

    /// All pairs the provider serves, sorted.
    pub async fn pairs(&self) -> Result<Vec<Symbol>> {
        let mut pairs: Vec<Symbol> = self
            .session
            .available_identifiers(Catalog::Forex)
            .await?
            .into_iter()
            .map(Symbol::new)
            .collect();
        pairs.sort();
        Ok(pairs)
    }

    /// Live quotes of every pair, or only of `filter` when it is not empty.
    ///
    /// The provider answers with all pairs in one response.
    pub async fn live_quotes(&self, filter: &[Symbol]) -> Result<MergedTable> {
        if !filter.is_empty() {
            self.session.resolve(Catalog::Forex, filter).await?;
        }
        let value = self
            .session
            .fetch_raw(&Request::new(ApiVersion::V3, "quotes/forex"))
            .await?;
        let records = retain_symbols(PartialResult::from_value(value)?.into_records(), filter);
        log::info!("forex quotes: {} pair(s)", records.len());
        Ok(MergedTable::from_rows(
            KeySpec::new("symbol", std::iter::empty::<String>()),
            records,
        )?)
    }

    /// Historical rates of comma-separated `pairs`, keyed by `(symbol, date)`.
    ///
    /// # Example
    /// ```no_run
    /// use fmp_data::frequency::Frequency;
    ///
    /// # async fn example(session: fmp_data::Session) -> fmp_data::Result<()> {
    /// let rates = session.forex().historical("EURUSD, GBPUSD", Frequency::Daily, None, None).await?;
    /// println!("{}", rates.frame());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn historical(
        &self,
        pairs: &str,
        frequency: Frequency,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<MergedTable> {
        let pairs = self
            .session
            .resolve(Catalog::Forex, &Symbol::parse_list(pairs))
            .await?;
        let resource = historical_resource(frequency, from, to).labelled("forex");
        Ok(self
            .session
            .fetcher()?
            .fetch_batches(&resource, &pairs)
            .await?)
    }
}
