//! Fetch orchestration: chunk, dispatch, paginate and merge.

use crate::chunk::{Batch, chunk};
use crate::dispatch::{DispatchConfig, dispatch};
use crate::error::{EngineError, Result};
use crate::identifier::{Symbol, dedup};
use crate::merge::{MergeOptions, Payload, SourceKey, merge};
use crate::paginate::{Termination, paginate};
use crate::partial::PartialResult;
use crate::table::{KeySpec, MergedTable};
use crate::transport::{Request, Transport};
use serde_json::Value;
use std::time::Duration;

/// Description of one provider endpoint.
///
/// An endpoint knows how to build the request for a target (a batch of
/// identifiers, or a single identifier and page) and how to turn the
/// response into records.
pub trait Endpoint: Send + Sync {
    /// Composite key of the rows this endpoint returns.
    fn key_spec(&self) -> KeySpec;

    /// Build the request for `target`; `page` is set for paginated fetches.
    fn request(&self, target: &[Symbol], page: Option<u32>) -> Request;

    /// Maximum identifiers per request, when the provider limits it.
    fn max_batch(&self) -> Option<usize> {
        None
    }

    /// Convert a response body into records.
    fn reshape(&self, _target: &[Symbol], value: Value) -> Result<PartialResult> {
        PartialResult::from_value(value)
    }

    /// Whether a fetch producing no rows at all is an error.
    fn require_rows(&self) -> bool {
        true
    }

    /// Short name used in logs and error messages.
    fn label(&self) -> String {
        let name = std::any::type_name::<Self>();
        name.rsplit("::").next().unwrap_or(name).to_string()
    }
}

/// Tuning knobs for a [`BatchFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Identifiers per batch request
    pub batch_size: usize,
    /// Maximum requests in flight
    pub max_concurrency: usize,
    /// Pages fetched per pagination round
    pub page_window: u32,
    /// Budget for a whole fetch call
    pub timeout: Option<Duration>,
    /// Upper bound on pages per target
    pub max_pages: Option<u32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_concurrency: 8,
            page_window: 8,
            timeout: None,
            max_pages: None,
        }
    }
}

impl EngineSettings {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EngineError::InvalidArgument(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(EngineError::InvalidArgument(
                "max_concurrency must be positive".to_string(),
            ));
        }
        if self.page_window == 0 {
            return Err(EngineError::InvalidArgument(
                "page_window must be positive".to_string(),
            ));
        }
        if self.max_pages == Some(0) {
            return Err(EngineError::InvalidArgument(
                "max_pages must be positive".to_string(),
            ));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(EngineError::InvalidArgument(
                "timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Page window and number of concurrently paginated targets.
    ///
    /// The product never exceeds `max_concurrency`.
    pub fn page_split(&self) -> (u32, usize) {
        let window = (self.page_window as usize).min(self.max_concurrency).max(1);
        let targets = (self.max_concurrency / window).max(1);
        (u32::try_from(window).unwrap_or(u32::MAX), targets)
    }
}

/// Runs endpoint fetches over a [`Transport`].
#[derive(Debug)]
pub struct BatchFetcher<'t, T: ?Sized> {
    transport: &'t T,
    settings: EngineSettings,
}

impl<'t, T: Transport + ?Sized> BatchFetcher<'t, T> {
    /// Create a fetcher.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidArgument`] when `settings` are invalid.
    pub fn new(transport: &'t T, settings: EngineSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            transport,
            settings,
        })
    }

    /// Settings in use.
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn deadline_config(&self, max_concurrency: usize) -> DispatchConfig {
        let config = DispatchConfig::new(max_concurrency);
        match self.settings.timeout {
            Some(budget) => config.with_timeout(budget),
            None => config,
        }
    }

    async fn fetch_one<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        target: &[Symbol],
        page: Option<u32>,
    ) -> Result<PartialResult> {
        let request = endpoint.request(target, page);
        log::debug!("GET {request}");
        let value = self.transport.fetch(&request).await?;
        endpoint.reshape(target, value)
    }

    /// Fetch `symbols` in batches and merge the responses.
    ///
    /// Batches hold at most `min(batch_size, endpoint.max_batch())`
    /// identifiers. Failed batches are reported through
    /// [`MergedTable::failed_identifiers`] rather than failing the call.
    ///
    /// # Errors
    /// - [`EngineError::InvalidArgument`] for an empty symbol list
    /// - [`EngineError::AllSourcesFailed`] when no batch succeeded
    /// - [`EngineError::EmptyResult`] when no rows came back and the endpoint
    ///   requires rows
    pub async fn fetch_batches<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        symbols: &[Symbol],
    ) -> Result<MergedTable> {
        let symbols = require_symbols(symbols)?;
        let size = endpoint
            .max_batch()
            .map_or(self.settings.batch_size, |max| max.min(self.settings.batch_size))
            .max(1);
        let batches = chunk(&symbols, size)?;
        let label = endpoint.label();
        log::info!(
            "{label}: fetching {} identifier(s) in {} batch(es)",
            symbols.len(),
            batches.count_hint()
        );

        let tasks: Vec<(Batch, _)> = batches
            .map(|batch| {
                let target = batch.symbols.clone();
                (batch, async move { self.fetch_one(endpoint, &target, None).await })
            })
            .collect();

        let outcomes = dispatch(tasks, &self.deadline_config(self.settings.max_concurrency)).await;
        let partials = outcomes
            .into_iter()
            .map(|outcome| {
                let source = SourceKey::batch(outcome.tag.index, outcome.tag.symbols);
                let payload = match outcome.result {
                    Ok(partial) => Payload::Data(partial),
                    Err(error) => Payload::Failed(error),
                };
                (source, payload)
            })
            .collect();

        merge(
            partials,
            &symbols,
            &endpoint.key_spec(),
            &MergeOptions {
                require_rows: endpoint.require_rows(),
                label,
            },
        )
    }

    /// Fetch every page of `endpoint` for each symbol and merge the results.
    ///
    /// Each symbol is paginated independently. Targets run concurrently and
    /// each one fetches a window of pages at a time, with the total number
    /// of requests in flight bounded by `max_concurrency`. A target whose
    /// page fails keeps the pages below the failure and is reported in
    /// [`MergedTable::failed_identifiers`].
    pub async fn fetch_pages<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        symbols: &[Symbol],
    ) -> Result<MergedTable> {
        let symbols = require_symbols(symbols)?;
        let (window, targets) = self.settings.page_split();
        let label = endpoint.label();
        log::info!(
            "{label}: paginating {} identifier(s), window {window}, {targets} target(s) at a time",
            symbols.len()
        );

        // Only the page rounds carry the deadline so a timed-out page is
        // reported on its own target with the pages below it kept.
        let rounds = self.deadline_config(window as usize);
        let max_pages = self.settings.max_pages;

        let tasks: Vec<((usize, Symbol), _)> = symbols
            .iter()
            .enumerate()
            .map(|(position, symbol)| {
                let target = vec![symbol.clone()];
                let rounds = &rounds;
                (
                    (position, symbol.clone()),
                    async move {
                        let target = target.as_slice();
                        paginate(
                            move |page| self.fetch_one(endpoint, target, Some(page)),
                            window,
                            max_pages,
                            rounds,
                        )
                        .await
                    },
                )
            })
            .collect();

        let outcomes = dispatch(tasks, &DispatchConfig::new(targets)).await;

        let mut partials = Vec::new();
        for outcome in outcomes {
            let (position, symbol) = outcome.tag;
            let run = match outcome.result {
                Ok(run) => run,
                Err(error) => {
                    partials.push((SourceKey::batch(position, vec![symbol]), Payload::Failed(error)));
                    continue;
                }
            };

            for (page, partial) in run.pages {
                partials.push((SourceKey::page(position, symbol.clone(), page), Payload::Data(partial)));
            }
            for page in run.discarded {
                partials.push((SourceKey::page(position, symbol.clone(), page), Payload::PastTruncation));
            }
            match run.termination {
                Termination::Exhausted { empty_page } => partials.push((
                    SourceKey::page(position, symbol, empty_page),
                    Payload::Data(PartialResult::Empty),
                )),
                Termination::Failed { page, error } => {
                    log::warn!("{label}: {symbol} failed at page {page}: {error}");
                    partials.push((SourceKey::page(position, symbol, page), Payload::Failed(error)));
                }
                Termination::PageLimit { pages } => partials.push((
                    SourceKey::page(position, symbol, pages),
                    Payload::Truncated,
                )),
            }
        }

        merge(
            partials,
            &symbols,
            &endpoint.key_spec(),
            &MergeOptions {
                require_rows: endpoint.require_rows(),
                label,
            },
        )
    }
}

fn require_symbols(symbols: &[Symbol]) -> Result<Vec<Symbol>> {
    if symbols.is_empty() {
        return Err(EngineError::InvalidArgument(
            "at least one identifier is required".to_string(),
        ));
    }
    Ok(dedup(symbols.iter().cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(8, 8, (8, 1))]
    #[case(16, 4, (4, 4))]
    #[case(3, 8, (3, 1))]
    #[case(10, 3, (3, 3))]
    fn test_page_split(#[case] concurrency: usize, #[case] window: u32, #[case] expected: (u32, usize)) {
        let settings = EngineSettings {
            max_concurrency: concurrency,
            page_window: window,
            ..Default::default()
        };
        let (w, t) = settings.page_split();
        assert_eq!((w, t), expected);
        assert!(w as usize * t <= concurrency);
    }

    #[test]
    fn test_invalid_settings() {
        let bad = EngineSettings {
            batch_size: 0,
            ..Default::default()
        };
        assert!(bad.validate().unwrap_err().is_validation());

        let bad = EngineSettings {
            timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(EngineSettings::default().validate().is_ok());
    }
}
