//! Merging partial results into one key-indexed table.

use crate::error::{EngineError, Result};
use crate::identifier::Symbol;
use crate::partial::{PartialResult, Record};
use crate::table::{CompositeKey, KeySpec, MergeReport, MergedTable, SourceFailure};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Where a partial result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    /// Batch index or target position; lower sorts first
    pub order: usize,
    /// Identifiers the source was fetched for
    pub identifiers: Vec<Symbol>,
    /// Page number, for paginated sources
    pub page: Option<u32>,
}

impl SourceKey {
    /// Source covering one batch.
    pub const fn batch(order: usize, identifiers: Vec<Symbol>) -> Self {
        Self {
            order,
            identifiers,
            page: None,
        }
    }

    /// Source covering one page of one target.
    pub fn page(order: usize, identifier: Symbol, page: u32) -> Self {
        Self {
            order,
            identifiers: vec![identifier],
            page: Some(page),
        }
    }
}

/// Content of one source.
#[derive(Debug)]
pub enum Payload {
    /// Data returned by the source
    Data(PartialResult),
    /// The source failed
    Failed(EngineError),
    /// Page fetched beyond the end of the stream; ignored
    PastTruncation,
    /// Marker: the stream stopped at the page cap before it ended
    Truncated,
}

/// Merge behaviour switches.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Fail with [`EngineError::EmptyResult`] when no rows remain
    pub require_rows: bool,
    /// What was fetched, used in error messages
    pub label: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            require_rows: true,
            label: "request".to_string(),
        }
    }
}

/// Merge `partials` into a [`MergedTable`].
///
/// Failed and past-truncation sources are set aside (failures are recorded
/// in the report). [`Payload::Truncated`] markers are not sources; they list
/// their identifiers in [`MergeReport::truncated_identifiers`]. Records lacking the identifier column are tagged with
/// their source's identifier when the source covers exactly one identifier;
/// records still missing a key field are dropped. The remaining rows are
/// ordered by identifier position in `requested`, then source order, then
/// page, then provider order, and de-duplicated on `key` keeping the first
/// occurrence.
///
/// # Errors
/// - [`EngineError::AllSourcesFailed`] when every considered source failed
/// - [`EngineError::EmptyResult`] when no rows remain and rows are required
pub fn merge(
    partials: Vec<(SourceKey, Payload)>,
    requested: &[Symbol],
    key: &KeySpec,
    options: &MergeOptions,
) -> Result<MergedTable> {
    let mut report = MergeReport::default();
    let mut failed: HashSet<Symbol> = HashSet::new();
    let mut truncated: HashSet<Symbol> = HashSet::new();
    let mut collected: Vec<(SourceKey, Vec<Record>)> = Vec::new();

    for (source, payload) in partials {
        if matches!(payload, Payload::Truncated) {
            truncated.extend(source.identifiers);
            continue;
        }
        report.sources += 1;
        match payload {
            Payload::Data(partial) => {
                report.succeeded += 1;
                collected.push((source, partial.into_records()));
            }
            Payload::Failed(error) => {
                log::debug!(
                    "source {} (page {:?}) failed: {error}",
                    Symbol::join(&source.identifiers),
                    source.page
                );
                failed.extend(source.identifiers.iter().cloned());
                report.failures.push(SourceFailure {
                    identifiers: source.identifiers,
                    page: source.page,
                    message: error.to_string(),
                });
            }
            Payload::PastTruncation => report.past_truncation += 1,
            Payload::Truncated => {}
        }
    }

    let considered = report.sources - report.past_truncation;
    report.failed_identifiers = ordered_identifiers(requested, &failed);
    report.truncated_identifiers = ordered_identifiers(requested, &truncated);

    if considered > 0 && report.succeeded == 0 {
        return Err(EngineError::AllSourcesFailed(report.summary()));
    }

    let rank: HashMap<&str, usize> = requested
        .iter()
        .enumerate()
        .rev()
        .map(|(i, s)| (s.as_str(), i))
        .collect();
    let id_field = key.identifier();

    let mut tagged: Vec<(usize, usize, u32, usize, Record)> = Vec::new();
    for (source, records) in collected {
        let single = match source.identifiers.as_slice() {
            [only] => Some(only),
            _ => None,
        };
        for (position, mut record) in records.into_iter().enumerate() {
            let has_identifier = record.get(id_field).is_some_and(|v| !v.is_null());
            if let (false, Some(identifier)) = (has_identifier, single) {
                record.insert(id_field.to_string(), Value::String(identifier.to_string()));
            }
            let identifier_rank = record
                .get(id_field)
                .and_then(Value::as_str)
                .and_then(|id| rank.get(id).copied())
                .unwrap_or(requested.len());
            tagged.push((
                identifier_rank,
                source.order,
                source.page.unwrap_or(0),
                position,
                record,
            ));
        }
    }
    tagged.sort_by_key(|(rank, order, page, position, _)| (*rank, *order, *page, *position));

    let mut seen: HashSet<CompositeKey> = HashSet::new();
    let mut rows: Vec<(CompositeKey, Record)> = Vec::with_capacity(tagged.len());
    let mut with_rows: HashSet<String> = HashSet::new();
    for (_, _, _, _, record) in tagged {
        let Some(composite) = key.extract(&record) else {
            report.missing_key += 1;
            continue;
        };
        if seen.insert(composite.clone()) {
            if let Some(id) = composite.0.first() {
                with_rows.insert(id.clone());
            }
            rows.push((composite, record));
        } else {
            report.duplicates += 1;
        }
    }

    if report.missing_key > 0 {
        log::debug!("dropped {} row(s) missing key fields", report.missing_key);
    }
    if report.is_partial() {
        log::warn!("{}: {}", options.label, report.summary());
    }

    if rows.is_empty() && options.require_rows {
        return Err(EngineError::EmptyResult(options.label.clone()));
    }

    let empty_identifiers: Vec<Symbol> = requested
        .iter()
        .filter(|s| !failed.contains(*s) && !with_rows.contains(s.as_str()))
        .cloned()
        .collect();

    log::info!(
        "{}: merged {} row(s) from {} source(s)",
        options.label,
        rows.len(),
        report.succeeded
    );

    MergedTable::build(key.clone(), rows, report, empty_identifiers)
}

fn ordered_identifiers(requested: &[Symbol], failed: &HashSet<Symbol>) -> Vec<Symbol> {
    let mut ordered: Vec<Symbol> = requested
        .iter()
        .filter(|s| failed.contains(*s))
        .cloned()
        .collect();
    let mut extra: Vec<Symbol> = failed
        .iter()
        .filter(|s| !requested.contains(s))
        .cloned()
        .collect();
    extra.sort();
    ordered.extend(extra);
    ordered
}
