//! Partitioning identifier lists into provider-sized batches.

use crate::error::{EngineError, Result};
use crate::identifier::Symbol;

/// An ordered, size-bounded group of identifiers sent in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch in the partition
    pub index: usize,
    /// Symbols in input order
    pub symbols: Vec<Symbol>,
}

impl Batch {
    /// Number of symbols in the batch.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the batch holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Comma-joined symbols.
    pub fn joined(&self) -> String {
        Symbol::join(&self.symbols)
    }
}

/// Lazy iterator over the batches of a symbol slice.
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    inner: std::iter::Enumerate<std::slice::Chunks<'a, Symbol>>,
    count: usize,
}

impl Batches<'_> {
    /// Total number of batches, `ceil(len / size)`.
    pub const fn count_hint(&self) -> usize {
        self.count
    }
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        self.inner.next().map(|(index, symbols)| Batch {
            index,
            symbols: symbols.to_vec(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Batches<'_> {}

/// Split `items` into batches of at most `size` symbols.
///
/// Produces `ceil(items.len() / size)` batches, the last possibly shorter,
/// and none at all for empty input.
///
/// # Errors
/// Returns [`EngineError::InvalidArgument`] when `size` is zero.
///
/// # Example
/// ```
/// use fmp_engine::{Symbol, chunk};
///
/// let symbols = Symbol::parse_list("A,B,C,D,E,F,G");
/// let sizes: Vec<usize> = chunk(&symbols, 5).unwrap().map(|b| b.len()).collect();
/// assert_eq!(sizes, vec![5, 2]);
/// ```
pub fn chunk(items: &[Symbol], size: usize) -> Result<Batches<'_>> {
    if size == 0 {
        return Err(EngineError::InvalidArgument(
            "batch size must be positive".to_string(),
        ));
    }
    Ok(Batches {
        inner: items.chunks(size).enumerate(),
        count: items.len().div_ceil(size),
    })
}
