//! Windowed pagination with "lowest empty page wins" termination.
//!
//! A [`Paginator`] drives one target (one identifier and query) through its
//! pages. Each round fetches a window of `W` consecutive pages concurrently,
//! then scans the results in ascending page order:
//!
//! - the first failure ends the run; higher pages of the round are discarded,
//! - the first empty page ends the run normally; higher pages of the round
//!   are discarded even when they carry data,
//! - otherwise every page of the round is kept and the next window starts
//!   right after it.
//!
//! The result is therefore always a contiguous prefix `0..k` of the stream,
//! no matter in which order the window completed.

use crate::dispatch::{DispatchConfig, dispatch};
use crate::error::{EngineError, Result};
use crate::partial::PartialResult;
use std::future::Future;
use std::ops::Range;

/// Paginator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Next window starts at `page`
    Fetching {
        /// First page of the next window
        page: u32,
    },
    /// End of stream reached (empty page or page cap)
    Done,
    /// A page failed; the target is incomplete
    Failed,
}

/// Why a pagination run stopped.
#[derive(Debug)]
pub enum Termination {
    /// The provider returned an empty page
    Exhausted {
        /// Lowest empty page observed
        empty_page: u32,
    },
    /// The page cap was reached before an empty page was seen
    PageLimit {
        /// Number of pages fetched
        pages: u32,
    },
    /// Fetching a page failed
    Failed {
        /// Lowest failed page
        page: u32,
        /// Failure of that page
        error: EngineError,
    },
}

impl Termination {
    /// Whether the run stopped on a failure.
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Outcome of a complete pagination run.
#[derive(Debug)]
pub struct PageRun {
    /// Accepted pages in ascending page order
    pub pages: Vec<(u32, PartialResult)>,
    /// Why the run stopped
    pub termination: Termination,
    /// Pages fetched past the termination point and thrown away
    pub discarded: Vec<u32>,
}

impl PageRun {
    /// Total records across accepted pages.
    pub fn record_count(&self) -> usize {
        self.pages.iter().map(|(_, p)| p.len()).sum()
    }
}

/// State machine for paginating one target.
#[derive(Debug)]
pub struct Paginator {
    state: PageState,
    window: u32,
    max_pages: Option<u32>,
    pages: Vec<(u32, PartialResult)>,
    discarded: Vec<u32>,
    termination: Option<Termination>,
}

impl Paginator {
    /// Create a paginator fetching `window` pages per round.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidArgument`] when `window` or `max_pages`
    /// is zero.
    pub fn new(window: u32, max_pages: Option<u32>) -> Result<Self> {
        if window == 0 {
            return Err(EngineError::InvalidArgument(
                "page window must be positive".to_string(),
            ));
        }
        if max_pages == Some(0) {
            return Err(EngineError::InvalidArgument(
                "page cap must be positive".to_string(),
            ));
        }
        Ok(Self {
            state: PageState::Fetching { page: 0 },
            window,
            max_pages,
            pages: Vec::new(),
            discarded: Vec::new(),
            termination: None,
        })
    }

    /// Current state.
    pub const fn state(&self) -> PageState {
        self.state
    }

    /// Whether the paginator reached a terminal state.
    pub const fn is_finished(&self) -> bool {
        !matches!(self.state, PageState::Fetching { .. })
    }

    /// Pages to fetch in the next round, or `None` once terminal.
    ///
    /// Reaching the page cap moves the paginator to [`PageState::Done`].
    pub fn next_window(&mut self) -> Option<Range<u32>> {
        let PageState::Fetching { page } = self.state else {
            return None;
        };
        let mut end = page.saturating_add(self.window);
        if let Some(cap) = self.max_pages {
            if page >= cap {
                log::warn!("pagination stopped at page cap {cap} without an empty page");
                self.state = PageState::Done;
                self.termination = Some(Termination::PageLimit { pages: page });
                return None;
            }
            end = end.min(cap);
        }
        Some(page..end)
    }

    /// Absorb the results of the window returned by [`Self::next_window`].
    ///
    /// Results may arrive in any order; they are scanned by ascending page.
    pub fn absorb(&mut self, mut results: Vec<(u32, Result<PartialResult>)>) {
        let PageState::Fetching { page: start } = self.state else {
            return;
        };
        results.sort_by_key(|(page, _)| *page);

        let mut next = start;
        let mut results = results.into_iter();
        for (page, result) in results.by_ref() {
            match result {
                Err(error) => {
                    self.state = PageState::Failed;
                    self.termination = Some(Termination::Failed { page, error });
                    break;
                }
                Ok(partial) if partial.is_empty() => {
                    self.state = PageState::Done;
                    self.termination = Some(Termination::Exhausted { empty_page: page });
                    break;
                }
                Ok(partial) => {
                    self.pages.push((page, partial));
                    next = page + 1;
                }
            }
        }

        let phantom: Vec<u32> = results.map(|(page, _)| page).collect();
        if !phantom.is_empty() {
            log::debug!("discarding page(s) {phantom:?} past the end of the stream");
            self.discarded.extend(phantom);
        }

        if !self.is_finished() {
            self.state = PageState::Fetching { page: next };
        }
    }

    /// Consume the paginator into its run summary.
    ///
    /// A paginator that never reached a terminal state reports the page
    /// limit it stopped at.
    pub fn finish(self) -> PageRun {
        let termination = self.termination.unwrap_or(match self.state {
            PageState::Fetching { page } => Termination::PageLimit { pages: page },
            _ => Termination::PageLimit {
                pages: self.pages.len() as u32,
            },
        });
        PageRun {
            pages: self.pages,
            termination,
            discarded: self.discarded,
        }
    }
}

/// Paginate one target to completion.
///
/// `fetch_page` is called once per page; each window is run through the
/// dispatcher with `config` so the window shares the caller's deadline.
pub async fn paginate<F, Fut>(
    fetch_page: F,
    window: u32,
    max_pages: Option<u32>,
    config: &DispatchConfig,
) -> Result<PageRun>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<PartialResult>>,
{
    let mut paginator = Paginator::new(window, max_pages)?;
    let round_config = DispatchConfig {
        max_concurrency: config.max_concurrency.min(window as usize).max(1),
        ..*config
    };

    while let Some(pages) = paginator.next_window() {
        let tasks: Vec<(u32, Fut)> = pages.map(|page| (page, fetch_page(page))).collect();
        let results = dispatch(tasks, &round_config)
            .await
            .into_iter()
            .map(|outcome| (outcome.tag, outcome.result))
            .collect();
        paginator.absorb(results);
    }

    Ok(paginator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::partial::Record;
    use rstest::rstest;
    use serde_json::json;

    fn page_of(page: u32, rows: usize) -> PartialResult {
        (0..rows)
            .map(|i| {
                let mut record = Record::new();
                record.insert("page".into(), json!(page));
                record.insert("row".into(), json!(i));
                record
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(Paginator::new(0, None).is_err());
        assert!(Paginator::new(4, Some(0)).is_err());
    }

    #[test]
    fn test_lowest_empty_page_wins() {
        let mut paginator = Paginator::new(4, None).unwrap();
        assert_eq!(paginator.next_window(), Some(0..4));

        paginator.absorb(vec![
            (3, Ok(page_of(3, 2))),
            (0, Ok(page_of(0, 2))),
            (2, Ok(PartialResult::Empty)),
            (1, Ok(page_of(1, 2))),
        ]);

        assert_eq!(paginator.state(), PageState::Done);
        assert_eq!(paginator.next_window(), None);
        let run = paginator.finish();
        let pages: Vec<u32> = run.pages.iter().map(|(p, _)| *p).collect();
        assert_eq!(pages, vec![0, 1]);
        assert_eq!(run.discarded, vec![3]);
        assert!(matches!(
            run.termination,
            Termination::Exhausted { empty_page: 2 }
        ));
    }

    #[test]
    fn test_failure_below_empty_page() {
        let mut paginator = Paginator::new(3, None).unwrap();
        paginator.next_window();
        paginator.absorb(vec![
            (0, Ok(page_of(0, 1))),
            (
                1,
                Err(EngineError::Transport(TransportError::Status {
                    url: "page/1".into(),
                    status: 502,
                })),
            ),
            (2, Ok(PartialResult::Empty)),
        ]);

        assert_eq!(paginator.state(), PageState::Failed);
        let run = paginator.finish();
        assert_eq!(run.pages.len(), 1);
        assert_eq!(run.discarded, vec![2]);
        assert!(matches!(run.termination, Termination::Failed { page: 1, .. }));
    }

    #[test]
    fn test_page_cap() {
        let mut paginator = Paginator::new(4, Some(6)).unwrap();
        assert_eq!(paginator.next_window(), Some(0..4));
        paginator.absorb((0..4).map(|p| (p, Ok(page_of(p, 1)))).collect());
        assert_eq!(paginator.next_window(), Some(4..6));
        paginator.absorb((4..6).map(|p| (p, Ok(page_of(p, 1)))).collect());
        assert_eq!(paginator.next_window(), None);

        let run = paginator.finish();
        assert_eq!(run.pages.len(), 6);
        assert!(matches!(run.termination, Termination::PageLimit { pages: 6 }));
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(8)]
    #[tokio::test]
    async fn test_paginate_any_window(#[case] window: u32) {
        let run = paginate(
            |page| async move {
                if page < 5 {
                    Ok(page_of(page, 3))
                } else {
                    Ok(PartialResult::Empty)
                }
            },
            window,
            None,
            &DispatchConfig::new(8),
        )
        .await
        .unwrap();

        let pages: Vec<u32> = run.pages.iter().map(|(p, _)| *p).collect();
        assert_eq!(pages, vec![0, 1, 2, 3, 4]);
        assert_eq!(run.record_count(), 15);
        assert!(matches!(
            run.termination,
            Termination::Exhausted { empty_page: 5 }
        ));
    }
}
