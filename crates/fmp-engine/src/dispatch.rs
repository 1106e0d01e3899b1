//! Bounded, collect-all dispatch of tagged fetch tasks.

use crate::error::{EngineError, Result};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

/// Tagged result of one dispatched unit of work.
#[derive(Debug)]
pub struct Outcome<K, T> {
    /// Tag identifying the originating batch or page
    pub tag: K,
    /// Success value or the captured failure
    pub result: Result<T>,
}

impl<K, T> Outcome<K, T> {
    /// Whether the task succeeded.
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Concurrency bound and optional deadline for one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Maximum number of tasks in flight at once
    pub max_concurrency: usize,
    /// Instant after which pending tasks are abandoned
    pub deadline: Option<Instant>,
    /// Budget the deadline was derived from, reported in timeout errors
    pub budget: Option<Duration>,
}

impl DispatchConfig {
    /// Config with no deadline.
    pub const fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            deadline: None,
            budget: None,
        }
    }

    /// Abandon pending tasks once `budget` has elapsed from now.
    pub fn with_timeout(self, budget: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + budget),
            budget: Some(budget),
            ..self
        }
    }

    /// Reuse an existing deadline so that several rounds share one budget.
    pub const fn with_deadline(self, deadline: Option<Instant>, budget: Option<Duration>) -> Self {
        Self {
            deadline,
            budget,
            ..self
        }
    }
}

/// Run `tasks` with at most `config.max_concurrency` in flight.
///
/// Every task is polled at most once to completion. Outcomes come back in
/// completion order, each carrying the tag it was submitted with, and one
/// task's failure never cancels its siblings. When the deadline passes, the
/// tasks still pending are dropped and reported as [`EngineError::TimedOut`].
pub async fn dispatch<K, T, Fut>(tasks: Vec<(K, Fut)>, config: &DispatchConfig) -> Vec<Outcome<K, T>>
where
    Fut: Future<Output = Result<T>>,
{
    let total = tasks.len();
    let limit = config.max_concurrency.max(1);
    let (tags, futures): (Vec<K>, Vec<Fut>) = tasks.into_iter().unzip();
    let mut tags: Vec<Option<K>> = tags.into_iter().map(Some).collect();

    let mut pending = stream::iter(futures.into_iter().enumerate())
        .map(|(slot, fut)| async move { (slot, fut.await) })
        .buffer_unordered(limit);

    let mut outcomes = Vec::with_capacity(total);
    let mut timed_out = false;

    loop {
        let next = match config.deadline {
            Some(deadline) => match timeout_at(deadline, pending.next()).await {
                Ok(next) => next,
                Err(_) => {
                    timed_out = true;
                    None
                }
            },
            None => pending.next().await,
        };

        let Some((slot, result)) = next else {
            break;
        };
        if let Some(tag) = tags[slot].take() {
            outcomes.push(Outcome { tag, result });
        }
    }

    if timed_out {
        let budget = config.budget.unwrap_or_default();
        let abandoned = tags.iter().filter(|t| t.is_some()).count();
        log::warn!("dispatch deadline reached, abandoning {abandoned} of {total} task(s)");
        outcomes.extend(tags.into_iter().flatten().map(|tag| Outcome {
            tag,
            result: Err(EngineError::TimedOut(budget)),
        }));
    }

    outcomes
}
