//! Bounded polling.
//!
//! A probe is invoked until its result satisfies a predicate or the attempt
//! budget runs out. Probe errors are logged and count as a spent attempt
//! without a wait; they never end the loop early.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

/// Wait between two consecutive attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalPolicy {
    Fixed(Duration),
    /// Indexed by attempt number; attempts past the end reuse the last entry.
    Schedule(Vec<Duration>),
}

impl IntervalPolicy {
    /// Delay after the zero-based `attempt`. An empty schedule never waits.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            IntervalPolicy::Fixed(d) => *d,
            IntervalPolicy::Schedule(steps) => {
                let idx = (attempt as usize).min(steps.len().saturating_sub(1));
                steps.get(idx).copied().unwrap_or(Duration::ZERO)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The predicate held for this result.
    Ready(T),
    /// The budget ran out; `last` is the final successful probe result, if any.
    Exhausted { last: Option<T> },
}

/// Poll `probe` up to `max_attempts` times.
///
/// Sleeps `interval.delay_for(attempt)` after a result that does not satisfy
/// `is_done`. A probe error moves straight to the next attempt. No sleep
/// follows the last attempt.
pub async fn poll<T, F, Fut, P>(
    mut probe: F,
    interval: &IntervalPolicy,
    max_attempts: u32,
    is_done: P,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let mut last = None;

    for attempt in 0..max_attempts {
        match probe().await {
            Ok(value) if is_done(&value) => {
                debug!(attempt, "poll satisfied");
                return PollOutcome::Ready(value);
            }
            Ok(value) => last = Some(value),
            Err(e) => {
                warn!(attempt, "Error during polling: {:#}", e);
                continue;
            }
        }

        if attempt + 1 < max_attempts {
            tokio::time::sleep(interval.delay_for(attempt)).await;
        }
    }

    warn!(max_attempts, "polling reached maximum attempts without success");
    PollOutcome::Exhausted { last }
}
