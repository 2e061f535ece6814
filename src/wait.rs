//! Bounded polling for eventually-true conditions
//!
//! Every wait in the engine goes through [`poll`]: a probe is attempted until
//! it reports ready, the attempt cap is reached, or the wall-clock budget is
//! spent. A single attempt that hangs past the deadline is cut off and
//! surfaces as [`Error::Timeout`].

use std::future::Future;
use std::time::{Duration, Instant};

use crate::common::{Error, Result};

/// Interval and deadline governing a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    /// A policy that attempts exactly once
    pub fn once() -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(30),
            max_attempts: Some(1),
        }
    }

    /// Same interval with a different wall-clock budget
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

/// What a single probe observed
#[derive(Debug)]
pub enum Attempt<T, P> {
    /// Condition satisfied
    Ready(T),
    /// Not yet; carries the latest observation for reporting
    Pending(P),
}

/// Outcome of a bounded wait
#[derive(Debug)]
pub enum Polled<T, P> {
    Ready {
        value: T,
        attempts: u32,
    },
    Exhausted {
        last: P,
        attempts: u32,
        elapsed: Duration,
    },
}

/// Run `probe` until it is ready or the policy is exhausted
///
/// Probe errors abort the wait immediately; callers that want to retry a
/// transient failure turn it into [`Attempt::Pending`] themselves.
pub async fn poll<T, P, F, Fut>(policy: &PollPolicy, what: &str, mut probe: F) -> Result<Polled<T, P>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T, P>>>,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        // The first attempt always runs, even with a zero budget.
        let budget = if attempts == 1 {
            remaining.max(policy.interval).max(Duration::from_millis(1))
        } else {
            remaining
        };

        let attempt = match tokio::time::timeout(budget, probe()).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::timeout(what, start.elapsed())),
        };

        let last = match attempt {
            Attempt::Ready(value) => return Ok(Polled::Ready { value, attempts }),
            Attempt::Pending(last) => last,
        };

        let out_of_attempts = policy.max_attempts.is_some_and(|max| attempts >= max);
        let now = Instant::now();
        if out_of_attempts || now + policy.interval > deadline {
            tracing::debug!(what, attempts, "Poll budget exhausted");
            return Ok(Polled::Exhausted {
                last,
                attempts,
                elapsed: start.elapsed(),
            });
        }

        tokio::time::sleep(policy.interval).await;
    }
}
