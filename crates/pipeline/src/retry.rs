//! Exponential backoff schedule for block fetches.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The default number of attempts made for a block, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// The default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Bounded retry policy with exponentially doubling backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry. Every later retry waits twice as long as the previous one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_delay: DEFAULT_BASE_DELAY }
    }
}

impl RetryPolicy {
    /// Creates a new [RetryPolicy].
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// Returns the delays to wait between consecutive attempts.
    ///
    /// There is one delay fewer than attempts: the `i`th delay is `base_delay * 2^i`, saturating
    /// at [Duration::MAX].
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        core::iter::successors(Some(self.base_delay), |delay| Some(delay.saturating_mul(2)))
            .take(self.max_attempts.saturating_sub(1) as usize)
    }

    /// Starts tracking the attempts of one operation. Waits are cut short by `cancel`.
    pub const fn backoff(&self, cancel: CancellationToken) -> Backoff {
        Backoff { policy: *self, attempt: 1, cancel }
    }
}

/// What a [Backoff] decided after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// The backoff delay elapsed. Make the next attempt.
    Retry,
    /// The policy allows no further attempt.
    Exhausted,
    /// The token was cancelled before the delay elapsed.
    Cancelled,
}

/// The retry state of a single operation under a [RetryPolicy].
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
    cancel: CancellationToken,
}

impl Backoff {
    /// Returns the number of the current attempt, starting at 1.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Called after the current attempt failed. Sleeps for the next delay of the schedule and
    /// moves on to the next attempt.
    pub async fn wait(&mut self) -> RetryStep {
        let Some(delay) = self.policy.delays().nth(self.attempt as usize - 1) else {
            return RetryStep::Exhausted;
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return RetryStep::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
        self.attempt += 1;
        RetryStep::Retry
    }
}
