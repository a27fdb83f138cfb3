// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry delay and error-streak bookkeeping for the scan loop.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub baseline: Duration,
    pub ceiling: Duration,
    pub multiplier: f64,
    /// Upper bound of the uniform jitter fraction added to each retry.
    pub max_jitter: f64,
    /// Consecutive errors after which a cycle is skipped.
    pub error_ceiling: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            baseline: Duration::from_secs(60),
            ceiling: Duration::from_secs(30 * 60),
            multiplier: 1.5,
            max_jitter: 0.2,
            error_ceiling: 5,
        }
    }
}

/// Mutable backoff state owned by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    pub retry_delay: Duration,
    pub consecutive_errors: u32,
}

impl ScanState {
    pub fn new(policy: &BackoffPolicy) -> Self {
        Self { retry_delay: policy.baseline, consecutive_errors: 0 }
    }

    pub fn record_success(&mut self, policy: &BackoffPolicy) {
        self.retry_delay = policy.baseline;
        self.consecutive_errors = 0;
    }

    pub fn record_error(&mut self) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
    }

    pub fn tripped(&self, policy: &BackoffPolicy) -> bool {
        self.consecutive_errors >= policy.error_ceiling
    }

    /// Park at the ceiling delay after a skipped cycle.
    ///
    /// The streak drops to one below the ceiling: the next cycle runs, and a
    /// single further failure trips the skip again.
    pub fn park(&mut self, policy: &BackoffPolicy) {
        self.retry_delay = policy.ceiling;
        self.consecutive_errors = policy.error_ceiling.saturating_sub(1);
    }

    /// Delay before the next retry, then grow the base delay.
    ///
    /// The jittered delay is never shorter than `floor` (a server `retry-after`).
    pub fn next_retry<R: Rng + ?Sized>(
        &mut self,
        policy: &BackoffPolicy,
        floor: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        let delay = with_jitter(self.retry_delay, policy.max_jitter, rng).max(floor.unwrap_or_default());
        self.retry_delay = self.retry_delay.mul_f64(policy.multiplier).min(policy.ceiling);
        delay
    }
}

/// `base * (1 + U[0, max_jitter])`.
pub fn with_jitter<R: Rng + ?Sized>(base: Duration, max_jitter: f64, rng: &mut R) -> Duration {
    if max_jitter <= 0.0 {
        return base;
    }
    base.mul_f64(1.0 + rng.random_range(0.0..=max_jitter))
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
