//! Retry policy: bounds and backoff delays for conditional-write retries.

use std::time::Duration;

/// Retry policy for lost compare-and-swap races.
///
/// The counter uses a fixed short delay (`multiplier == 1.0`); other callers
/// may opt into exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier applied per additional attempt.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// 10 attempts, 100ms apart.
    pub fn counter_default() -> Self {
        Self::fixed(10, Duration::from_millis(100))
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after `attempts` failed attempts (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1)
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::counter_default()
    }
}
