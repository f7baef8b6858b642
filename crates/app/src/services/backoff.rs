//! Exponential backoff between setup retries.

use std::time::Duration;

use crate::ports::RetryPolicy;

/// Doubles the delay on every attempt until `max_exponent` doublings, then
/// stays there: 5 s, 10 s, 20 s, 40 s, 80 s, 80 s, …
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max_exponent: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 4)
    }
}

impl ExponentialBackoff {
    #[must_use]
    pub const fn new(base: Duration, max_exponent: u32) -> Self {
        Self { base, max_exponent }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(self.max_exponent);
        self.base.saturating_mul(1 << exponent)
    }
}
