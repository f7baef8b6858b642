//! Retry policy port — how long to wait before the next setup attempt.

use std::time::Duration;

pub trait RetryPolicy: Send + Sync {
    /// Delay before retry number `attempt` (1-based).
    fn delay(&self, attempt: u32) -> Duration;
}
