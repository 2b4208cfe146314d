//! Retry delay policies.

use std::time::Duration;

/// Decides how long to wait before retry number `attempt` (zero-based).
pub trait BackoffPolicy: Send + Sync {
    /// Delay before the given attempt.
    fn delay(&self, attempt: u32) -> Duration;
}

/// `min(max, base * 2^attempt)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max)
    }
}
