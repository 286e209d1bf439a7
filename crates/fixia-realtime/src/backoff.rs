//! Reconnect backoff policy
//!
//! Delay for the Nth retry (N starting at 1) is
//! `min(base * factor^(N-1), max)`. Deliberately deterministic: the retry
//! cap is small enough that jitter buys nothing, and the fixed table keeps
//! the timing testable.

use fixia_common::RealtimeConfig;
use std::time::Duration;

/// Capped exponential backoff
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(base: Duration, factor: f64, max: Duration) -> Self {
        Self { base, factor, max }
    }

    #[must_use]
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            base: Duration::from_millis(config.backoff_base_ms),
            factor: config.backoff_factor,
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay before the given retry attempt (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let scaled = self.base.as_millis() as f64 * self.factor.powi(exponent as i32);
        let capped = scaled.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            factor: 2.0,
            max: Duration::from_millis(10_000),
        }
    }
}
