//! Retry backoff for failed dispatches
//!
//! The delay before retry `n` (0-indexed) is `first * 2^n`, clamped to
//! `max`, then perturbed by symmetric jitter of `delay * spread * (u - 0.5)`
//! with `u` uniform in `[0, 1)`. With the default spread of 0.2 the result
//! lands within ±10% of the clamped delay and averages out to it.

use std::time::Duration;

use rand::Rng;

use super::config::QueueConfig;

/// Default jitter spread (±10%)
pub const DEFAULT_JITTER_SPREAD: f64 = 0.2;

/// Exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub first: Duration,
    /// Cap applied before jitter
    pub max: Duration,
    /// Full width of the jitter band as a fraction of the delay (0 disables)
    pub jitter_spread: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            first: Duration::from_millis(config.base_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
            jitter_spread: DEFAULT_JITTER_SPREAD,
        }
    }

    /// Deterministic delay for `attempt`, without jitter
    pub fn base(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * 2f64.powi(exp);

        if !secs.is_finite() || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay for `attempt` with jitter applied
    pub fn delay(&self, attempt: u32) -> Duration {
        let unit: f64 = rand::rng().random();
        self.delay_with(attempt, unit)
    }

    /// Delay for `attempt` using a caller-supplied uniform sample in `[0, 1)`
    pub fn delay_with(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.base(attempt).as_secs_f64();
        let jitter = base * self.jitter_spread * (unit.clamp(0.0, 1.0) - 0.5);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }
}
