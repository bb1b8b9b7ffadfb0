//! Request queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::QueueError;

/// Where a failed request goes when it is re-enqueued for another attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPlacement {
    /// Behind everything currently queued, including newer submissions
    #[default]
    Tail,

    /// In front of everything currently queued
    Head,
}

/// Request queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Max dispatch starts per rate window
    #[serde(rename = "requests-per-window", default = "default_requests_per_window")]
    pub requests_per_window: u32,

    /// Rate window duration in milliseconds
    #[serde(rename = "window-ms", default = "default_window_ms")]
    pub window_ms: u64,

    /// Minimum spacing between dispatches, and the pause after each batch
    #[serde(rename = "min-dispatch-spacing-ms", default = "default_min_dispatch_spacing_ms")]
    pub min_dispatch_spacing_ms: u64,

    /// Retries after the first attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry
    #[serde(rename = "base-backoff-ms", default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Backoff cap
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Re-enqueue position for retried requests
    #[serde(rename = "retry-placement", default)]
    pub retry_placement: RetryPlacement,
}

fn default_requests_per_window() -> u32 {
    4
}

fn default_window_ms() -> u64 {
    1000
}

fn default_min_dispatch_spacing_ms() -> u64 {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            window_ms: default_window_ms(),
            min_dispatch_spacing_ms: default_min_dispatch_spacing_ms(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            retry_placement: RetryPlacement::Tail,
        }
    }
}

impl QueueConfig {
    /// Derive the rate settings from a per-minute quota
    ///
    /// Quotas of 60/min or more map onto a one second window with
    /// `quota / 60` starts (rounded down). Smaller quotas allow a single
    /// start per `60s / quota` window (rounded up). Both directions err on
    /// the side of staying under the quota.
    pub fn from_quota_per_minute(quota: u32) -> Result<Self, QueueError> {
        if quota == 0 {
            return Err(QueueError::Configuration("quota per minute must be positive".to_string()));
        }

        let (requests_per_window, window_ms) = if quota >= 60 {
            (quota / 60, 1000)
        } else {
            (1, 60_000u64.div_ceil(quota as u64))
        };

        Ok(Self {
            requests_per_window,
            window_ms,
            ..Default::default()
        })
    }

    /// Fail fast on settings the dispatcher cannot honour
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.requests_per_window == 0 {
            return Err(QueueError::Configuration(
                "requests-per-window must be positive".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(QueueError::Configuration("window-ms must be positive".to_string()));
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            return Err(QueueError::Configuration(format!(
                "max-backoff-ms ({}) is smaller than base-backoff-ms ({})",
                self.max_backoff_ms, self.base_backoff_ms
            )));
        }
        Ok(())
    }

    /// Get the rate window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Get the dispatch spacing as a Duration
    pub fn min_dispatch_spacing(&self) -> Duration {
        Duration::from_millis(self.min_dispatch_spacing_ms)
    }

    /// Start delay for the `index`-th member of a batch: `max(D, index * W / R)`
    pub fn stagger(&self, index: usize) -> Duration {
        let spread = self.window() * index as u32 / self.requests_per_window;
        spread.max(self.min_dispatch_spacing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.requests_per_window, 4);
        assert_eq!(config.window_ms, 1000);
        assert_eq!(config.min_dispatch_spacing_ms, 50);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_backoff_ms, 1000);
        assert_eq!(config.max_backoff_ms, 30_000);
        assert_eq!(config.retry_placement, RetryPlacement::Tail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quota_per_minute() {
        let config = QueueConfig::from_quota_per_minute(240).unwrap();
        assert_eq!(config.requests_per_window, 4);
        assert_eq!(config.window_ms, 1000);

        let config = QueueConfig::from_quota_per_minute(90).unwrap();
        assert_eq!(config.requests_per_window, 1);

        let config = QueueConfig::from_quota_per_minute(7).unwrap();
        assert_eq!(config.requests_per_window, 1);
        assert_eq!(config.window_ms, 8572);

        assert!(QueueConfig::from_quota_per_minute(0).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_rate() {
        let config = QueueConfig {
            requests_per_window: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(QueueError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let config = QueueConfig {
            base_backoff_ms: 5000,
            max_backoff_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stagger() {
        let config = QueueConfig {
            requests_per_window: 4,
            window_ms: 1000,
            min_dispatch_spacing_ms: 50,
            ..Default::default()
        };
        assert_eq!(config.stagger(0), Duration::from_millis(50));
        assert_eq!(config.stagger(1), Duration::from_millis(250));
        assert_eq!(config.stagger(3), Duration::from_millis(750));
    }

    #[test]
    fn test_deserialize_partial() {
        let yaml = r#"
requests-per-window: 2
retry-placement: head
"#;
        let config: QueueConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.requests_per_window, 2);
        assert_eq!(config.retry_placement, RetryPlacement::Head);
        assert_eq!(config.window_ms, 1000);
        assert_eq!(config.max_retries, 3);
    }
}
