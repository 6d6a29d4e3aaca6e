//! State pool and change-stream configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Tuning knobs for the pool, its tailer, and the event hub.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Delay before the supervisor restarts a failed tailer (milliseconds).
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// Interval between transaction-log polls when the log is idle
    /// (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of each hub subscription's delivery queue. A subscriber
    /// that falls this far behind is dropped.
    #[serde(default = "default_subscription_queue_capacity")]
    pub subscription_queue_capacity: usize,
}

fn default_restart_delay_ms() -> u64 {
    1000 // 1 second
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_subscription_queue_capacity() -> usize {
    4096
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            restart_delay_ms: default_restart_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            subscription_queue_capacity: default_subscription_queue_capacity(),
        }
    }
}

impl PoolConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &'static str, reason: &str| -> crate::error::Error {
            ConfigError::InvalidValue {
                field,
                reason: reason.to_string(),
            }
            .into()
        };

        if self.restart_delay_ms == 0 {
            return Err(invalid("restart_delay_ms", "must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be > 0"));
        }
        if self.subscription_queue_capacity == 0 {
            return Err(invalid("subscription_queue_capacity", "must be > 0"));
        }
        Ok(())
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
