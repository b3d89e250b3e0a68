use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::retry::RetryPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker pool size must be at least 1")]
    NoWorkers,

    #[error("queue capacity must be at least 1")]
    NoQueueCapacity,

    #[error("max attempts must be at least 1")]
    NoAttempts,

    #[error("max retry delay must not be below base delay")]
    DelayCapBelowBase,

    #[error("per-attempt timeout must be at least 1 second")]
    ZeroAttemptTimeout,
}

/// Tuning knobs for the engine, all with defaults. `#[serde(default)]` lets
/// a TOML config file override only the fields it cares about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed worker pool size.
    pub workers: usize,
    /// Bounded queue capacity; submits beyond it get QueueFull.
    pub queue_capacity: usize,
    /// Base retry delay (first backoff step).
    pub base_delay_ms: u64,
    /// Cap on the computed backoff delay.
    pub max_delay_ms: u64,
    /// Attempts per task, including the first.
    pub max_attempts: u32,
    /// Wall-clock bound on a single put_object call.
    pub attempt_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_attempts: 5,
            attempt_timeout_secs: 300,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::NoQueueCapacity);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::DelayCapBelowBase);
        }
        if self.attempt_timeout_secs == 0 {
            return Err(ConfigError::ZeroAttemptTimeout);
        }
        Ok(())
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }

    pub(crate) fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_fields() {
        let base = EngineConfig::default();

        let c = EngineConfig { workers: 0, ..base.clone() };
        assert_eq!(c.validate(), Err(ConfigError::NoWorkers));

        let c = EngineConfig { queue_capacity: 0, ..base.clone() };
        assert_eq!(c.validate(), Err(ConfigError::NoQueueCapacity));

        let c = EngineConfig { max_attempts: 0, ..base.clone() };
        assert_eq!(c.validate(), Err(ConfigError::NoAttempts));

        let c = EngineConfig { attempt_timeout_secs: 0, ..base };
        assert_eq!(c.validate(), Err(ConfigError::ZeroAttemptTimeout));
    }

    #[test]
    fn rejects_cap_below_base() {
        let c = EngineConfig {
            base_delay_ms: 1_000,
            max_delay_ms: 500,
            ..EngineConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::DelayCapBelowBase));
    }

    #[test]
    fn partial_override_from_serde() {
        let c: EngineConfig = serde_json::from_str(r#"{"workers": 8}"#).unwrap();
        assert_eq!(c.workers, 8);
        assert_eq!(c.max_attempts, EngineConfig::default().max_attempts);
    }
}
