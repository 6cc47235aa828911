//! Shard state table and liveness probe configuration.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Minimum interval between liveness probe cycles.
const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// Default consecutive failures before a node is considered unreachable.
fn default_error_threshold() -> u64 {
    3
}

/// Default interval between liveness probe cycles.
fn default_probe_interval() -> Duration {
    Duration::from_secs(1)
}

/// Configuration for the per-process shard state table.
///
/// # Validation Rules
///
/// - `error_threshold` must be > 0
/// - `probe_interval` must be >= 10ms
///
/// # Example
///
/// ```no_run
/// # use std::time::Duration;
/// # use shardmeta_types::config::StateTableConfig;
/// let config = StateTableConfig::builder()
///     .error_threshold(5)
///     .probe_interval(Duration::from_millis(500))
///     .build()
///     .expect("valid state table config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StateTableConfig {
    /// Consecutive failed calls after which a node is marked unreachable.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u64,
    /// Interval between liveness probes of unreachable nodes.
    #[serde(default = "default_probe_interval")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub probe_interval: Duration,
}

#[bon::bon]
impl StateTableConfig {
    /// Creates a new state table configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    #[builder]
    pub fn new(
        #[builder(default = default_error_threshold())] error_threshold: u64,
        #[builder(default = default_probe_interval())] probe_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { error_threshold, probe_interval };
        config.validate()?;
        Ok(config)
    }
}

impl StateTableConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.error_threshold == 0 {
            return Err(ConfigError::Validation {
                message: "error_threshold must be > 0".to_string(),
            });
        }
        if self.probe_interval < MIN_PROBE_INTERVAL {
            return Err(ConfigError::Validation {
                message: format!(
                    "probe_interval must be >= {}ms, got {}ms",
                    MIN_PROBE_INTERVAL.as_millis(),
                    self.probe_interval.as_millis()
                ),
            });
        }
        Ok(())
    }
}

impl Default for StateTableConfig {
    fn default() -> Self {
        Self { error_threshold: default_error_threshold(), probe_interval: default_probe_interval() }
    }
}
