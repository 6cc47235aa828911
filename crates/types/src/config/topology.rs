//! Partitioning and topology change-log configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default number of partitions for a new store.
fn default_partition_count() -> u32 {
    1000
}

/// Default number of topology changes retained for incremental catch-up.
fn default_max_retained_changes() -> usize {
    1000
}

/// Partitioning configuration, fixed at store creation.
///
/// # Validation Rules
///
/// - `partition_count` must be > 0
///
/// # Example
///
/// ```no_run
/// # use shardmeta_types::config::PartitionConfig;
/// let config = PartitionConfig::builder()
///     .partition_count(300)
///     .build()
///     .expect("valid partition config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PartitionConfig {
    /// Number of partitions keys hash into.
    ///
    /// Changing this value requires a full repartition of the store.
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,
}

#[bon::bon]
impl PartitionConfig {
    /// Creates a new partition configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `partition_count` is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_partition_count())] partition_count: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self { partition_count };
        config.validate()?;
        Ok(config)
    }
}

impl PartitionConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition_count == 0 {
            return Err(ConfigError::Validation {
                message: "partition_count must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self { partition_count: default_partition_count() }
    }
}

/// Retention of the topology change history.
///
/// Nodes that fall further behind than the retained history must receive a
/// full topology snapshot instead of incremental changes.
///
/// # Validation Rules
///
/// - `max_retained_changes` must be > 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeLogConfig {
    /// Maximum number of changes kept in a topology's history.
    #[serde(default = "default_max_retained_changes")]
    pub max_retained_changes: usize,
}

#[bon::bon]
impl ChangeLogConfig {
    /// Creates a new change-log configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_retained_changes` is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_max_retained_changes())] max_retained_changes: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_retained_changes };
        config.validate()?;
        Ok(config)
    }
}

impl ChangeLogConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retained_changes == 0 {
            return Err(ConfigError::Validation {
                message: "max_retained_changes must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ChangeLogConfig {
    fn default() -> Self {
        Self { max_retained_changes: default_max_retained_changes() }
    }
}
