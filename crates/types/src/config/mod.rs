//! Configuration types for shardmeta.
//!
//! All config structs validate their values at construction time via
//! fallible builders. Post-deserialization validation is available via
//! the `validate()` method on each struct. Loading configuration from files
//! is the embedding process's concern.

// The schemars `JsonSchema` derive macro internally uses `.unwrap()` in its
// expansions.
#![allow(clippy::disallowed_methods)]

mod state_table;
mod topology;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
pub use state_table::*;
pub use topology::*;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Complete routing-core configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RoutingConfig {
    /// Partitioning.
    #[serde(default)]
    pub partitions: PartitionConfig,
    /// Topology change history retention.
    #[serde(default)]
    pub change_log: ChangeLogConfig,
    /// Shard state table.
    #[serde(default)]
    pub state_table: StateTableConfig,
}

impl RoutingConfig {
    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Validation`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.partitions.validate()?;
        self.change_log.validate()?;
        self.state_table.validate()
    }
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
