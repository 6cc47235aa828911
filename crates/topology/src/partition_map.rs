//! Deterministic key → partition placement.
//!
//! `partition = (sha256(major_path) mod N) + 1`, with the digest read as an
//! unsigned big-endian integer. Only the major path is hashed, so every
//! record sharing a major path lands on the same partition.
//!
//! `N` is fixed at store creation. Changing it requires a store-wide
//! repartition, which this map does not attempt.

use serde::{Deserialize, Serialize};
use shardmeta_types::{
    MetadataError, PartitionId, Result,
    config::PartitionConfig,
    error::InvalidArgumentSnafu,
    hash::{reduce_mod, shared_digest_slot},
};
use snafu::ensure;

use crate::key::{Key, major_key_len};

/// Maps key bytes to a partition id in `[1, N]`.
///
/// Serializes as the bare partition count; decoding rejects zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub struct PartitionMap {
    n_partitions: u32,
}

impl PartitionMap {
    /// Creates a map over `n_partitions` partitions.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `n_partitions` is zero.
    pub fn new(n_partitions: u32) -> Result<Self> {
        ensure!(n_partitions > 0, InvalidArgumentSnafu { message: "n_partitions must be > 0" });
        Ok(Self { n_partitions })
    }

    /// Creates a map from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the partition count is zero.
    pub fn from_config(config: &PartitionConfig) -> Result<Self> {
        Self::new(config.partition_count)
    }

    /// Number of partitions.
    #[inline]
    pub fn n_partitions(&self) -> u32 {
        self.n_partitions
    }

    /// Returns the partition for encoded key bytes.
    ///
    /// Bytes after the major/minor delimiter do not influence the result.
    pub fn partition_id(&self, key_bytes: &[u8]) -> PartitionId {
        let major = &key_bytes[..major_key_len(key_bytes)];
        self.partition_id_for_major(major)
    }

    /// Returns the partition for a structured key.
    pub fn partition_id_for_key(&self, key: &Key) -> PartitionId {
        self.partition_id_for_major(&key.major_bytes())
    }

    /// Returns `true` if `id` lies in `[1, N]`.
    #[inline]
    pub fn contains(&self, id: PartitionId) -> bool {
        (1..=self.n_partitions).contains(&id.value())
    }

    /// Iterates every partition id in ascending order.
    pub fn partition_ids(&self) -> impl Iterator<Item = PartitionId> + use<> {
        (1..=self.n_partitions).map(PartitionId::new)
    }

    fn partition_id_for_major(&self, major: &[u8]) -> PartitionId {
        let digest = shared_digest_slot().digest(major);
        PartitionId::new(reduce_mod(&digest, self.n_partitions) + 1)
    }
}

impl TryFrom<u32> for PartitionMap {
    type Error = MetadataError;

    fn try_from(n_partitions: u32) -> Result<Self> {
        Self::new(n_partitions)
    }
}

impl From<PartitionMap> for u32 {
    fn from(map: PartitionMap) -> Self {
        map.n_partitions
    }
}
