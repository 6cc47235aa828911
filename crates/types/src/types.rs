//! Core type definitions for shardmeta.
//!
//! - Identifier types (PartitionId, ShardId, NodeId)
//! - Resource identifiers used by topology changes
//! - Replication roles observed for nodes

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifier Types
// ============================================================================

/// Generates a newtype wrapper around a numeric type for type-safe identifiers.
///
/// Each generated type provides:
/// - Standard derives: Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord
/// - Serde with `#[serde(transparent)]` for wire format compatibility
/// - `From<inner>` and `Into<inner>` conversions
/// - `Display` with a semantic prefix (e.g., `shard:3`)
/// - `new()` constructor and `value()` accessor
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $inner:ty, $prefix:expr
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Creates a new identifier from a raw value.
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the raw numeric value.
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = <$inner as std::str::FromStr>::Err;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.parse::<$inner>().map(Self)
            }
        }
    };
}

define_id!(
    /// Identifier of a partition, the fixed unit keys hash into.
    ///
    /// Partition ids are 1-based and lie in `[1, N]` where `N` is the
    /// partition count fixed at store creation.
    ///
    /// # Display
    ///
    /// Formats with `p:` prefix: `p:17`.
    PartitionId, u32, "p"
);

define_id!(
    /// Identifier of a shard (replication group).
    ///
    /// # Display
    ///
    /// Formats with `shard:` prefix: `shard:3`.
    ShardId, u32, "shard"
);

/// Sequence number of a topology change.
///
/// An empty topology is at sequence number 0; the first change is numbered 1.
pub type SequenceNumber = u32;

/// Identifier of a node (one replica process) within a shard.
///
/// A node id always implies its owning shard.
///
/// # Display
///
/// Formats as `sh{shard}-n{node}`: `sh3-n2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    shard_id: ShardId,
    node_num: u32,
}

impl NodeId {
    /// Creates a node id for node number `node_num` within `shard_id`.
    #[inline]
    pub const fn new(shard_id: ShardId, node_num: u32) -> Self {
        Self { shard_id, node_num }
    }

    /// Returns the shard this node belongs to.
    #[inline]
    pub const fn shard_id(self) -> ShardId {
        self.shard_id
    }

    /// Returns the node number within its shard.
    #[inline]
    pub const fn node_num(self) -> u32 {
        self.node_num
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sh{}-n{}", self.shard_id.value(), self.node_num)
    }
}

/// Identifier of any topology component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceId {
    /// A partition.
    Partition(PartitionId),
    /// A shard.
    Shard(ShardId),
    /// A node.
    Node(NodeId),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition(id) => id.fmt(f),
            Self::Shard(id) => id.fmt(f),
            Self::Node(id) => id.fmt(f),
        }
    }
}

impl From<PartitionId> for ResourceId {
    fn from(id: PartitionId) -> Self {
        Self::Partition(id)
    }
}

impl From<ShardId> for ResourceId {
    fn from(id: ShardId) -> Self {
        Self::Shard(id)
    }
}

impl From<NodeId> for ResourceId {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

// ============================================================================
// Replication Roles
// ============================================================================

/// Replication role last observed for a node.
///
/// Every node starts as `Unknown`. Once an event has been observed the role
/// moves freely among `Master`, `Replica`, and `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReplicationRole {
    /// No role event has been observed yet.
    #[default]
    Unknown,
    /// The node accepts writes for its shard.
    Master,
    /// The node replicates from the master.
    Replica,
    /// Any other replication state (detached, syncing, shutting down).
    Other,
}

impl ReplicationRole {
    /// Returns `true` for [`ReplicationRole::Master`].
    #[inline]
    pub const fn is_master(self) -> bool {
        matches!(self, Self::Master)
    }

    /// Returns `true` for [`ReplicationRole::Replica`].
    #[inline]
    pub const fn is_replica(self) -> bool {
        matches!(self, Self::Replica)
    }

    /// Returns `true` if no role event has been observed.
    #[inline]
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for ReplicationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Master => "master",
            Self::Replica => "replica",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}
