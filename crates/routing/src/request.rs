//! Call metadata consumed from the transport and replication layers.
//!
//! These are opaque records to the routing core: only the fields below are
//! read. The transport that produces them lives outside this crate.

use serde::{Deserialize, Serialize};
use shardmeta_types::{NodeId, PartitionId, ReplicationRole, SequenceNumber};

/// Operation kind, used to keep separate latency statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Read that any reachable replica may serve.
    Read,
    /// Write that only the master may serve.
    Write,
}

/// A dispatched call, as seen by the routing core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Operation kind.
    pub op_kind: OpKind,
    /// Encoded target key.
    pub key: Vec<u8>,
    /// Partition the dispatcher resolved, if any.
    pub partition_id: Option<PartitionId>,
}

impl Request {
    /// Read of `key`.
    pub fn read(key: impl Into<Vec<u8>>) -> Self {
        Self { op_kind: OpKind::Read, key: key.into(), partition_id: None }
    }

    /// Write of `key`.
    pub fn write(key: impl Into<Vec<u8>>) -> Self {
        Self { op_kind: OpKind::Write, key: key.into(), partition_id: None }
    }

    /// Records the resolved partition.
    #[must_use]
    pub fn with_partition(mut self, partition_id: PartitionId) -> Self {
        self.partition_id = Some(partition_id);
        self
    }
}

/// Role/master change piggybacked on a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    /// Master the responder believes in, if any.
    pub master_id: Option<NodeId>,
    /// Responder's own role.
    pub role: ReplicationRole,
    /// Event timestamp from the responder's replication layer.
    pub timestamp: u64,
}

/// Metadata returned with every completed call.
///
/// # Example
///
/// ```no_run
/// # use shardmeta_routing::Response;
/// # use shardmeta_types::{NodeId, ShardId};
/// let response = Response::builder()
///     .responder(NodeId::new(ShardId::new(3), 2))
///     .log_position(1_042)
///     .stale_topology(true)
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct Response {
    /// Node that served the call.
    pub responder: NodeId,
    /// Responder's latest durable log position.
    #[builder(default)]
    pub log_position: u64,
    /// Responder's topology sequence number.
    pub topology_seq_num: Option<SequenceNumber>,
    /// Embedded role/master change notification.
    pub role_change: Option<RoleChange>,
    /// Set when the responder detected that the caller's topology is stale.
    #[builder(default)]
    pub stale_topology: bool,
}

/// Local replication-role notification delivered to a server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChangeEvent {
    /// New role of this process's node.
    pub role: ReplicationRole,
    /// New master, if known.
    pub master_id: Option<NodeId>,
    /// Event timestamp.
    pub timestamp: u64,
}

/// Single-method callback invoked by the replication layer.
pub trait RoleChangeListener: Send + Sync {
    /// Called when this process's node changes replication role.
    fn role_changed(&self, event: RoleChangeEvent);
}
