//! Topology components.
//!
//! A component is the payload of an `Add` or `Update` topology change: a
//! partition assignment, a shard, or a node. A component read out of a
//! topology remembers which topology it came from through a [`TopologyKey`]
//! handle. The handle is a lookup association only; it does not keep the
//! topology alive and never crosses the wire.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use shardmeta_types::{NodeId, PartitionId, ResourceId, ShardId};

/// Opaque handle identifying one topology instance within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopologyKey(u64);

impl TopologyKey {
    /// Allocates a process-unique key.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Attributes carried by each kind of component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// A partition and the shard it is assigned to.
    Partition {
        /// Owning shard.
        shard_id: ShardId,
    },
    /// A shard. Shards carry no mutable attributes once created.
    Shard,
    /// A node. Its shard is implied by its [`NodeId`].
    Node {
        /// Storage directory on the node's host, if explicitly configured.
        storage_dir: Option<String>,
    },
}

impl ComponentKind {
    /// Returns `true` if `id` names a resource of this kind.
    pub fn matches(&self, id: ResourceId) -> bool {
        matches!(
            (self, id),
            (Self::Partition { .. }, ResourceId::Partition(_))
                | (Self::Shard, ResourceId::Shard(_))
                | (Self::Node { .. }, ResourceId::Node(_))
        )
    }
}

/// A topology component with its resource id and owning-topology handle.
#[derive(Debug, Clone)]
pub struct Component {
    resource_id: Option<ResourceId>,
    kind: ComponentKind,
    owner: Option<TopologyKey>,
}

impl Component {
    /// Creates a detached component with no resource id.
    pub fn new(kind: ComponentKind) -> Self {
        Self { resource_id: None, kind, owner: None }
    }

    /// Partition assigned to `shard_id`, identified by `id`.
    pub fn partition(id: PartitionId, shard_id: ShardId) -> Self {
        Self::new(ComponentKind::Partition { shard_id }).with_id(id)
    }

    /// Shard identified by `id`.
    pub fn shard(id: ShardId) -> Self {
        Self::new(ComponentKind::Shard).with_id(id)
    }

    /// Node identified by `id`.
    pub fn node(id: NodeId, storage_dir: Option<String>) -> Self {
        Self::new(ComponentKind::Node { storage_dir }).with_id(id)
    }

    /// Sets the resource id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Resource id, if assigned.
    pub fn resource_id(&self) -> Option<ResourceId> {
        self.resource_id
    }

    /// Component attributes.
    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    /// Topology this component was read from, if any.
    pub fn owner(&self) -> Option<TopologyKey> {
        self.owner
    }

    /// Returns a copy with the owner association cleared.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self { owner: None, ..self.clone() }
    }

    pub(crate) fn attach(&mut self, owner: TopologyKey) {
        self.owner = Some(owner);
    }
}

/// Components compare by identity and attributes; the owner handle is ignored.
impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.resource_id == other.resource_id && self.kind == other.kind
    }
}

impl Eq for Component {}
