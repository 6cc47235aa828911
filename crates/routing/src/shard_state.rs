//! Per-shard dynamic state: member nodes and the believed master.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use shardmeta_types::{NodeId, ReplicationRole, ShardId};
use tracing::{debug, info, warn};

use crate::node_state::NodeState;

#[derive(Debug, Default)]
struct MasterInfo {
    master: Option<NodeId>,
    last_change: u64,
}

/// Live state of every known node in one shard.
///
/// Node entries are created lazily on first reference and never removed for
/// the lifetime of the process.
#[derive(Debug)]
pub struct ShardState {
    shard_id: ShardId,
    nodes: DashMap<NodeId, Arc<NodeState>>,
    /// Serializes role transitions within the shard.
    master: Mutex<MasterInfo>,
}

impl ShardState {
    /// Creates an empty shard entry.
    pub fn new(shard_id: ShardId) -> Self {
        Self { shard_id, nodes: DashMap::new(), master: Mutex::new(MasterInfo::default()) }
    }

    /// Shard this state belongs to.
    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    /// State of `node_id`, created zero-initialized if absent.
    pub fn node(&self, node_id: NodeId) -> Arc<NodeState> {
        if let Some(state) = self.nodes.get(&node_id) {
            return Arc::clone(state.value());
        }
        let state = self.nodes.entry(node_id).or_insert_with(|| Arc::new(NodeState::new(node_id)));
        Arc::clone(state.value())
    }

    /// State of `node_id` if it has been referenced before.
    pub fn get(&self, node_id: NodeId) -> Option<Arc<NodeState>> {
        self.nodes.get(&node_id).map(|s| Arc::clone(s.value()))
    }

    /// Adds a placeholder for `node_id` without touching existing state.
    ///
    /// Returns `true` if the node was new.
    pub fn ensure_member(&self, node_id: NodeId) -> bool {
        let mut inserted = false;
        self.nodes.entry(node_id).or_insert_with(|| {
            inserted = true;
            Arc::new(NodeState::new(node_id))
        });
        inserted
    }

    /// Returns `true` if `node_id` has state in this shard.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Number of known nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node has been referenced.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Known nodes in ascending id order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.nodes.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// States of all known nodes in ascending id order.
    pub fn nodes(&self) -> Vec<Arc<NodeState>> {
        let mut nodes: Vec<_> = self.nodes.iter().map(|e| Arc::clone(e.value())).collect();
        nodes.sort_unstable_by_key(|n| n.node_id());
        nodes
    }

    /// Node currently believed to be master.
    pub fn master(&self) -> Option<NodeId> {
        self.master.lock().master
    }

    /// Applies a role event reported by or about `node_id`.
    ///
    /// The event is ignored if it is older than the last event applied to
    /// `node_id`. Otherwise the node adopts `role`. The master it names (the
    /// node itself when it reports `Master`) is marked `Master`, and a
    /// different, previously believed master is demoted to `Replica` of the
    /// new one. Shard master changes older than the last one are not applied.
    /// A `master_id` outside this shard is dropped.
    ///
    /// Returns `false` if the event was ignored.
    pub fn update_role(
        &self,
        node_id: NodeId,
        master_id: Option<NodeId>,
        role: ReplicationRole,
        timestamp: u64,
    ) -> bool {
        let master_id = master_id.filter(|m| {
            let local = m.shard_id() == self.shard_id;
            if !local {
                warn!(
                    shard_id = self.shard_id.value(),
                    node_id = %node_id,
                    master_id = %m,
                    "Ignoring master id from another shard"
                );
            }
            local
        });
        let mut master = self.master.lock();
        let reported_master = if role.is_master() { Some(node_id) } else { master_id };

        if !self.node(node_id).apply_role(role, reported_master, timestamp) {
            debug!(
                shard_id = self.shard_id.value(),
                node_id = %node_id,
                timestamp,
                "Ignoring stale role event"
            );
            return false;
        }
        if timestamp < master.last_change {
            return true;
        }

        match reported_master {
            Some(new_master) => {
                if new_master != node_id {
                    self.node(new_master).apply_role(ReplicationRole::Master, Some(new_master), timestamp);
                }
                if let Some(previous) = master.master
                    && previous != new_master
                    && previous != node_id
                {
                    self.node(previous).apply_role(ReplicationRole::Replica, Some(new_master), timestamp);
                }
                if master.master != Some(new_master) {
                    info!(
                        shard_id = self.shard_id.value(),
                        master = %new_master,
                        previous = ?master.master,
                        timestamp,
                        "Shard master changed"
                    );
                }
                master.master = Some(new_master);
                master.last_change = timestamp;
            },
            None if master.master == Some(node_id) => {
                info!(
                    shard_id = self.shard_id.value(),
                    node_id = %node_id,
                    role = %role,
                    timestamp,
                    "Shard master stepped down"
                );
                master.master = None;
                master.last_change = timestamp;
            },
            None => {},
        }
        true
    }
}
