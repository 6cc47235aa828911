//! Per-process table of live shard and node state.
//!
//! The table is an explicit context object: construct one at process startup
//! and pass it by `Arc` to the dispatcher, the role-change callback, the
//! topology listener, and the liveness probe. It is never persisted.
//!
//! ## Update entry points
//!
//! 1. [`ShardStateTable::update_role`]: a local replication-role notification
//!    for this process's own node (also reachable through
//!    [`RoleChangeListener`]).
//! 2. [`ShardStateTable::update_from_response`]: metadata observed on any
//!    completed call, for any peer.
//!
//! Reads never fail: looking up a shard or node that has never been seen
//! creates a zero-initialized entry with an `Unknown` role.

use std::{collections::BTreeMap, sync::Arc};

use dashmap::DashMap;
use shardmeta_types::{NodeId, ReplicationRole, ShardId, config::StateTableConfig};
use tracing::{debug, info, warn};

use crate::{
    node_state::{NodeState, NodeStateSnapshot},
    request::{OpKind, Request, Response, RoleChangeEvent, RoleChangeListener},
    shard_state::ShardState,
};

/// Live state of every shard this process has referenced.
#[derive(Debug)]
pub struct ShardStateTable {
    config: StateTableConfig,
    local_node: Option<NodeId>,
    shards: DashMap<ShardId, Arc<ShardState>>,
}

impl ShardStateTable {
    /// Creates an empty table.
    ///
    /// `local_node` is this process's own node when it runs as a server, or
    /// `None` for a pure client.
    pub fn new(config: StateTableConfig, local_node: Option<NodeId>) -> Self {
        Self { config, local_node, shards: DashMap::new() }
    }

    /// Table configuration.
    pub fn config(&self) -> &StateTableConfig {
        &self.config
    }

    /// This process's own node, if it is a server.
    pub fn local_node(&self) -> Option<NodeId> {
        self.local_node
    }

    /// State of a shard, created empty if absent.
    pub fn group_state(&self, shard_id: ShardId) -> Arc<ShardState> {
        if let Some(state) = self.shards.get(&shard_id) {
            return Arc::clone(state.value());
        }
        let state = self.shards.entry(shard_id).or_insert_with(|| {
            debug!(shard_id = shard_id.value(), "Created shard state");
            Arc::new(ShardState::new(shard_id))
        });
        Arc::clone(state.value())
    }

    /// State of a node, created zero-initialized if absent.
    pub fn node_state(&self, node_id: NodeId) -> Arc<NodeState> {
        self.group_state(node_id.shard_id()).node(node_id)
    }

    /// Last observed replication role of a node.
    pub fn rep_state(&self, node_id: NodeId) -> ReplicationRole {
        self.node_state(node_id).role()
    }

    /// Point-in-time snapshot of every known node, ordered by node id.
    pub fn rep_node_states(&self) -> Vec<NodeStateSnapshot> {
        let mut by_node = BTreeMap::new();
        for shard in self.shard_states() {
            for node in shard.nodes() {
                by_node.entry(node.node_id()).or_insert_with(|| node.snapshot());
            }
        }
        by_node.into_values().collect()
    }

    /// Known shards in ascending order.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        let mut ids: Vec<_> = self.shards.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Entry point 1: applies a replication-role event.
    ///
    /// Returns `false` if the event was older than the node's last event.
    pub fn update_role(
        &self,
        node_id: NodeId,
        master_id: Option<NodeId>,
        role: ReplicationRole,
        timestamp: u64,
    ) -> bool {
        self.group_state(node_id.shard_id()).update_role(node_id, master_id, role, timestamp)
    }

    /// Entry point 2: folds the metadata of a completed call into the table.
    pub fn update_from_response(&self, request: &Request, response: &Response, elapsed_ms: u64) {
        let responder = response.responder;
        let node = self.node_state(responder);
        node.observe_log_position(response.log_position);
        node.record_response_time(request.op_kind, elapsed_ms);
        self.record_success(responder);
        if let Some(seq) = response.topology_seq_num {
            node.observe_topology_seq_num(seq);
        }
        if response.stale_topology {
            debug!(
                node_id = %responder,
                topology_seq_num = ?response.topology_seq_num,
                partition_id = ?request.partition_id,
                "Responder reported stale topology"
            );
        }
        node.set_topology_stale(response.stale_topology);
        if let Some(change) = response.role_change {
            self.update_role(responder, change.master_id, change.role, change.timestamp);
        }
    }

    /// Records a failed call to `node_id`.
    ///
    /// Returns `true` if this failure made the node unreachable.
    pub fn record_failure(&self, node_id: NodeId) -> bool {
        let node = self.node_state(node_id);
        let became_unreachable = node.record_failure(self.config.error_threshold);
        if became_unreachable {
            warn!(
                node_id = %node_id,
                consecutive_errors = node.consecutive_errors(),
                "Node marked unreachable"
            );
        }
        became_unreachable
    }

    /// Records a successful call to `node_id`.
    ///
    /// Returns `true` if the node was unreachable before.
    pub fn record_success(&self, node_id: NodeId) -> bool {
        let recovered = self.node_state(node_id).record_success();
        if recovered {
            info!(node_id = %node_id, "Node reachable again");
        }
        recovered
    }

    /// Marks a call to `node_id` as in flight.
    pub fn request_started(&self, node_id: NodeId) {
        self.node_state(node_id).request_started();
    }

    /// Marks a call to `node_id` as finished.
    pub fn request_finished(&self, node_id: NodeId) {
        self.node_state(node_id).request_finished();
    }

    /// Nodes currently considered unreachable, ascending.
    pub fn unreachable_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<_> = self
            .shard_states()
            .iter()
            .flat_map(|s| s.nodes())
            .filter(|n| !n.is_reachable())
            .map(|n| n.node_id())
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Chooses a node of `shard_id` to serve an operation.
    ///
    /// Writes go to the believed master if it is reachable. Reads go to the
    /// reachable node with the lowest average read latency; nodes without
    /// latency data come last, ties break on fewer in-flight calls, then on
    /// node id. Returns `None` when no suitable node is known.
    pub fn select_node(&self, shard_id: ShardId, op: OpKind) -> Option<NodeId> {
        let shard = self.group_state(shard_id);
        match op {
            OpKind::Write => shard
                .master()
                .filter(|m| shard.get(*m).is_some_and(|n| n.is_reachable())),
            OpKind::Read => shard
                .nodes()
                .into_iter()
                .filter(|n| n.is_reachable())
                .min_by(|a, b| {
                    let la = a.response_times(OpKind::Read).average_ms().unwrap_or(f64::INFINITY);
                    let lb = b.response_times(OpKind::Read).average_ms().unwrap_or(f64::INFINITY);
                    la.total_cmp(&lb)
                        .then(a.active_requests().cmp(&b.active_requests()))
                        .then(a.node_id().cmp(&b.node_id()))
                })
                .map(|n| n.node_id()),
        }
    }

    /// Copies the shard entries so no map lock is held while visiting them.
    fn shard_states(&self) -> Vec<Arc<ShardState>> {
        self.shards.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

impl RoleChangeListener for ShardStateTable {
    fn role_changed(&self, event: RoleChangeEvent) {
        let Some(local) = self.local_node else {
            debug!(role = %event.role, "Ignoring role change: no local node");
            return;
        };
        self.update_role(local, event.master_id, event.role, event.timestamp);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SHARD: ShardId = ShardId::new(3);

    fn n(num: u32) -> NodeId {
        NodeId::new(SHARD, num)
    }

    fn table() -> ShardStateTable {
        ShardStateTable::new(StateTableConfig::default(), Some(n(1)))
    }

    fn read_from(table: &ShardStateTable, node: NodeId, elapsed_ms: u64) {
        let response = Response::builder().responder(node).build();
        table.update_from_response(&Request::read(b"k".to_vec()), &response, elapsed_ms);
    }

    #[test]
    fn test_unseen_shard_returns_unknown_node() {
        let table = table();
        let node = NodeId::new(ShardId::new(99), 1);
        assert_eq!(table.rep_state(node), ReplicationRole::Unknown);
        let first = table.group_state(ShardId::new(99));
        let second = table.group_state(ShardId::new(99));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.contains(node));
    }

    #[test]
    fn test_response_folds_metadata() {
        let table = table();
        let response = Response::builder()
            .responder(n(2))
            .log_position(500)
            .topology_seq_num(12)
            .stale_topology(true)
            .build();
        table.update_from_response(&Request::write(b"k".to_vec()), &response, 9);

        let node = table.node_state(n(2));
        assert_eq!(node.log_position(), 500);
        assert_eq!(node.topology_seq_num(), 12);
        assert!(node.is_topology_stale());
        assert_eq!(node.response_times(OpKind::Write).count(), 1);
        assert_eq!(node.response_times(OpKind::Read).count(), 0);
        assert!(node.role().is_unknown());
    }

    #[test]
    fn test_response_role_change_targets_responder() {
        let table = table();
        let response = Response::builder()
            .responder(n(2))
            .role_change(crate::request::RoleChange {
                master_id: Some(n(1)),
                role: ReplicationRole::Replica,
                timestamp: 105,
            })
            .build();
        table.update_from_response(&Request::read(b"k".to_vec()), &response, 1);
        assert_eq!(table.rep_state(n(2)), ReplicationRole::Replica);
        assert_eq!(table.rep_state(n(1)), ReplicationRole::Master);
    }

    #[test]
    fn test_foreign_master_never_selected_for_writes() {
        let table = table();
        let foreign = NodeId::new(ShardId::new(4), 1);
        table.update_role(n(2), Some(foreign), ReplicationRole::Replica, 10);
        assert_eq!(table.select_node(SHARD, OpKind::Write), None);
        assert!(!table.group_state(SHARD).contains(foreign));
        assert_eq!(table.rep_state(foreign), ReplicationRole::Unknown);
    }

    #[test]
    fn test_role_listener_targets_local_node() {
        let table = table();
        table.role_changed(RoleChangeEvent { role: ReplicationRole::Master, master_id: None, timestamp: 1 });
        assert_eq!(table.rep_state(n(1)), ReplicationRole::Master);
        assert_eq!(table.group_state(SHARD).master(), Some(n(1)));
    }

    #[test]
    fn test_role_listener_without_local_node_is_noop() {
        let table = ShardStateTable::new(StateTableConfig::default(), None);
        table.role_changed(RoleChangeEvent { role: ReplicationRole::Master, master_id: None, timestamp: 1 });
        assert!(table.shard_ids().is_empty());
    }

    #[test]
    fn test_rep_node_states_sorted_across_shards() {
        let table = table();
        let other = NodeId::new(ShardId::new(1), 4);
        table.node_state(n(2));
        table.node_state(other);
        table.node_state(n(1));
        let ids: Vec<_> = table.rep_node_states().into_iter().map(|s| s.node_id).collect();
        assert_eq!(ids, vec![other, n(1), n(2)]);
        assert_eq!(table.shard_ids(), vec![ShardId::new(1), SHARD]);
    }

    #[test]
    fn test_failures_mark_unreachable_and_success_recovers() {
        let table = table();
        for _ in 0..2 {
            assert!(!table.record_failure(n(2)));
        }
        assert!(table.record_failure(n(2)));
        assert_eq!(table.unreachable_nodes(), vec![n(2)]);
        read_from(&table, n(2), 3);
        assert!(table.unreachable_nodes().is_empty());
    }

    #[test]
    fn test_select_write_requires_reachable_master() {
        let table = table();
        assert_eq!(table.select_node(SHARD, OpKind::Write), None);
        table.update_role(n(1), None, ReplicationRole::Master, 10);
        assert_eq!(table.select_node(SHARD, OpKind::Write), Some(n(1)));
        for _ in 0..3 {
            table.record_failure(n(1));
        }
        assert_eq!(table.select_node(SHARD, OpKind::Write), None);
    }

    #[test]
    fn test_select_read_prefers_fastest() {
        let table = table();
        read_from(&table, n(1), 20);
        read_from(&table, n(2), 5);
        table.group_state(SHARD).ensure_member(n(3));
        assert_eq!(table.select_node(SHARD, OpKind::Read), Some(n(2)));

        for _ in 0..3 {
            table.record_failure(n(2));
        }
        assert_eq!(table.select_node(SHARD, OpKind::Read), Some(n(1)));
    }

    #[test]
    fn test_select_read_breaks_ties_on_load() {
        let table = table();
        table.group_state(SHARD).ensure_member(n(1));
        table.group_state(SHARD).ensure_member(n(2));
        table.request_started(n(1));
        assert_eq!(table.select_node(SHARD, OpKind::Read), Some(n(2)));
        table.request_finished(n(1));
        assert_eq!(table.select_node(SHARD, OpKind::Read), Some(n(1)));
    }
}
