//! Keeps state-table membership in step with the topology.

use std::sync::Arc;

use shardmeta_topology::{Topology, TopologyListener};
use tracing::debug;

use crate::state_table::ShardStateTable;

/// Adds a placeholder state for every node in a published topology.
///
/// Only membership is touched. Role, latency, and log-position state stay
/// under the control of the table's update entry points, and nodes removed
/// from the topology keep their entries.
#[derive(Debug, Clone)]
pub struct MembershipListener {
    table: Arc<ShardStateTable>,
}

impl MembershipListener {
    /// Creates a listener feeding `table`.
    pub fn new(table: Arc<ShardStateTable>) -> Self {
        Self { table }
    }
}

impl TopologyListener for MembershipListener {
    fn topology_updated(&self, topology: &Topology) {
        let mut added = 0usize;
        for shard_id in topology.shard_ids() {
            let shard = self.table.group_state(shard_id);
            added += topology.node_ids(shard_id).filter(|n| shard.ensure_member(*n)).count();
        }
        debug!(
            store = topology.store_name(),
            sequence_number = topology.sequence_number(),
            added,
            "Refreshed shard membership"
        );
    }
}
