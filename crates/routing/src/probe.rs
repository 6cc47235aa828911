//! Background liveness probing of unreachable nodes.
//!
//! Nodes are marked unreachable by [`ShardStateTable::record_failure`]. Each
//! probe cycle asks a [`NodeProber`] to contact every such node and folds the
//! replies back into the table, so a recovered node becomes selectable again
//! without waiting for a dispatcher to risk a real call on it.
//!
//! ## Usage
//!
//! ```ignore
//! let probe = LivenessProbe::new(table, Arc::new(transport_prober));
//! let handle = probe.start();
//! // ... later ...
//! handle.abort();
//! ```

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use shardmeta_types::{NodeId, SequenceNumber};
use snafu::Snafu;
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, info, warn};

use crate::{request::RoleChange, state_table::ShardStateTable};

/// Reply to a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeReply {
    /// Node's latest durable log position.
    pub log_position: u64,
    /// Node's topology sequence number.
    pub topology_seq_num: Option<SequenceNumber>,
    /// Node's current role, if it reports one.
    pub role_change: Option<RoleChange>,
}

/// Probe failure reported by the transport.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProbeError {
    /// The node could not be contacted.
    #[snafu(display("Node {node_id} unreachable: {message}"))]
    Unreachable {
        /// Probed node.
        node_id: NodeId,
        /// Transport description of the failure.
        message: String,
    },

    /// The node did not answer in time.
    #[snafu(display("Probe of node {node_id} timed out after {elapsed:?}"))]
    Timeout {
        /// Probed node.
        node_id: NodeId,
        /// Time waited.
        elapsed: Duration,
    },
}

/// Contacts a node on behalf of the liveness probe.
///
/// Implemented by the transport layer.
#[async_trait]
pub trait NodeProber: Send + Sync {
    /// Probes `node_id` once.
    async fn probe(&self, node_id: NodeId) -> Result<ProbeReply, ProbeError>;
}

/// Outcome counts of one probe cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeCycle {
    /// Nodes probed.
    pub probed: usize,
    /// Nodes that answered and are reachable again.
    pub recovered: usize,
    /// Nodes that did not answer.
    pub failed: usize,
}

/// Periodic liveness probe over a [`ShardStateTable`].
pub struct LivenessProbe {
    table: Arc<ShardStateTable>,
    prober: Arc<dyn NodeProber>,
    interval: Duration,
}

impl LivenessProbe {
    /// Creates a probe running at the table's configured interval.
    pub fn new(table: Arc<ShardStateTable>, prober: Arc<dyn NodeProber>) -> Self {
        let interval = table.config().probe_interval;
        Self { table, prober, interval }
    }

    /// Overrides the probe interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Probes every unreachable node once.
    pub async fn run_cycle(&self) -> ProbeCycle {
        let mut cycle = ProbeCycle::default();
        for node_id in self.table.unreachable_nodes() {
            cycle.probed += 1;
            match self.prober.probe(node_id).await {
                Ok(reply) => {
                    self.fold_reply(node_id, reply);
                    cycle.recovered += 1;
                },
                Err(e) => {
                    debug!(node_id = %node_id, error = %e, "Liveness probe failed");
                    self.table.record_failure(node_id);
                    cycle.failed += 1;
                },
            }
        }

        if cycle.recovered > 0 {
            info!(
                probed = cycle.probed,
                recovered = cycle.recovered,
                failed = cycle.failed,
                "Liveness probe: nodes recovered"
            );
        } else if cycle.failed > 0 {
            warn!(probed = cycle.probed, failed = cycle.failed, "Liveness probe: nodes still unreachable");
        } else {
            debug!("Liveness probe: all nodes reachable");
        }
        cycle
    }

    /// Starts the probe background task.
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn start(self) -> JoinHandle<()> {
        info!(interval_ms = self.interval.as_millis() as u64, "Starting liveness probe task");

        tokio::spawn(async move {
            // tokio rejects a zero period
            let mut ticker = interval(self.interval.max(Duration::from_millis(1)));
            loop {
                ticker.tick().await;
                self.run_cycle().await;
            }
        })
    }

    fn fold_reply(&self, node_id: NodeId, reply: ProbeReply) {
        let node = self.table.node_state(node_id);
        node.observe_log_position(reply.log_position);
        if let Some(seq) = reply.topology_seq_num {
            node.observe_topology_seq_num(seq);
        }
        self.table.record_success(node_id);
        if let Some(change) = reply.role_change {
            self.table.update_role(node_id, change.master_id, change.role, change.timestamp);
        }
    }
}
