//! Dynamic, non-persistent state of one node.
//!
//! Counters are independent atomics. The replication role, believed master,
//! and event timestamp change together, so they live under one small mutex
//! and are always read and written as a unit.

use std::{
    sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::Serialize;
use shardmeta_types::{NodeId, ReplicationRole, SequenceNumber};

use crate::request::OpKind;

/// Replication role of a node together with the event that set it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleInfo {
    /// Last observed role.
    pub role: ReplicationRole,
    /// Master the node believed in at that event.
    pub master_id: Option<NodeId>,
    /// Timestamp of the event; 0 if none has been observed.
    pub last_event_timestamp: u64,
}

/// Running response-time statistic for one operation kind.
#[derive(Debug, Default)]
pub struct ResponseTimeStats {
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

/// Point-in-time copy of [`ResponseTimeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResponseTimeSnapshot {
    /// Calls observed.
    pub count: u64,
    /// Sum of elapsed times.
    pub total_ms: u64,
    /// Slowest call.
    pub max_ms: u64,
    /// Mean elapsed time, if any call was observed.
    pub average_ms: Option<f64>,
}

impl ResponseTimeStats {
    /// Folds one elapsed time into the statistic.
    pub fn record(&self, elapsed_ms: u64) {
        self.total_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(elapsed_ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Calls observed.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Mean elapsed time, if any call was observed.
    pub fn average_ms(&self) -> Option<f64> {
        let count = self.count();
        (count > 0).then(|| self.total_ms.load(Ordering::Relaxed) as f64 / count as f64)
    }

    /// Copies the current values.
    pub fn snapshot(&self) -> ResponseTimeSnapshot {
        ResponseTimeSnapshot {
            count: self.count(),
            total_ms: self.total_ms.load(Ordering::Relaxed),
            max_ms: self.max_ms.load(Ordering::Relaxed),
            average_ms: self.average_ms(),
        }
    }
}

/// Live state of one node, shared by every reader of the state table.
#[derive(Debug)]
pub struct NodeState {
    node_id: NodeId,
    role: Mutex<RoleInfo>,
    log_position: AtomicU64,
    reads: ResponseTimeStats,
    writes: ResponseTimeStats,
    topology_seq_num: AtomicU32,
    topology_stale: AtomicBool,
    consecutive_errors: AtomicU64,
    reachable: AtomicBool,
    active_requests: AtomicU64,
    last_seen: Mutex<Option<Instant>>,
}

impl NodeState {
    /// Creates zero-initialized state with an `Unknown` role.
    ///
    /// A node is presumed reachable until calls to it fail.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            role: Mutex::new(RoleInfo::default()),
            log_position: AtomicU64::new(0),
            reads: ResponseTimeStats::default(),
            writes: ResponseTimeStats::default(),
            topology_seq_num: AtomicU32::new(0),
            topology_stale: AtomicBool::new(false),
            consecutive_errors: AtomicU64::new(0),
            reachable: AtomicBool::new(true),
            active_requests: AtomicU64::new(0),
            last_seen: Mutex::new(None),
        }
    }

    /// Node this state belongs to.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Consistent copy of the role, master, and event timestamp.
    pub fn role_info(&self) -> RoleInfo {
        *self.role.lock()
    }

    /// Last observed replication role.
    pub fn role(&self) -> ReplicationRole {
        self.role.lock().role
    }

    /// Applies a role event unless it is older than the last one applied.
    ///
    /// Returns `false` if the event was ignored.
    pub(crate) fn apply_role(
        &self,
        role: ReplicationRole,
        master_id: Option<NodeId>,
        timestamp: u64,
    ) -> bool {
        let mut info = self.role.lock();
        if timestamp < info.last_event_timestamp {
            return false;
        }
        *info = RoleInfo { role, master_id, last_event_timestamp: timestamp };
        true
    }

    /// Latest durable log position reported by the node.
    pub fn log_position(&self) -> u64 {
        self.log_position.load(Ordering::Acquire)
    }

    /// Advances the log position; older positions are ignored.
    pub fn observe_log_position(&self, position: u64) {
        self.log_position.fetch_max(position, Ordering::AcqRel);
    }

    /// Response-time statistic for `op`.
    pub fn response_times(&self, op: OpKind) -> &ResponseTimeStats {
        match op {
            OpKind::Read => &self.reads,
            OpKind::Write => &self.writes,
        }
    }

    /// Folds a completed call's elapsed time into the statistic for `op`.
    pub fn record_response_time(&self, op: OpKind, elapsed_ms: u64) {
        self.response_times(op).record(elapsed_ms);
    }

    /// Highest topology sequence number the node has reported.
    pub fn topology_seq_num(&self) -> SequenceNumber {
        self.topology_seq_num.load(Ordering::Acquire)
    }

    /// Advances the reported topology sequence number.
    pub fn observe_topology_seq_num(&self, seq: SequenceNumber) {
        self.topology_seq_num.fetch_max(seq, Ordering::AcqRel);
    }

    /// Whether the node's last response flagged a stale topology.
    pub fn is_topology_stale(&self) -> bool {
        self.topology_stale.load(Ordering::Acquire)
    }

    pub(crate) fn set_topology_stale(&self, stale: bool) {
        self.topology_stale.store(stale, Ordering::Release);
    }

    /// Whether the node is currently considered reachable.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    /// Consecutive failed calls since the last success.
    pub fn consecutive_errors(&self) -> u64 {
        self.consecutive_errors.load(Ordering::Acquire)
    }

    /// Records a successful call or probe.
    ///
    /// Returns `true` if the node was unreachable before this call.
    pub(crate) fn record_success(&self) -> bool {
        self.consecutive_errors.store(0, Ordering::Release);
        *self.last_seen.lock() = Some(Instant::now());
        !self.reachable.swap(true, Ordering::AcqRel)
    }

    /// Records a failed call.
    ///
    /// Returns `true` if this failure crossed `threshold` and made the node
    /// unreachable.
    pub(crate) fn record_failure(&self, threshold: u64) -> bool {
        let errors = self.consecutive_errors.fetch_add(1, Ordering::AcqRel) + 1;
        errors >= threshold && self.reachable.swap(false, Ordering::AcqRel)
    }

    /// Calls currently in flight to the node.
    pub fn active_requests(&self) -> u64 {
        self.active_requests.load(Ordering::Acquire)
    }

    pub(crate) fn request_started(&self) {
        self.active_requests.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn request_finished(&self) {
        // Saturate so an unmatched finish cannot wrap the counter.
        let _ = self.active_requests.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Time since the node last answered, if it ever has.
    pub fn time_since_seen(&self) -> Option<Duration> {
        (*self.last_seen.lock()).map(|t| t.elapsed())
    }

    /// Point-in-time copy for monitoring.
    pub fn snapshot(&self) -> NodeStateSnapshot {
        let role = self.role_info();
        NodeStateSnapshot {
            node_id: self.node_id,
            role: role.role,
            master_id: role.master_id,
            last_event_timestamp: role.last_event_timestamp,
            log_position: self.log_position(),
            reads: self.reads.snapshot(),
            writes: self.writes.snapshot(),
            topology_seq_num: self.topology_seq_num(),
            topology_stale: self.is_topology_stale(),
            consecutive_errors: self.consecutive_errors(),
            reachable: self.is_reachable(),
            active_requests: self.active_requests(),
            last_seen_ms: self.time_since_seen().map(|d| d.as_millis() as u64),
        }
    }
}

/// Serializable point-in-time copy of a [`NodeState`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStateSnapshot {
    /// Node.
    pub node_id: NodeId,
    /// Last observed role.
    pub role: ReplicationRole,
    /// Believed master at the last role event.
    pub master_id: Option<NodeId>,
    /// Timestamp of the last role event.
    pub last_event_timestamp: u64,
    /// Latest durable log position.
    pub log_position: u64,
    /// Read latency.
    pub reads: ResponseTimeSnapshot,
    /// Write latency.
    pub writes: ResponseTimeSnapshot,
    /// Highest reported topology sequence number.
    pub topology_seq_num: SequenceNumber,
    /// Whether the last response flagged a stale topology.
    pub topology_stale: bool,
    /// Consecutive failed calls.
    pub consecutive_errors: u64,
    /// Whether the node is considered reachable.
    pub reachable: bool,
    /// Calls in flight.
    pub active_requests: u64,
    /// Milliseconds since the node last answered.
    pub last_seen_ms: Option<u64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{sync::Arc, thread};

    use shardmeta_types::ShardId;

    use super::*;

    fn node() -> NodeState {
        NodeState::new(NodeId::new(ShardId::new(1), 1))
    }

    #[test]
    fn test_new_node_is_unknown_and_reachable() {
        let state = node();
        assert!(state.role().is_unknown());
        assert_eq!(state.role_info().master_id, None);
        assert_eq!(state.log_position(), 0);
        assert!(state.is_reachable());
        assert!(state.response_times(OpKind::Read).average_ms().is_none());
    }

    #[test]
    fn test_older_role_event_ignored() {
        let state = node();
        assert!(state.apply_role(ReplicationRole::Master, None, 100));
        assert!(!state.apply_role(ReplicationRole::Replica, None, 99));
        assert_eq!(state.role(), ReplicationRole::Master);
        // equal timestamps are accepted
        assert!(state.apply_role(ReplicationRole::Other, None, 100));
        assert_eq!(state.role(), ReplicationRole::Other);
    }

    #[test]
    fn test_log_position_is_monotonic() {
        let state = node();
        state.observe_log_position(50);
        state.observe_log_position(20);
        assert_eq!(state.log_position(), 50);
    }

    #[test]
    fn test_response_times_per_op_kind() {
        let state = node();
        state.record_response_time(OpKind::Read, 4);
        state.record_response_time(OpKind::Read, 8);
        state.record_response_time(OpKind::Write, 30);
        let reads = state.response_times(OpKind::Read).snapshot();
        assert_eq!(reads.count, 2);
        assert_eq!(reads.max_ms, 8);
        assert_eq!(reads.average_ms, Some(6.0));
        assert_eq!(state.response_times(OpKind::Write).count(), 1);
    }

    #[test]
    fn test_failures_cross_threshold_once() {
        let state = node();
        assert!(!state.record_failure(3));
        assert!(!state.record_failure(3));
        assert!(state.record_failure(3));
        assert!(!state.record_failure(3));
        assert!(!state.is_reachable());

        assert!(state.record_success());
        assert!(state.is_reachable());
        assert_eq!(state.consecutive_errors(), 0);
        assert!(state.time_since_seen().is_some());
    }

    #[test]
    fn test_request_finished_saturates() {
        let state = node();
        state.request_finished();
        assert_eq!(state.active_requests(), 0);
        state.request_started();
        state.request_started();
        state.request_finished();
        assert_eq!(state.active_requests(), 1);
    }

    #[test]
    fn test_role_info_never_torn() {
        let state = Arc::new(node());
        let writers: Vec<_> = (0..4u64)
            .map(|w| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for i in 0..500u64 {
                        let ts = i * 4 + w;
                        let master = NodeId::new(ShardId::new(1), (ts % 7) as u32 + 1);
                        state.apply_role(ReplicationRole::Replica, Some(master), ts);
                    }
                })
            })
            .collect();
        for _ in 0..2000 {
            let info = state.role_info();
            if let Some(master) = info.master_id {
                assert_eq!(master.node_num() as u64, info.last_event_timestamp % 7 + 1);
            }
        }
        for w in writers {
            w.join().expect("writer");
        }
    }

    #[test]
    fn test_snapshot_serializes() {
        let state = node();
        state.observe_log_position(7);
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["log_position"], 7);
        assert_eq!(json["role"], "Unknown");
    }
}
