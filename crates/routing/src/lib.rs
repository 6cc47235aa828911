//! Live shard state and node selection for shardmeta.
//!
//! This crate tracks, per process, the replication role and responsiveness of
//! every node of every shard, so a dispatcher can route each call to a node
//! able to serve it:
//!
//! - [`ShardStateTable`]: the table and its two update entry points
//! - [`MembershipListener`]: keeps membership in step with the topology
//! - [`LivenessProbe`]: background probing of unreachable nodes
//! - [`Request`]/[`Response`]: the call metadata the table consumes

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod listener;
pub mod node_state;
pub mod probe;
pub mod request;
pub mod shard_state;
pub mod state_table;

pub use listener::MembershipListener;
pub use node_state::{NodeState, NodeStateSnapshot, ResponseTimeSnapshot, ResponseTimeStats, RoleInfo};
pub use probe::{LivenessProbe, NodeProber, ProbeCycle, ProbeError, ProbeReply};
pub use request::{OpKind, Request, Response, RoleChange, RoleChangeEvent, RoleChangeListener};
pub use shard_state::ShardState;
pub use state_table::ShardStateTable;
