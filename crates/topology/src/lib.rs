//! Partition placement and versioned topology for shardmeta.
//!
//! - [`Key`] and [`PartitionMap`]: deterministic key → partition placement
//! - [`TopologyChange`] and [`ChangeLog`]: the sequence-numbered change history
//! - [`Topology`]: partition → shard → node membership with idempotent merge
//! - [`TopologyHandle`]: copy-on-write publication to concurrent readers

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod change;
pub mod component;
pub mod handle;
pub mod key;
pub mod partition_map;
pub mod topology;

pub use change::{ChangeInfo, ChangeKind, ChangeLog, ChangePayload, TopologyChange};
pub use component::{Component, ComponentKind, TopologyKey};
pub use handle::{TopologyHandle, TopologyListener};
pub use key::Key;
pub use partition_map::PartitionMap;
pub use topology::{ApplyOutcome, NodeRecord, Topology};
