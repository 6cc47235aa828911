//! Proptest strategies for shardmeta domain types.
//!
//! # Usage
//!
//! ```no_run
//! use shardmeta_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn segment_survives_encoding(addr in strategies::arb_record_address()) {
//!         prop_assert!(!addr.is_null());
//!     }
//! }
//! ```

use proptest::prelude::*;
use shardmeta_types::{NodeId, RecordAddress, ReplicationRole, ShardId};

/// Generates a shard id in `1..=max_shard`.
pub fn arb_shard_id(max_shard: u32) -> impl Strategy<Value = ShardId> {
    (1..=max_shard.max(1)).prop_map(ShardId::new)
}

/// Generates a node id with shard in `1..=max_shard` and node number in `1..=max_node`.
pub fn arb_node_id(max_shard: u32, max_node: u32) -> impl Strategy<Value = NodeId> {
    (arb_shard_id(max_shard), 1..=max_node.max(1)).prop_map(|(s, n)| NodeId::new(s, n))
}

/// Generates a node id within a fixed shard.
pub fn arb_node_in_shard(shard_id: ShardId, max_node: u32) -> impl Strategy<Value = NodeId> {
    (1..=max_node.max(1)).prop_map(move |n| NodeId::new(shard_id, n))
}

/// Generates an observed (non-`Unknown`) replication role.
pub fn arb_observed_role() -> impl Strategy<Value = ReplicationRole> {
    prop_oneof![
        Just(ReplicationRole::Master),
        Just(ReplicationRole::Replica),
        Just(ReplicationRole::Other),
    ]
}

/// Generates a durable record address: neither null nor transient.
///
/// Segment numbers are biased toward small values and `u32::MAX - 1`, the
/// largest durable segment.
pub fn arb_record_address() -> impl Strategy<Value = RecordAddress> {
    let segment = prop_oneof![
        4 => 0u32..16,
        4 => 0u32..u32::MAX - 1,
        1 => Just(u32::MAX - 1),
    ];
    (segment, any::<u32>()).prop_map(|(s, o)| RecordAddress::encode(s, o))
}

/// Generates one key path component matching `[a-z0-9_]{1,12}`.
pub fn arb_key_component() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,12}"
}

/// Generates a `(major, minor)` key path pair: 1-4 major and 0-4 minor components.
pub fn arb_key_parts() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    (
        proptest::collection::vec(arb_key_component(), 1..=4),
        proptest::collection::vec(arb_key_component(), 0..=4),
    )
}

/// Generates a monotonic event timestamp sequence of `len` values.
pub fn arb_timestamps(len: usize) -> impl Strategy<Value = Vec<u64>> {
    proptest::collection::vec(1u64..1_000, len).prop_map(|deltas| {
        deltas
            .into_iter()
            .scan(0u64, |acc, d| {
                *acc += d;
                Some(*acc)
            })
            .collect()
    })
}
