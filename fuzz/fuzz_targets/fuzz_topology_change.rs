//! Fuzz target for topology change decoding and merging.
//!
//! Arbitrary bytes decoded as a batch of topology changes must never panic,
//! whether decoding fails or the batch is merged into a topology. A batch
//! that merges must leave the topology's history gapless and its state
//! reproducible by replay.

#![no_main]

use libfuzzer_sys::fuzz_target;
use shardmeta_topology::{ApplyOutcome, PartitionMap, Topology, TopologyChange};
use shardmeta_types::codec::{decode, encode};

fuzz_target!(|data: &[u8]| {
    let Ok(changes) = decode::<Vec<TopologyChange>>(data) else {
        return;
    };

    // Anything that decodes must re-encode to an equal batch.
    let Ok(bytes) = encode(&changes) else {
        panic!("encode failed after successful decode");
    };
    assert_eq!(decode::<Vec<TopologyChange>>(&bytes).ok().as_ref(), Some(&changes));

    let Ok(map) = PartitionMap::new(16) else {
        return;
    };
    let mut topology = Topology::new("fuzz", map);
    let before = topology.clone();
    match topology.apply(&changes) {
        Ok(ApplyOutcome::Applied { .. }) => {
            let history = topology.get_change_info(0);
            // Oversized batches may already be compacted.
            let Some(history) = history.changes() else {
                return;
            };
            let replayed = Topology::replay("fuzz", map, history);
            assert_eq!(replayed.ok().as_ref(), Some(&topology));
        },
        // Nothing from a rejected batch may be committed.
        Ok(ApplyOutcome::SnapshotRequired { .. }) | Err(_) => assert_eq!(topology, before),
    }
});
