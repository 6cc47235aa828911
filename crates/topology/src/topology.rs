//! Versioned partition → shard → node topology.
//!
//! A [`Topology`] holds the partition assignment, shard membership, and the
//! retained change history. The control-plane leader mutates its copy through
//! the `add_*`/`update_*`/`remove_*` operations, each of which records one
//! [`TopologyChange`]. Every other participant merges those changes with
//! [`Topology::apply`], which is idempotent: already-applied sequence numbers
//! are skipped.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use shardmeta_types::{
    NodeId, PartitionId, ResourceId, Result, SequenceNumber, ShardId,
    codec::{decode, encode},
    config::ChangeLogConfig,
    error::{InternalSnafu, InvalidArgumentSnafu},
};
use snafu::{OptionExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    change::{ChangeInfo, ChangeLog, ChangePayload, TopologyChange},
    component::{Component, ComponentKind, TopologyKey},
    partition_map::PartitionMap,
};

/// Attributes recorded for a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Storage directory on the node's host, if explicitly configured.
    pub storage_dir: Option<String>,
}

/// Result of merging a batch of changes into a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The batch was merged.
    Applied {
        /// Changes newly applied.
        applied: usize,
        /// Changes skipped because they were already applied.
        skipped: usize,
    },
    /// The batch does not continue this topology's history. Nothing was
    /// applied; the caller must transfer a full snapshot.
    SnapshotRequired {
        /// Sequence number this topology needed next.
        expected: SequenceNumber,
        /// Sequence number found in its place.
        found: SequenceNumber,
    },
}

impl ApplyOutcome {
    /// Number of changes newly applied.
    pub fn applied(&self) -> usize {
        match self {
            Self::Applied { applied, .. } => *applied,
            Self::SnapshotRequired { .. } => 0,
        }
    }

    /// Returns `true` if the caller must fall back to a full snapshot.
    pub fn is_snapshot_required(&self) -> bool {
        matches!(self, Self::SnapshotRequired { .. })
    }
}

/// Versioned partition → shard assignment and shard → node membership.
///
/// `Clone` keeps the [`TopologyKey`]; use [`Topology::copy`] for an
/// independent snapshot with its own key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    #[serde(skip, default = "TopologyKey::next")]
    key: TopologyKey,
    store_name: String,
    partition_map: PartitionMap,
    sequence_number: SequenceNumber,
    partitions: BTreeMap<PartitionId, ShardId>,
    shards: BTreeMap<ShardId, BTreeSet<NodeId>>,
    nodes: BTreeMap<NodeId, NodeRecord>,
    changes: ChangeLog,
    max_retained_changes: usize,
}

impl Topology {
    /// Creates an empty topology at sequence number 0.
    pub fn new(store_name: impl Into<String>, partition_map: PartitionMap) -> Self {
        Self {
            key: TopologyKey::next(),
            store_name: store_name.into(),
            partition_map,
            sequence_number: 0,
            partitions: BTreeMap::new(),
            shards: BTreeMap::new(),
            nodes: BTreeMap::new(),
            changes: ChangeLog::new(),
            max_retained_changes: ChangeLogConfig::default().max_retained_changes,
        }
    }

    /// Sets the change-history retention bound.
    #[must_use]
    pub fn with_change_log_config(mut self, config: &ChangeLogConfig) -> Self {
        self.max_retained_changes = config.max_retained_changes;
        self.changes.compact(self.max_retained_changes);
        self
    }

    /// Rebuilds a topology by applying `changes` to an empty one.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `changes` does not start at
    /// sequence number 1 or has a gap, and an internal-invariant error if a
    /// change contradicts the state built so far.
    pub fn replay(
        store_name: impl Into<String>,
        partition_map: PartitionMap,
        changes: &[TopologyChange],
    ) -> Result<Self> {
        let mut topology = Self::new(store_name, partition_map);
        // Replay keeps the whole history.
        topology.max_retained_changes = changes.len().max(topology.max_retained_changes);
        if let ApplyOutcome::SnapshotRequired { expected, found } = topology.apply(changes)? {
            return InvalidArgumentSnafu {
                message: format!("history has a gap: expected change {expected}, found {found}"),
            }
            .fail();
        }
        Ok(topology)
    }

    /// Returns an independent snapshot with a fresh [`TopologyKey`].
    #[must_use]
    pub fn copy(&self) -> Self {
        let mut copy = self.clone();
        copy.key = TopologyKey::next();
        copy.changes.attach_all(copy.key);
        copy
    }

    /// Encodes the full snapshot for transfer.
    ///
    /// # Errors
    ///
    /// Returns a codec error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(encode(self)?)
    }

    /// Decodes a snapshot produced by [`Topology::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns a codec error if the bytes are malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut topology: Self = decode(bytes)?;
        topology.changes.attach_all(topology.key);
        Ok(topology)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Process-local handle identifying this topology instance.
    pub fn key(&self) -> TopologyKey {
        self.key
    }

    /// Name of the store this topology describes.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Sequence number of the last applied change.
    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    /// Fixed number of partitions.
    pub fn partition_count(&self) -> u32 {
        self.partition_map.n_partitions()
    }

    /// Key → partition map for this store.
    pub fn partition_map(&self) -> PartitionMap {
        self.partition_map
    }

    /// Shard a partition is assigned to.
    pub fn shard_of(&self, partition_id: PartitionId) -> Option<ShardId> {
        self.partitions.get(&partition_id).copied()
    }

    /// Shard owning the partition that encoded key bytes hash into.
    pub fn shard_for_key(&self, key_bytes: &[u8]) -> Option<ShardId> {
        self.shard_of(self.partition_map.partition_id(key_bytes))
    }

    /// Shards in ascending order.
    pub fn shard_ids(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.shards.keys().copied()
    }

    /// Returns `true` if the shard exists.
    pub fn contains_shard(&self, shard_id: ShardId) -> bool {
        self.shards.contains_key(&shard_id)
    }

    /// Member nodes of a shard; empty for an unknown shard.
    pub fn node_ids(&self, shard_id: ShardId) -> impl Iterator<Item = NodeId> + '_ {
        self.shards.get(&shard_id).into_iter().flatten().copied()
    }

    /// Attributes of a node.
    pub fn node(&self, node_id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&node_id)
    }

    /// Partitions assigned to a shard, ascending.
    pub fn partitions_of(&self, shard_id: ShardId) -> impl Iterator<Item = PartitionId> + '_ {
        self.partitions.iter().filter(move |(_, s)| **s == shard_id).map(|(p, _)| *p)
    }

    /// Current component bound to a resource id, attached to this topology.
    pub fn component(&self, id: ResourceId) -> Option<Component> {
        let mut component = match id {
            ResourceId::Partition(p) => Component::partition(p, self.shard_of(p)?),
            ResourceId::Shard(s) if self.contains_shard(s) => Component::shard(s),
            ResourceId::Shard(_) => return None,
            ResourceId::Node(n) => Component::node(n, self.node(n)?.storage_dir.clone()),
        };
        component.attach(self.key);
        Some(component)
    }

    /// Retained change history.
    pub fn change_log(&self) -> &ChangeLog {
        &self.changes
    }

    /// Returns every change after `start`, or [`ChangeInfo::SnapshotRequired`]
    /// if part of that range has been compacted away.
    pub fn get_change_info(&self, start: SequenceNumber) -> ChangeInfo {
        self.changes.changes_since(start, self.sequence_number)
    }

    // ------------------------------------------------------------------
    // Authoritative writer
    // ------------------------------------------------------------------

    /// Creates a new, empty shard.
    ///
    /// # Errors
    ///
    /// Returns an internal-invariant error if the change cannot be recorded.
    pub fn add_shard(&mut self) -> Result<ShardId> {
        let next = self.shards.keys().next_back().map_or(1, |s| s.value() + 1);
        let shard_id = ShardId::new(next);
        self.record(TopologyChange::add(self.next_sequence()?, Component::shard(shard_id))?)?;
        Ok(shard_id)
    }

    /// Adds a node to an existing shard.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the shard does not exist.
    pub fn add_node(&mut self, shard_id: ShardId, storage_dir: Option<String>) -> Result<NodeId> {
        let members = self.shards.get(&shard_id).context(InvalidArgumentSnafu {
            message: format!("cannot add node to unknown shard {shard_id}"),
        })?;
        let next = members.iter().next_back().map_or(1, |n| n.node_num() + 1);
        let node_id = NodeId::new(shard_id, next);
        self.record(TopologyChange::add(self.next_sequence()?, Component::node(node_id, storage_dir))?)?;
        Ok(node_id)
    }

    /// Assigns the lowest unassigned partition to a shard.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the shard does not exist or all
    /// partitions are already assigned.
    pub fn add_partition(&mut self, shard_id: ShardId) -> Result<PartitionId> {
        ensure!(
            self.contains_shard(shard_id),
            InvalidArgumentSnafu { message: format!("cannot assign partition to unknown shard {shard_id}") }
        );
        let partition_id = self
            .partition_map
            .partition_ids()
            .find(|p| !self.partitions.contains_key(p))
            .context(InvalidArgumentSnafu {
                message: format!("all {} partitions are already assigned", self.partition_count()),
            })?;
        self.record(TopologyChange::add(
            self.next_sequence()?,
            Component::partition(partition_id, shard_id),
        )?)?;
        Ok(partition_id)
    }

    /// Migrates a partition to another shard.
    ///
    /// Returns `false` if the partition already lives on `shard_id`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the partition is unassigned or
    /// the shard does not exist.
    pub fn update_partition(&mut self, partition_id: PartitionId, shard_id: ShardId) -> Result<bool> {
        let current = self.shard_of(partition_id).context(InvalidArgumentSnafu {
            message: format!("partition {partition_id} is not assigned"),
        })?;
        ensure!(
            self.contains_shard(shard_id),
            InvalidArgumentSnafu { message: format!("cannot migrate {partition_id} to unknown shard {shard_id}") }
        );
        if current == shard_id {
            return Ok(false);
        }
        self.record(TopologyChange::update(
            self.next_sequence()?,
            Component::partition(partition_id, shard_id),
        )?)?;
        Ok(true)
    }

    /// Replaces a node's attributes.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the node does not exist.
    pub fn update_node(&mut self, node_id: NodeId, storage_dir: Option<String>) -> Result<()> {
        ensure!(
            self.nodes.contains_key(&node_id),
            InvalidArgumentSnafu { message: format!("node {node_id} does not exist") }
        );
        self.record(TopologyChange::update(self.next_sequence()?, Component::node(node_id, storage_dir))?)
    }

    /// Removes a node from its shard.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the node does not exist.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<()> {
        ensure!(
            self.nodes.contains_key(&node_id),
            InvalidArgumentSnafu { message: format!("node {node_id} does not exist") }
        );
        self.record(TopologyChange::remove(self.next_sequence()?, node_id.into()))
    }

    /// Removes an empty shard.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the shard does not exist, still
    /// has nodes, or still owns partitions.
    pub fn remove_shard(&mut self, shard_id: ShardId) -> Result<()> {
        let members = self.shards.get(&shard_id).context(InvalidArgumentSnafu {
            message: format!("shard {shard_id} does not exist"),
        })?;
        ensure!(
            members.is_empty(),
            InvalidArgumentSnafu { message: format!("shard {shard_id} still has {} nodes", members.len()) }
        );
        ensure!(
            self.partitions_of(shard_id).next().is_none(),
            InvalidArgumentSnafu { message: format!("shard {shard_id} still owns partitions") }
        );
        self.record(TopologyChange::remove(self.next_sequence()?, shard_id.into()))
    }

    /// Discards all but the newest `max_retained` changes.
    ///
    /// Returns the number of changes discarded.
    pub fn compact_changes(&mut self, max_retained: usize) -> usize {
        let discarded = self.changes.compact(max_retained);
        if discarded > 0 {
            debug!(
                store = %self.store_name,
                discarded,
                first_retained = ?self.changes.first_sequence(),
                "Compacted topology change log"
            );
        }
        discarded
    }

    // ------------------------------------------------------------------
    // Replica merge
    // ------------------------------------------------------------------

    /// Merges changes from the authoritative writer.
    ///
    /// Changes are applied in ascending sequence order; changes at or below
    /// the current sequence number are skipped. The batch is atomic: on a gap
    /// or an error nothing is applied.
    ///
    /// # Errors
    ///
    /// Returns an internal-invariant error if a change contradicts the local
    /// state, such as adding a resource that already exists.
    pub fn apply(&mut self, changes: &[TopologyChange]) -> Result<ApplyOutcome> {
        let mut ordered: Vec<&TopologyChange> = changes.iter().collect();
        ordered.sort_by_key(|c| c.sequence_number());

        let start = self.sequence_number;
        let mut staged: Option<Self> = None;
        let mut skipped = 0;

        for change in ordered {
            let target = staged.as_ref().unwrap_or(&*self);
            let seq = change.sequence_number();
            if seq <= target.sequence_number {
                debug!(store = %self.store_name, sequence_number = seq, "Skipping applied topology change");
                skipped += 1;
                continue;
            }
            let expected = target.sequence_number + 1;
            if seq != expected {
                warn!(
                    store = %self.store_name,
                    expected,
                    found = seq,
                    "Topology change history has a gap; snapshot required"
                );
                return Ok(ApplyOutcome::SnapshotRequired { expected, found: seq });
            }
            let target = staged.get_or_insert_with(|| self.clone());
            target.record(change.detached())?;
        }

        let Some(staged) = staged else {
            return Ok(ApplyOutcome::Applied { applied: 0, skipped });
        };
        let applied = (staged.sequence_number - start) as usize;
        *self = staged;
        info!(
            store = %self.store_name,
            from = start,
            to = self.sequence_number,
            applied,
            skipped,
            "Applied topology changes"
        );
        Ok(ApplyOutcome::Applied { applied, skipped })
    }

    fn next_sequence(&self) -> Result<SequenceNumber> {
        self.sequence_number.checked_add(1).context(InternalSnafu {
            message: format!("sequence number overflow at {}", self.sequence_number),
        })
    }

    /// Applies one change in order and appends it to the history.
    fn record(&mut self, mut change: TopologyChange) -> Result<()> {
        let seq = change.sequence_number();
        ensure!(
            seq == self.next_sequence()?,
            InternalSnafu {
                message: format!("change {seq} does not follow sequence number {}", self.sequence_number),
            }
        );
        match change.payload() {
            ChangePayload::Add(component) => self.add_component(seq, component)?,
            ChangePayload::Update(component) => self.update_component(seq, component)?,
            ChangePayload::Remove(id) => self.remove_resource(seq, *id)?,
        }
        change.attach(self.key);
        self.changes.append(change)?;
        self.sequence_number = seq;
        self.compact_changes(self.max_retained_changes);
        Ok(())
    }

    fn add_component(&mut self, seq: SequenceNumber, component: &Component) -> Result<()> {
        match (component.resource_id(), component.kind()) {
            (Some(ResourceId::Partition(p)), ComponentKind::Partition { shard_id }) => {
                ensure!(
                    self.partition_map.contains(p),
                    InternalSnafu { message: format!("change {seq}: {p} outside [1, {}]", self.partition_count()) }
                );
                ensure!(
                    !self.partitions.contains_key(&p),
                    InternalSnafu { message: format!("change {seq}: {p} already assigned") }
                );
                self.require_shard(seq, *shard_id)?;
                self.partitions.insert(p, *shard_id);
            },
            (Some(ResourceId::Shard(s)), ComponentKind::Shard) => {
                ensure!(
                    !self.shards.contains_key(&s),
                    InternalSnafu { message: format!("change {seq}: {s} already exists") }
                );
                self.shards.insert(s, BTreeSet::new());
            },
            (Some(ResourceId::Node(n)), ComponentKind::Node { storage_dir }) => {
                ensure!(
                    !self.nodes.contains_key(&n),
                    InternalSnafu { message: format!("change {seq}: {n} already exists") }
                );
                self.require_shard(seq, n.shard_id())?;
                self.shards.entry(n.shard_id()).or_default().insert(n);
                self.nodes.insert(n, NodeRecord { storage_dir: storage_dir.clone() });
            },
            (id, kind) => {
                return InternalSnafu {
                    message: format!("change {seq}: component {kind:?} does not match {id:?}"),
                }
                .fail();
            },
        }
        Ok(())
    }

    fn update_component(&mut self, seq: SequenceNumber, component: &Component) -> Result<()> {
        match (component.resource_id(), component.kind()) {
            (Some(ResourceId::Partition(p)), ComponentKind::Partition { shard_id }) => {
                self.require_shard(seq, *shard_id)?;
                let slot = self.partitions.get_mut(&p).context(InternalSnafu {
                    message: format!("change {seq}: update of unassigned {p}"),
                })?;
                *slot = *shard_id;
            },
            (Some(ResourceId::Node(n)), ComponentKind::Node { storage_dir }) => {
                let record = self.nodes.get_mut(&n).context(InternalSnafu {
                    message: format!("change {seq}: update of unknown {n}"),
                })?;
                record.storage_dir = storage_dir.clone();
            },
            (id, kind) => {
                return InternalSnafu {
                    message: format!("change {seq}: cannot update {id:?} with {kind:?}"),
                }
                .fail();
            },
        }
        Ok(())
    }

    fn remove_resource(&mut self, seq: SequenceNumber, id: ResourceId) -> Result<()> {
        let removed = match id {
            ResourceId::Partition(p) => self.partitions.remove(&p).is_some(),
            ResourceId::Shard(s) => {
                ensure!(
                    self.node_ids(s).next().is_none(),
                    InternalSnafu { message: format!("change {seq}: {s} removed while it has nodes") }
                );
                ensure!(
                    self.partitions_of(s).next().is_none(),
                    InternalSnafu { message: format!("change {seq}: {s} removed while it owns partitions") }
                );
                self.shards.remove(&s).is_some()
            },
            ResourceId::Node(n) => {
                if let Some(members) = self.shards.get_mut(&n.shard_id()) {
                    members.remove(&n);
                }
                self.nodes.remove(&n).is_some()
            },
        };
        ensure!(removed, InternalSnafu { message: format!("change {seq}: removal of unknown {id}") });
        Ok(())
    }

    fn require_shard(&self, seq: SequenceNumber, shard_id: ShardId) -> Result<()> {
        ensure!(
            self.contains_shard(shard_id),
            InternalSnafu { message: format!("change {seq}: unknown {shard_id}") }
        );
        Ok(())
    }
}

/// Topologies compare by content; the instance key and history are ignored.
impl PartialEq for Topology {
    fn eq(&self, other: &Self) -> bool {
        self.store_name == other.store_name
            && self.partition_map == other.partition_map
            && self.sequence_number == other.sequence_number
            && self.partitions == other.partitions
            && self.shards == other.shards
            && self.nodes == other.nodes
    }
}

impl Eq for Topology {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use shardmeta_types::ErrorCode;

    use super::*;

    fn empty(n: u32) -> Topology {
        Topology::new("orders", PartitionMap::new(n).unwrap())
    }

    /// Two shards with two nodes each; partitions alternate between them.
    fn populated() -> Topology {
        let mut t = empty(4);
        let s1 = t.add_shard().unwrap();
        let s2 = t.add_shard().unwrap();
        for shard in [s1, s2] {
            t.add_node(shard, None).unwrap();
            t.add_node(shard, Some(format!("/data/{}", shard.value()))).unwrap();
        }
        for shard in [s1, s2, s1, s2] {
            t.add_partition(shard).unwrap();
        }
        t
    }

    fn history(t: &Topology) -> Vec<TopologyChange> {
        t.get_change_info(0).changes().unwrap().to_vec()
    }

    #[test]
    fn test_empty_topology_at_zero() {
        let t = empty(8);
        assert_eq!(t.sequence_number(), 0);
        assert_eq!(t.partition_count(), 8);
        assert_eq!(t.shard_ids().count(), 0);
        assert_eq!(t.get_change_info(0), ChangeInfo::Changes(Vec::new()));
    }

    #[test]
    fn test_writer_assigns_ids_and_sequences() {
        let t = populated();
        assert_eq!(t.sequence_number(), 10);
        assert_eq!(t.shard_ids().collect::<Vec<_>>(), vec![ShardId::new(1), ShardId::new(2)]);
        let nodes: Vec<_> = t.node_ids(ShardId::new(2)).collect();
        assert_eq!(nodes, vec![NodeId::new(ShardId::new(2), 1), NodeId::new(ShardId::new(2), 2)]);
        assert_eq!(t.shard_of(PartitionId::new(3)), Some(ShardId::new(1)));
        assert_eq!(t.shard_of(PartitionId::new(4)), Some(ShardId::new(2)));
        assert_eq!(
            t.node(NodeId::new(ShardId::new(1), 2)).unwrap().storage_dir.as_deref(),
            Some("/data/1")
        );
    }

    #[test]
    fn test_add_node_to_unknown_shard_rejected() {
        let mut t = empty(4);
        let err = t.add_node(ShardId::new(9), None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(t.sequence_number(), 0);
    }

    #[test]
    fn test_add_partition_exhausts_range() {
        let mut t = empty(2);
        let s = t.add_shard().unwrap();
        t.add_partition(s).unwrap();
        t.add_partition(s).unwrap();
        let err = t.add_partition(s).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_update_partition_migrates() {
        let mut t = populated();
        assert!(t.update_partition(PartitionId::new(1), ShardId::new(2)).unwrap());
        assert_eq!(t.shard_of(PartitionId::new(1)), Some(ShardId::new(2)));
        assert!(!t.update_partition(PartitionId::new(1), ShardId::new(2)).unwrap());
        assert_eq!(t.sequence_number(), 11);
    }

    #[test]
    fn test_remove_shard_requires_empty() {
        let mut t = empty(4);
        let s = t.add_shard().unwrap();
        let n = t.add_node(s, None).unwrap();
        assert_eq!(t.remove_shard(s).unwrap_err().code(), ErrorCode::InvalidArgument);
        t.remove_node(n).unwrap();
        t.remove_shard(s).unwrap();
        assert!(!t.contains_shard(s));
    }

    #[test]
    fn test_shard_for_key_follows_partition_map() {
        let t = populated();
        let key = b"tenant\x007";
        let partition = t.partition_map().partition_id(key);
        assert_eq!(t.shard_for_key(key), t.shard_of(partition));
        assert!(t.shard_for_key(key).is_some());
    }

    #[test]
    fn test_component_is_attached() {
        let t = populated();
        let component = t.component(ShardId::new(1).into()).unwrap();
        assert_eq!(component.owner(), Some(t.key()));
        assert!(t.component(ShardId::new(7).into()).is_none());
    }

    #[test]
    fn test_change_info_is_detached_and_ascending() {
        let t = populated();
        let info = t.get_change_info(6);
        let changes = info.changes().unwrap();
        let seqs: Vec<_> = changes.iter().map(TopologyChange::sequence_number).collect();
        assert_eq!(seqs, vec![7, 8, 9, 10]);
        assert!(changes.iter().all(|c| c.component().unwrap().owner().is_none()));
    }

    #[test]
    fn test_apply_skips_already_applied() {
        let source = populated();
        let all = history(&source);
        let mut replica = Topology::replay("orders", source.partition_map(), &all[..6]).unwrap();
        assert_eq!(replica.sequence_number(), 6);

        // changes 5, 6, 7 against a topology at 6: only 7 applies
        let outcome = replica.apply(&all[4..7]).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied { applied: 1, skipped: 2 });
        assert_eq!(replica.sequence_number(), 7);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let source = populated();
        let all = history(&source);
        let mut replica = empty(4);
        replica.apply(&all).unwrap();
        let outcome = replica.apply(&all).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied { applied: 0, skipped: 10 });
        assert_eq!(replica, source);
    }

    #[test]
    fn test_apply_sorts_batch() {
        let source = populated();
        let mut shuffled = history(&source);
        shuffled.reverse();
        let mut replica = empty(4);
        assert_eq!(replica.apply(&shuffled).unwrap().applied(), 10);
        assert_eq!(replica, source);
    }

    #[test]
    fn test_apply_gap_commits_nothing() {
        let source = populated();
        let all = history(&source);
        let mut replica = empty(4);
        let batch = vec![all[0].clone(), all[2].clone()];
        let outcome = replica.apply(&batch).unwrap();
        assert_eq!(outcome, ApplyOutcome::SnapshotRequired { expected: 2, found: 3 });
        assert_eq!(replica.sequence_number(), 0);
        assert_eq!(replica.shard_ids().count(), 0);
    }

    #[test]
    fn test_apply_conflict_is_internal_and_atomic() {
        let mut replica = empty(4);
        let batch = vec![
            TopologyChange::add(1, Component::shard(ShardId::new(1))).unwrap(),
            TopologyChange::add(2, Component::shard(ShardId::new(1))).unwrap(),
        ];
        let err = replica.apply(&batch).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(replica.sequence_number(), 0);
        assert!(!replica.contains_shard(ShardId::new(1)));
    }

    #[test]
    fn test_apply_rejects_removing_shard_that_owns_partitions() {
        let mut replica = empty(4);
        let batch = vec![
            TopologyChange::add(1, Component::shard(ShardId::new(1))).unwrap(),
            TopologyChange::add(2, Component::partition(PartitionId::new(3), ShardId::new(1))).unwrap(),
        ];
        replica.apply(&batch).unwrap();

        let err = replica.apply(&[TopologyChange::remove(3, ShardId::new(1).into())]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(replica.sequence_number(), 2);
        assert!(replica.contains_shard(ShardId::new(1)));
        assert_eq!(replica.shard_of(PartitionId::new(3)), Some(ShardId::new(1)));
    }

    #[test]
    fn test_replay_reconstructs_every_prefix() {
        let mut source = populated();
        source.update_partition(PartitionId::new(2), ShardId::new(1)).unwrap();
        source.remove_node(NodeId::new(ShardId::new(2), 1)).unwrap();
        let all = history(&source);

        let mut expected = empty(4);
        for (i, change) in all.iter().enumerate() {
            expected.apply(std::slice::from_ref(change)).unwrap();
            let rebuilt = Topology::replay("orders", source.partition_map(), &all[..=i]).unwrap();
            assert_eq!(rebuilt, expected, "prefix ending at change {}", i + 1);
        }
        assert_eq!(expected, source);
    }

    #[test]
    fn test_replay_rejects_gap() {
        let all = history(&populated());
        let err = Topology::replay("orders", PartitionMap::new(4).unwrap(), &all[1..]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_compaction_forces_snapshot() {
        let config = ChangeLogConfig::builder().max_retained_changes(3).build().unwrap();
        let mut t = empty(4).with_change_log_config(&config);
        let s = t.add_shard().unwrap();
        for _ in 0..4 {
            t.add_node(s, None).unwrap();
        }
        assert_eq!(t.change_log().len(), 3);
        assert_eq!(t.change_log().first_sequence(), Some(3));
        assert!(t.get_change_info(1).is_snapshot_required());
        assert_eq!(t.get_change_info(2).changes().unwrap().len(), 3);
    }

    #[test]
    fn test_copy_gets_fresh_key() {
        let t = populated();
        let clone = t.clone();
        let copy = t.copy();
        assert_eq!(clone.key(), t.key());
        assert_ne!(copy.key(), t.key());
        assert_eq!(copy, t);
        let last = copy.change_log().iter().last().unwrap();
        assert_eq!(last.component().unwrap().owner(), Some(copy.key()));
    }

    #[test]
    fn test_snapshot_bytes_roundtrip() {
        let t = populated();
        let restored = Topology::from_bytes(&t.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, t);
        assert_ne!(restored.key(), t.key());
        assert_eq!(restored.get_change_info(8).changes().unwrap().len(), 2);
    }
}
