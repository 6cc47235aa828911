//! Topology changes and the sequence-numbered change history.
//!
//! The control-plane leader is the only writer of a topology. Every change
//! it makes is recorded as a [`TopologyChange`] with the next gapless
//! sequence number. Other participants catch up by fetching the changes
//! after their own sequence number and applying them; replaying a full
//! history reconstructs any snapshot.
//!
//! ## Wire Format
//!
//! A change crosses the wire as
//! `{ sequence_number: u32, kind: Add|Update|Remove, resource_id, component: Option<ComponentKind> }`.
//! This layout must stay stable across versions for rolling upgrades. The
//! owning-topology handle of a component is never encoded.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use shardmeta_types::{
    MetadataError, ResourceId, Result, SequenceNumber,
    error::{InternalSnafu, InvalidArgumentSnafu},
};
use snafu::ensure;

use crate::component::{Component, ComponentKind, TopologyKey};

/// Type tag of a topology change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A component was added.
    Add,
    /// The component bound to a resource id was replaced.
    Update,
    /// A resource was removed.
    Remove,
}

/// Payload of a topology change, one variant per [`ChangeKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangePayload {
    /// Component added.
    Add(Component),
    /// Replacement component.
    Update(Component),
    /// Resource removed.
    Remove(ResourceId),
}

/// One structural change to a topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireChange", try_from = "WireChange")]
pub struct TopologyChange {
    sequence_number: SequenceNumber,
    resource_id: ResourceId,
    payload: ChangePayload,
}

impl TopologyChange {
    /// Creates an `Add` change.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the component has no resource id
    /// or its id does not match its kind.
    pub fn add(sequence_number: SequenceNumber, component: Component) -> Result<Self> {
        let resource_id = checked_resource_id(&component, ChangeKind::Add)?;
        Ok(Self { sequence_number, resource_id, payload: ChangePayload::Add(component) })
    }

    /// Creates an `Update` change.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the component has no resource id,
    /// its id does not match its kind, or it is a shard. Shards have no
    /// mutable attributes.
    pub fn update(sequence_number: SequenceNumber, component: Component) -> Result<Self> {
        let resource_id = checked_resource_id(&component, ChangeKind::Update)?;
        ensure!(
            !matches!(resource_id, ResourceId::Shard(_)),
            InvalidArgumentSnafu { message: format!("Update cannot target shard {resource_id}") }
        );
        Ok(Self { sequence_number, resource_id, payload: ChangePayload::Update(component) })
    }

    /// Creates a `Remove` change.
    pub fn remove(sequence_number: SequenceNumber, resource_id: ResourceId) -> Self {
        Self { sequence_number, resource_id, payload: ChangePayload::Remove(resource_id) }
    }

    /// Type tag.
    pub fn kind(&self) -> ChangeKind {
        match self.payload {
            ChangePayload::Add(_) => ChangeKind::Add,
            ChangePayload::Update(_) => ChangeKind::Update,
            ChangePayload::Remove(_) => ChangeKind::Remove,
        }
    }

    /// Sequence number.
    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    /// Resource the change targets.
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Affected component; `None` for `Remove`.
    pub fn component(&self) -> Option<&Component> {
        match &self.payload {
            ChangePayload::Add(c) | ChangePayload::Update(c) => Some(c),
            ChangePayload::Remove(_) => None,
        }
    }

    /// Payload for dispatch by tag.
    pub fn payload(&self) -> &ChangePayload {
        &self.payload
    }

    /// Returns a copy whose component is detached from any topology.
    #[must_use]
    pub fn detached(&self) -> Self {
        let payload = match &self.payload {
            ChangePayload::Add(c) => ChangePayload::Add(c.detached()),
            ChangePayload::Update(c) => ChangePayload::Update(c.detached()),
            ChangePayload::Remove(id) => ChangePayload::Remove(*id),
        };
        Self { payload, ..*self }
    }

    pub(crate) fn attach(&mut self, owner: TopologyKey) {
        if let ChangePayload::Add(c) | ChangePayload::Update(c) = &mut self.payload {
            c.attach(owner);
        }
    }
}

fn checked_resource_id(component: &Component, kind: ChangeKind) -> Result<ResourceId> {
    let Some(id) = component.resource_id() else {
        return InvalidArgumentSnafu {
            message: format!("{kind:?} change requires a component with a resource id"),
        }
        .fail();
    };
    ensure!(
        component.kind().matches(id),
        InvalidArgumentSnafu {
            message: format!("{kind:?} change: resource id {id} does not match {:?}", component.kind()),
        }
    );
    Ok(id)
}

/// Stable wire layout of a [`TopologyChange`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireChange {
    sequence_number: SequenceNumber,
    kind: ChangeKind,
    resource_id: ResourceId,
    component: Option<ComponentKind>,
}

impl From<TopologyChange> for WireChange {
    fn from(change: TopologyChange) -> Self {
        let kind = change.kind();
        let component = match change.payload {
            ChangePayload::Add(c) | ChangePayload::Update(c) => Some(c.kind().clone()),
            ChangePayload::Remove(_) => None,
        };
        Self { sequence_number: change.sequence_number, kind, resource_id: change.resource_id, component }
    }
}

impl TryFrom<WireChange> for TopologyChange {
    type Error = MetadataError;

    fn try_from(wire: WireChange) -> Result<Self> {
        let component = wire.component.map(|kind| Component::new(kind).with_id(wire.resource_id));
        match (wire.kind, component) {
            (ChangeKind::Add, Some(c)) => Self::add(wire.sequence_number, c),
            (ChangeKind::Update, Some(c)) => Self::update(wire.sequence_number, c),
            (ChangeKind::Remove, None) => Ok(Self::remove(wire.sequence_number, wire.resource_id)),
            (kind, component) => InvalidArgumentSnafu {
                message: format!(
                    "{kind:?} change {} with component present = {}",
                    wire.sequence_number,
                    component.is_some()
                ),
            }
            .fail(),
        }
    }
}

/// Result of asking a topology for the changes after a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeInfo {
    /// Every change after the requested sequence number, ascending.
    Changes(Vec<TopologyChange>),
    /// The range is no longer retained; transfer a full snapshot instead.
    SnapshotRequired,
}

impl ChangeInfo {
    /// Returns the changes, or `None` if a snapshot is required.
    pub fn changes(&self) -> Option<&[TopologyChange]> {
        match self {
            Self::Changes(changes) => Some(changes),
            Self::SnapshotRequired => None,
        }
    }

    /// Returns `true` if the caller must fall back to a full snapshot.
    pub fn is_snapshot_required(&self) -> bool {
        matches!(self, Self::SnapshotRequired)
    }
}

/// Ordered, gapless history of topology changes.
///
/// Older entries may be discarded by [`ChangeLog::compact`]; the remaining
/// entries always form a contiguous suffix of the full history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    changes: VecDeque<TopologyChange>,
}

impl ChangeLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if no change is retained.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Sequence number of the oldest retained change.
    pub fn first_sequence(&self) -> Option<SequenceNumber> {
        self.changes.front().map(TopologyChange::sequence_number)
    }

    /// Sequence number of the newest retained change.
    pub fn last_sequence(&self) -> Option<SequenceNumber> {
        self.changes.back().map(TopologyChange::sequence_number)
    }

    /// Iterates retained changes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &TopologyChange> {
        self.changes.iter()
    }

    /// Appends the next change.
    ///
    /// # Errors
    ///
    /// Returns an internal-invariant error if `change` does not directly
    /// follow the last retained change.
    pub(crate) fn append(&mut self, change: TopologyChange) -> Result<()> {
        if let Some(last) = self.last_sequence() {
            ensure!(
                change.sequence_number() == last.wrapping_add(1),
                InternalSnafu {
                    message: format!(
                        "change {} does not follow last change {last}",
                        change.sequence_number()
                    ),
                }
            );
        }
        self.changes.push_back(change);
        Ok(())
    }

    /// Discards the oldest changes until at most `max_retained` remain.
    ///
    /// Returns the number of changes discarded.
    pub fn compact(&mut self, max_retained: usize) -> usize {
        let excess = self.changes.len().saturating_sub(max_retained);
        self.changes.drain(..excess);
        excess
    }

    /// Returns every change with a sequence number greater than `start`.
    ///
    /// `current` is the owning topology's sequence number. Returned changes
    /// are detached from the topology.
    pub fn changes_since(&self, start: SequenceNumber, current: SequenceNumber) -> ChangeInfo {
        if start >= current {
            return ChangeInfo::Changes(Vec::new());
        }
        match self.first_sequence() {
            Some(first) if first <= start + 1 => ChangeInfo::Changes(
                self.changes
                    .iter()
                    .filter(|c| c.sequence_number() > start)
                    .map(TopologyChange::detached)
                    .collect(),
            ),
            _ => ChangeInfo::SnapshotRequired,
        }
    }

    pub(crate) fn attach_all(&mut self, owner: TopologyKey) {
        for change in &mut self.changes {
            change.attach(owner);
        }
    }
}
