//! Shared, copy-on-write topology handle.
//!
//! Readers take a lock-free snapshot with [`TopologyHandle::load`]. Writers
//! clone the current topology, mutate the clone, and publish it with one
//! atomic swap, so no reader ever observes a partially-applied batch.
//! Writers are serialized by a mutex scoped to the handle; readers never
//! touch it.

use std::{fmt, sync::Arc};

use arc_swap::{ArcSwap, Guard};
use parking_lot::{Mutex, RwLock};
use shardmeta_types::{Result, SequenceNumber, error::InvalidArgumentSnafu};
use snafu::ensure;
use tracing::{debug, info};

use crate::{
    change::{ChangeInfo, TopologyChange},
    topology::{ApplyOutcome, Topology},
};

/// Receives every topology published through a [`TopologyHandle`].
///
/// Called on the writer's thread after the new topology is visible to
/// readers. Implementations must not block.
pub trait TopologyListener: Send + Sync {
    /// Called with the newly published topology.
    fn topology_updated(&self, topology: &Topology);
}

struct Inner {
    current: ArcSwap<Topology>,
    writer: Mutex<()>,
    listeners: RwLock<Vec<Arc<dyn TopologyListener>>>,
}

/// Thread-safe handle to the current topology.
///
/// Cloning is cheap; all clones share the same topology and listeners.
#[derive(Clone)]
pub struct TopologyHandle {
    inner: Arc<Inner>,
}

impl TopologyHandle {
    /// Creates a handle publishing `topology`.
    #[must_use]
    pub fn new(topology: Topology) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: ArcSwap::from_pointee(topology),
                writer: Mutex::new(()),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Loads the current topology without locking.
    #[must_use]
    pub fn load(&self) -> Guard<Arc<Topology>> {
        self.inner.current.load()
    }

    /// Returns an owned reference to the current topology.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Topology> {
        self.inner.current.load_full()
    }

    /// Sequence number of the current topology.
    pub fn sequence_number(&self) -> SequenceNumber {
        self.inner.current.load().sequence_number()
    }

    /// Changes after `start` in the current topology.
    pub fn get_change_info(&self, start: SequenceNumber) -> ChangeInfo {
        self.inner.current.load().get_change_info(start)
    }

    /// Merges changes and publishes the result if anything was applied.
    ///
    /// # Errors
    ///
    /// Propagates [`Topology::apply`] errors; the published topology is
    /// unchanged on error.
    pub fn apply(&self, changes: &[TopologyChange]) -> Result<ApplyOutcome> {
        let _writer = self.inner.writer.lock();
        let mut next = Topology::clone(&self.inner.current.load());
        let outcome = next.apply(changes)?;
        if outcome.applied() > 0 {
            self.publish(next);
        }
        Ok(outcome)
    }

    /// Runs an authoritative mutation against a copy and publishes it.
    ///
    /// Nothing is published if `f` fails or records no change.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn update<T>(&self, f: impl FnOnce(&mut Topology) -> Result<T>) -> Result<T> {
        let _writer = self.inner.writer.lock();
        let mut next = Topology::clone(&self.inner.current.load());
        let before = next.sequence_number();
        let value = f(&mut next)?;
        if next.sequence_number() != before {
            self.publish(next);
        }
        Ok(value)
    }

    /// Installs a full snapshot received from another participant.
    ///
    /// Returns `false` if the snapshot is not newer than the current topology.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the snapshot describes a
    /// different store or a different partition count.
    pub fn replace(&self, snapshot: Topology) -> Result<bool> {
        let _writer = self.inner.writer.lock();
        let current = self.inner.current.load();
        ensure!(
            snapshot.store_name() == current.store_name()
                && snapshot.partition_count() == current.partition_count(),
            InvalidArgumentSnafu {
                message: format!(
                    "snapshot of {} with {} partitions cannot replace {} with {} partitions",
                    snapshot.store_name(),
                    snapshot.partition_count(),
                    current.store_name(),
                    current.partition_count()
                ),
            }
        );
        if snapshot.sequence_number() <= current.sequence_number() {
            debug!(
                store = snapshot.store_name(),
                current = current.sequence_number(),
                offered = snapshot.sequence_number(),
                "Ignoring stale topology snapshot"
            );
            return Ok(false);
        }
        info!(
            store = snapshot.store_name(),
            from = current.sequence_number(),
            to = snapshot.sequence_number(),
            "Installing topology snapshot"
        );
        drop(current);
        self.publish(snapshot);
        Ok(true)
    }

    /// Registers a listener and immediately calls it with the current topology.
    pub fn add_listener(&self, listener: Arc<dyn TopologyListener>) {
        let _writer = self.inner.writer.lock();
        listener.topology_updated(&self.inner.current.load());
        self.inner.listeners.write().push(listener);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Swaps in `topology` and notifies listeners. Caller holds the writer lock.
    fn publish(&self, topology: Topology) {
        let topology = Arc::new(topology);
        self.inner.current.store(Arc::clone(&topology));
        let listeners = self.inner.listeners.read().clone();
        for listener in listeners {
            listener.topology_updated(&topology);
        }
    }
}

impl fmt::Debug for TopologyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.inner.current.load();
        f.debug_struct("TopologyHandle")
            .field("store", &current.store_name())
            .field("sequence_number", &current.sequence_number())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
