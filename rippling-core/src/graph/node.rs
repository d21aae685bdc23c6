//! Graph Nodes
//!
//! The per-store state of one atom. A node is created the first time a store
//! touches its atom and is owned exclusively by that store.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::atom::{AnyValue, AtomId, AtomInner, AtomKind, Cleanup};

/// A node in the dependency graph.
pub(crate) struct Node {
    /// The atom this node holds state for.
    atom: Arc<AtomInner>,

    /// Cached value. `None` until first computed, and again after a failed run.
    value: Option<AnyValue>,

    /// Bumped on every successful (re)computation or effective write.
    epoch: u64,

    /// Atoms read during the latest run, with the epoch each had when read.
    dependencies: IndexMap<AtomId, u64>,

    /// Atoms whose latest run read this one. Transpose of `dependencies`.
    dependents: IndexSet<AtomId>,

    /// Effects subscribed to this atom.
    listeners: IndexSet<AtomId>,

    /// Mounted dependents plus external subscriptions.
    subscribers: usize,

    /// Stale while mounted; also the visited marker of dirty propagation.
    dirty: bool,

    /// Store write version at which an unmounted read last validated this node.
    validated_at: Option<u64>,

    /// Teardown returned by the latest effect run.
    cleanup: Option<Cleanup>,
}

impl Node {
    pub(crate) fn new(atom: Arc<AtomInner>) -> Self {
        Self {
            atom,
            value: None,
            epoch: 0,
            dependencies: IndexMap::new(),
            dependents: IndexSet::new(),
            listeners: IndexSet::new(),
            subscribers: 0,
            dirty: false,
            validated_at: None,
            cleanup: None,
        }
    }

    pub(crate) fn id(&self) -> AtomId {
        self.atom.id()
    }

    pub(crate) fn kind(&self) -> AtomKind {
        self.atom.kind()
    }

    pub(crate) fn atom(&self) -> &Arc<AtomInner> {
        &self.atom
    }

    pub(crate) fn value(&self) -> Option<&AnyValue> {
        self.value.as_ref()
    }

    /// Store a fresh value and bump the epoch.
    pub(crate) fn set_value(&mut self, value: AnyValue) {
        self.value = Some(value);
        self.epoch += 1;
    }

    /// Drop the cached value, leaving the node uninitialized.
    pub(crate) fn clear_value(&mut self) {
        self.value = None;
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Record a completed effect run.
    pub(crate) fn bump_epoch(&mut self) {
        self.epoch += 1;
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the node dirty. Returns `true` if it was clean.
    pub(crate) fn mark_dirty(&mut self) -> bool {
        !std::mem::replace(&mut self.dirty, true)
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn is_validated_at(&self, version: u64) -> bool {
        self.validated_at == Some(version)
    }

    pub(crate) fn mark_validated(&mut self, version: u64) {
        self.validated_at = Some(version);
    }

    pub(crate) fn dependencies(&self) -> &IndexMap<AtomId, u64> {
        &self.dependencies
    }

    /// Swap in a new read-set, returning the previous one.
    pub(crate) fn replace_dependencies(
        &mut self,
        dependencies: IndexMap<AtomId, u64>,
    ) -> IndexMap<AtomId, u64> {
        std::mem::replace(&mut self.dependencies, dependencies)
    }

    pub(crate) fn dependents(&self) -> &IndexSet<AtomId> {
        &self.dependents
    }

    pub(crate) fn add_dependent(&mut self, id: AtomId) {
        self.dependents.insert(id);
    }

    pub(crate) fn remove_dependent(&mut self, id: AtomId) {
        self.dependents.shift_remove(&id);
    }

    pub(crate) fn listeners(&self) -> &IndexSet<AtomId> {
        &self.listeners
    }

    pub(crate) fn add_listener(&mut self, effect: AtomId) -> bool {
        self.listeners.insert(effect)
    }

    pub(crate) fn remove_listener(&mut self, effect: AtomId) -> bool {
        self.listeners.shift_remove(&effect)
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.subscribers > 0
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers
    }

    /// Add one reference. Returns `true` if the node just became mounted.
    pub(crate) fn retain(&mut self) -> bool {
        self.subscribers += 1;
        self.subscribers == 1
    }

    /// Drop one reference. Returns `true` if the node just became unmounted.
    pub(crate) fn release(&mut self) -> bool {
        if self.subscribers == 0 {
            return false;
        }
        self.subscribers -= 1;
        self.subscribers == 0
    }

    pub(crate) fn take_cleanup(&mut self) -> Option<Cleanup> {
        self.cleanup.take()
    }

    pub(crate) fn set_cleanup(&mut self, cleanup: Option<Cleanup>) {
        self.cleanup = cleanup;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("atom", &self.atom.describe())
            .field("epoch", &self.epoch)
            .field("has_value", &self.value.is_some())
            .field("dirty", &self.dirty)
            .field("subscribers", &self.subscribers)
            .field("dependencies", &self.dependencies.len())
            .field("dependents", &self.dependents.len())
            .finish()
    }
}
