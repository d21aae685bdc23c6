//! Mount Manager
//!
//! An atom is mounted while it is reachable from at least one subscription.
//! Mounting is reference counted: each subscription targeting a node and
//! each mounted dependent reading it holds one reference. The first
//! reference mounts the node and, through it, its dependencies; releasing
//! the last one unmounts it, collects its effect cleanup, and releases its
//! dependencies in turn.
//!
//! Mount transitions never recompute anything. Cleanups are only collected
//! here; the store runs them once it has released the graph, so a cleanup
//! may call back into the store.

use std::collections::HashSet;

use smallvec::{smallvec, SmallVec};

use super::Graph;
use crate::atom::{AtomId, AtomKind, Cleanup};

/// Mount transitions produced by one graph operation.
#[derive(Default)]
pub(crate) struct MountChanges {
    pub(crate) mounted: Vec<AtomId>,
    pub(crate) unmounted: Vec<AtomId>,
    pub(crate) cleanups: Vec<(AtomId, Cleanup)>,
}

impl MountChanges {
    pub(crate) fn is_empty(&self) -> bool {
        self.mounted.is_empty() && self.unmounted.is_empty() && self.cleanups.is_empty()
    }
}

impl std::fmt::Debug for MountChanges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountChanges")
            .field("mounted", &self.mounted)
            .field("unmounted", &self.unmounted)
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

impl Graph {
    /// Add one reference to `id`, mounting its dependency chain if it was
    /// unmounted.
    ///
    /// Nodes that come out of the unmounted state holding an outdated value
    /// are marked dirty, along with everything mounted downstream of them.
    pub(crate) fn mount(&mut self, id: AtomId, changes: &mut MountChanges) {
        let mut stack: SmallVec<[AtomId; 16]> = smallvec![id];
        let mut stale: SmallVec<[AtomId; 4]> = SmallVec::new();
        while let Some(id) = stack.pop() {
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            if node.retain() {
                changes.mounted.push(id);
                stack.extend(node.dependencies().keys().copied());
                if self.is_stale(id) {
                    stale.push(id);
                }
            }
        }

        for id in stale {
            if let Some(node) = self.node_mut(id) {
                node.mark_dirty();
            }
            self.propagate(id);
        }
    }

    /// Whether the cached value of a computed may predate a change of its
    /// inputs.
    ///
    /// Writes do not reach unmounted nodes, so a computed read while
    /// unmounted can fall behind before it is mounted. This compares the
    /// epochs recorded by its last run with the current ones, transitively.
    fn is_stale(&self, id: AtomId) -> bool {
        let mut visited = HashSet::new();
        self.is_outdated(id, &mut visited)
    }

    fn is_outdated(&self, id: AtomId, visited: &mut HashSet<AtomId>) -> bool {
        if !visited.insert(id) {
            return false;
        }
        let Some(node) = self.node(id) else {
            return false;
        };
        if node.kind() != AtomKind::Computed || node.value().is_none() {
            return false;
        }
        if node.is_dirty() {
            return true;
        }
        if node.is_validated_at(self.version()) {
            return false;
        }
        node.dependencies().iter().any(|(dep, seen)| {
            self.node(*dep).map_or(true, |dep| dep.epoch() != *seen)
                || self.is_outdated(*dep, visited)
        })
    }

    /// Drop one reference to `id`, unmounting it and releasing its
    /// dependencies once nothing references it.
    pub(crate) fn unmount(&mut self, id: AtomId, changes: &mut MountChanges) {
        let mut stack: SmallVec<[AtomId; 16]> = smallvec![id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            if node.release() {
                changes.unmounted.push(id);
                if let Some(cleanup) = node.take_cleanup() {
                    changes.cleanups.push((id, cleanup));
                }
                stack.extend(node.dependencies().keys().copied());
            }
        }
    }
}
