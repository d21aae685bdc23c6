//! Dependency Graph
//!
//! This module holds the per-store graph state and the algorithms that do not
//! call back into user code: edge maintenance, dirty propagation, mounting
//! and the pending-effect queue.
//!
//! # Overview
//!
//! The graph is a DAG keyed by [`AtomId`]:
//!
//! - Nodes hold the state of one atom (value, epoch, dirty flag, mount count).
//! - Edges point from a reader to what it read (`dependencies`), with the
//!   transpose kept on the other side (`dependents`). Both directions are
//!   only ever updated together, in [`Graph::commit_dependencies`].
//!
//! When a value changes, [`Graph::invalidate`] walks `dependents` forward,
//! marking mounted nodes dirty and queuing the effects it reaches. Unmounted
//! nodes are skipped; they validate themselves by epoch when next read.

mod mount;
mod node;
mod scheduler;
mod tracking;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::atom::{AtomId, AtomInner, AtomKind};

pub(crate) use mount::MountChanges;
pub(crate) use node::Node;
pub(crate) use scheduler::Scheduler;
pub(crate) use tracking::TrackingStack;

/// Edges added and removed by one dependency commit.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct EdgeDiff {
    pub(crate) added: Vec<AtomId>,
    pub(crate) removed: Vec<AtomId>,
}

/// All state a store owns.
#[derive(Debug)]
pub(crate) struct Graph {
    nodes: HashMap<AtomId, Node>,
    pub(crate) tracking: TrackingStack,
    pub(crate) scheduler: Scheduler,
    /// Bumped on every effective write.
    version: u64,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            tracking: TrackingStack::new(),
            scheduler: Scheduler::new(),
            version: 0,
        }
    }

    pub(crate) fn node(&self, id: AtomId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: AtomId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Get the node for `atom`, allocating it on first touch.
    pub(crate) fn ensure(&mut self, atom: &Arc<AtomInner>) -> &mut Node {
        self.nodes
            .entry(atom.id())
            .or_insert_with(|| Node::new(Arc::clone(atom)))
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    /// Give up on a flush, dropping `batch` and everything still pending.
    ///
    /// Dropped effects are marked clean, so the next write that reaches them
    /// queues them like any other. Returns the number dropped.
    pub(crate) fn abandon_flush(&mut self, batch: Vec<AtomId>) -> usize {
        let mut dropped = batch;
        dropped.extend(self.scheduler.abandon());
        for id in &dropped {
            if let Some(node) = self.nodes.get_mut(id) {
                node.mark_clean();
            }
        }
        dropped.len()
    }

    /// Drop every node, returning them for teardown.
    pub(crate) fn drain_nodes(&mut self) -> Vec<Node> {
        self.scheduler.abandon();
        self.nodes.drain().map(|(_, node)| node).collect()
    }

    /// Replace the read-set of `id`, keeping `dependents` the exact transpose.
    ///
    /// If `id` is mounted, newly read atoms are mounted and atoms no longer
    /// read are released, with the resulting transitions added to `changes`.
    pub(crate) fn commit_dependencies(
        &mut self,
        id: AtomId,
        reads: IndexMap<AtomId, u64>,
        changes: &mut MountChanges,
    ) -> EdgeDiff {
        let Some(node) = self.nodes.get_mut(&id) else {
            return EdgeDiff::default();
        };
        let previous = node.replace_dependencies(reads);
        let mounted = node.is_mounted();

        let diff = EdgeDiff {
            added: node
                .dependencies()
                .keys()
                .filter(|dep| !previous.contains_key(*dep))
                .copied()
                .collect(),
            removed: previous
                .keys()
                .filter(|dep| !node.dependencies().contains_key(*dep))
                .copied()
                .collect(),
        };

        for dep in &diff.added {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.add_dependent(id);
            }
        }
        for dep in &diff.removed {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.remove_dependent(id);
            }
        }

        if mounted {
            for dep in &diff.added {
                self.mount(*dep, changes);
            }
            for dep in &diff.removed {
                self.unmount(*dep, changes);
            }
        }

        diff
    }

    /// Propagate a change of `source` to everything mounted downstream.
    ///
    /// The walk continues through nodes that are already dirty: a computed
    /// nobody has read since it was marked still has listeners to queue, and
    /// an effect left dirty by an abandoned flush must be queued again.
    /// Effects reached through an edge or subscribed as listeners are queued.
    /// Returns the number of nodes newly marked dirty.
    pub(crate) fn invalidate(&mut self, source: AtomId) -> usize {
        self.version += 1;
        self.scheduler.note_write();
        self.propagate(source)
    }

    /// Dirty walk of [`invalidate`](Self::invalidate), without counting a
    /// write.
    fn propagate(&mut self, source: AtomId) -> usize {
        let mut marked = self.enqueue_listeners(source);
        let mut stack: SmallVec<[AtomId; 16]> = match self.nodes.get(&source) {
            Some(node) => node.dependents().iter().copied().collect(),
            None => return marked,
        };
        let mut visited = HashSet::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if !node.is_mounted() {
                continue;
            }
            if node.mark_dirty() {
                marked += 1;
            }
            match node.kind() {
                AtomKind::Effect => {
                    self.scheduler.enqueue(id);
                }
                AtomKind::Computed | AtomKind::Value => {
                    stack.extend(node.dependents().iter().copied());
                    marked += self.enqueue_listeners(id);
                }
            }
        }

        marked
    }

    /// Mark and queue the effects subscribed to `id`.
    fn enqueue_listeners(&mut self, id: AtomId) -> usize {
        let listeners: SmallVec<[AtomId; 4]> = match self.nodes.get(&id) {
            Some(node) => node.listeners().iter().copied().collect(),
            None => return 0,
        };

        let mut marked = 0;
        for effect in listeners {
            if let Some(node) = self.nodes.get_mut(&effect) {
                if node.is_mounted() {
                    if node.mark_dirty() {
                        marked += 1;
                    }
                    self.scheduler.enqueue(effect);
                }
            }
        }
        marked
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::scheduler::FlushPhase;
    use super::*;
    use crate::atom::sealed::Inner;
    use crate::atom::{computed, effect, value, AtomHandle};

    fn add<A: AtomHandle>(graph: &mut Graph, atom: &A) -> AtomId {
        graph.ensure(atom.inner()).id()
    }

    fn link(graph: &mut Graph, reader: AtomId, deps: &[AtomId]) -> EdgeDiff {
        let reads = deps.iter().map(|dep| (*dep, 0)).collect();
        graph.commit_dependencies(reader, reads, &mut MountChanges::default())
    }

    #[test]
    fn nodes_are_allocated_lazily() {
        let mut graph = Graph::new();
        let a = value(1);
        assert!(graph.node(a.id()).is_none());

        add(&mut graph, &a);
        add(&mut graph, &a);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn commit_keeps_dependents_transposed() {
        let mut graph = Graph::new();
        let a = add(&mut graph, &value(0));
        let b = add(&mut graph, &value(0));
        let c = add(&mut graph, &computed(|_| Ok(0)));

        let diff = link(&mut graph, c, &[a, b]);
        assert_eq!(diff.added, vec![a, b]);
        assert!(graph.node(a).unwrap().dependents().contains(&c));
        assert!(graph.node(b).unwrap().dependents().contains(&c));

        // The next run only reads `b`: the edge from `a` is unlinked.
        let diff = link(&mut graph, c, &[b]);
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![a]);
        assert!(!graph.node(a).unwrap().dependents().contains(&c));
        assert!(graph.node(b).unwrap().dependents().contains(&c));
    }

    #[test]
    fn invalidation_skips_unmounted_nodes() {
        let mut graph = Graph::new();
        let a = add(&mut graph, &value(0));
        let c = add(&mut graph, &computed(|_| Ok(0)));
        link(&mut graph, c, &[a]);

        assert_eq!(graph.invalidate(a), 0);
        assert!(!graph.node(c).unwrap().is_dirty());
        assert_eq!(graph.version(), 1);
    }

    #[test]
    fn invalidation_marks_mounted_chain_and_queues_effects() {
        let mut graph = Graph::new();
        let a = add(&mut graph, &value(0));
        let c1 = add(&mut graph, &computed(|_| Ok(0)));
        let c2 = add(&mut graph, &computed(|_| Ok(0)));
        let e = add(&mut graph, &effect(|_, _| Ok(())));
        link(&mut graph, c1, &[a]);
        link(&mut graph, c2, &[c1]);
        link(&mut graph, e, &[c2, a]);

        let mut changes = MountChanges::default();
        graph.mount(e, &mut changes);
        assert_eq!(changes.mounted.len(), 4);

        assert_eq!(graph.invalidate(a), 3);
        assert!(graph.node(c1).unwrap().is_dirty());
        assert!(graph.node(c2).unwrap().is_dirty());
        assert!(graph.node(e).unwrap().is_dirty());
        assert!(graph.scheduler.is_pending(e));
        assert_eq!(graph.scheduler.pending_len(), 1);

        // Already dirty: the second write marks nothing new.
        assert_eq!(graph.invalidate(a), 0);
    }

    #[test]
    fn listeners_are_queued_on_change() {
        let mut graph = Graph::new();
        let a = add(&mut graph, &value(0));
        let e = add(&mut graph, &effect(|_, _| Ok(())));
        graph.node_mut(a).unwrap().add_listener(e);

        let mut changes = MountChanges::default();
        graph.mount(a, &mut changes);
        graph.mount(e, &mut changes);

        graph.invalidate(a);
        assert!(graph.scheduler.is_pending(e));
        assert_eq!(graph.scheduler.phase(), FlushPhase::PendingWrites);
    }

    #[test]
    fn listeners_behind_a_dirty_computed_are_queued_again() {
        let mut graph = Graph::new();
        let a = add(&mut graph, &value(0));
        let c1 = add(&mut graph, &computed(|_| Ok(0)));
        let c2 = add(&mut graph, &computed(|_| Ok(0)));
        let e = add(&mut graph, &effect(|_, _| Ok(())));
        link(&mut graph, c1, &[a]);
        link(&mut graph, c2, &[c1]);
        graph.node_mut(c2).unwrap().add_listener(e);

        let mut changes = MountChanges::default();
        graph.mount(c2, &mut changes);
        graph.mount(e, &mut changes);

        graph.invalidate(a);
        assert_eq!(graph.scheduler.next_batch(), vec![e]);
        // The effect ran without reading `c2`, which stays dirty.
        graph.node_mut(e).unwrap().mark_clean();

        assert_eq!(graph.invalidate(a), 1);
        assert!(graph.scheduler.is_pending(e));
    }

    #[test]
    fn abandoned_effects_are_queued_by_the_next_write() {
        let mut graph = Graph::new();
        let a = add(&mut graph, &value(0));
        let e = add(&mut graph, &effect(|_, _| Ok(())));
        link(&mut graph, e, &[a]);

        let mut changes = MountChanges::default();
        graph.mount(e, &mut changes);
        graph.invalidate(a);
        assert!(graph.scheduler.begin_flush());
        let batch = graph.scheduler.next_batch();

        assert_eq!(graph.abandon_flush(batch), 1);
        assert!(!graph.node(e).unwrap().is_dirty());
        assert_eq!(graph.scheduler.phase(), FlushPhase::Idle);

        graph.invalidate(a);
        assert!(graph.scheduler.is_pending(e));
    }
}
