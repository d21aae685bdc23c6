//! Tracking Context
//!
//! The tracking stack records which computation is currently running and
//! what it reads.
//!
//! # Implementation
//!
//! Each store owns one stack. Running a computed or effect pushes a frame for
//! it; every read made through its getter is recorded in that frame together
//! with the epoch the dependency had at the time. When the run finishes the
//! frame is popped and its read-set replaces the node's dependencies in one
//! swap.
//!
//! The set of owners with an open frame doubles as the cycle detector: an
//! atom asked to evaluate while it already has a frame is reading itself.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::atom::AtomId;

/// An open evaluation of one atom.
#[derive(Debug)]
struct Frame {
    owner: AtomId,
    reads: IndexMap<AtomId, u64>,
}

/// Stack of open evaluations.
#[derive(Debug, Default)]
pub(crate) struct TrackingStack {
    frames: Vec<Frame>,
    evaluating: HashSet<AtomId>,
}

impl TrackingStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether `id` has an open frame.
    pub(crate) fn is_evaluating(&self, id: AtomId) -> bool {
        self.evaluating.contains(&id)
    }

    /// Open a frame for `owner`.
    ///
    /// Returns `false` without pushing if `owner` is already being evaluated.
    pub(crate) fn enter(&mut self, owner: AtomId) -> bool {
        if !self.evaluating.insert(owner) {
            return false;
        }
        self.frames.push(Frame {
            owner,
            reads: IndexMap::new(),
        });
        true
    }

    /// Record that `owner` read `dependency` at `epoch`.
    ///
    /// Reading the same atom twice in one run keeps a single entry.
    pub(crate) fn record(&mut self, owner: AtomId, dependency: AtomId, epoch: u64) {
        let frame = self.frames.iter_mut().rev().find(|frame| frame.owner == owner);
        debug_assert!(frame.is_some(), "read recorded for {owner} without an open frame");
        if let Some(frame) = frame {
            frame.reads.insert(dependency, epoch);
        }
    }

    /// Close the frame of `owner` and return its read-set.
    pub(crate) fn exit(&mut self, owner: AtomId) -> Option<IndexMap<AtomId, u64>> {
        let position = self.frames.iter().rposition(|frame| frame.owner == owner)?;
        debug_assert_eq!(
            position,
            self.frames.len() - 1,
            "tracking frame mismatch: {owner} is not the innermost evaluation"
        );
        let frame = self.frames.remove(position);
        self.evaluating.remove(&owner);
        Some(frame.reads)
    }

    /// Number of open frames.
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Owner of the innermost open frame.
    #[cfg(test)]
    pub(crate) fn current(&self) -> Option<AtomId> {
        self.frames.last().map(|frame| frame.owner)
    }
}
