//! Flush Scheduler
//!
//! The scheduler holds the effects invalidated since the last flush and the
//! store's flush phase.
//!
//! # Phases
//!
//! ```text
//! Idle --write--> PendingWrites --notify--> Flushing --drained--> Idle
//! ```
//!
//! Writes never flush on their own; the caller decides when to call
//! `notify`, so N writes followed by one notify re-run each affected effect
//! once. Writes made while Flushing (by the effects themselves) land in the
//! same pending set and are drained by the running flush in later rounds.
//!
//! The pending set is insertion-ordered and deduplicated: an effect
//! invalidated twice before it runs is queued once.

use indexmap::IndexSet;

use crate::atom::AtomId;

/// Flush phase of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushPhase {
    /// Nothing written since the last flush.
    Idle,

    /// Writes happened; effects may be pending.
    PendingWrites,

    /// `notify` is draining the pending set.
    Flushing,
}

/// Pending effects plus the flush phase.
#[derive(Debug)]
pub(crate) struct Scheduler {
    phase: FlushPhase,
    pending: IndexSet<AtomId>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            phase: FlushPhase::Idle,
            pending: IndexSet::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> FlushPhase {
        self.phase
    }

    /// Record that a write happened.
    pub(crate) fn note_write(&mut self) {
        if self.phase == FlushPhase::Idle {
            self.phase = FlushPhase::PendingWrites;
        }
    }

    /// Queue an invalidated effect. Returns `false` if it was already queued.
    pub(crate) fn enqueue(&mut self, effect: AtomId) -> bool {
        self.note_write();
        self.pending.insert(effect)
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, effect: AtomId) -> bool {
        self.pending.contains(&effect)
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Enter the Flushing phase.
    ///
    /// Returns `false` when there is nothing to do: either a flush is already
    /// running (re-entrant notify folds into it) or nothing is pending.
    pub(crate) fn begin_flush(&mut self) -> bool {
        match self.phase {
            FlushPhase::Flushing => false,
            _ if self.pending.is_empty() => {
                self.phase = FlushPhase::Idle;
                false
            }
            _ => {
                self.phase = FlushPhase::Flushing;
                true
            }
        }
    }

    /// Take every currently pending effect, in queue order.
    ///
    /// Effects queued while the batch runs go into the next batch.
    pub(crate) fn next_batch(&mut self) -> Vec<AtomId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Leave the Flushing phase.
    pub(crate) fn finish_flush(&mut self) {
        debug_assert!(self.pending.is_empty(), "flush finished with pending effects");
        self.phase = FlushPhase::Idle;
    }

    /// Drop everything pending and return to Idle.
    pub(crate) fn abandon(&mut self) -> Vec<AtomId> {
        self.phase = FlushPhase::Idle;
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
