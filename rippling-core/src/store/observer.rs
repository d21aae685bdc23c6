//! Store Observation
//!
//! A store can carry one [`StoreObserver`]. It sees every operation the
//! store performs, including those made from inside computeds and effects,
//! but cannot change their outcome. [`DebugStore`](crate::DebugStore) is
//! built on this hook.

use serde::{Deserialize, Serialize};

use crate::atom::AnyAtom;
use crate::error::StoreError;

/// The operation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Get,
    Set,
    Sub,
    Unsub,
    Mount,
    Unmount,
    Notify,
}

/// Where an operation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Pending,
    Settled,
    Error,
}

/// One observed operation.
#[derive(Debug, Clone, Copy)]
pub struct Operation<'a> {
    pub kind: EventKind,

    /// The atom operated on. `None` for `notify`.
    pub target: Option<&'a AnyAtom>,

    /// The computed or effect whose run issued the operation, if any.
    pub origin: Option<&'a AnyAtom>,
}

/// Receives the operations of a store.
///
/// Calls are made synchronously from inside the store's critical section.
/// Implementations must not call back into the observed store.
pub trait StoreObserver: Send + Sync + 'static {
    /// An operation started. The returned id is handed back to
    /// [`end`](Self::end).
    fn begin(&self, op: &Operation<'_>) -> u64;

    /// An operation started with [`begin`](Self::begin) finished.
    fn end(&self, id: u64, op: &Operation<'_>, outcome: Result<(), &StoreError>);

    /// An operation without a pending phase: a mount transition, or an
    /// effect failing inside `sub` or `notify`.
    fn record(&self, op: &Operation<'_>, outcome: Result<(), &StoreError>);
}
