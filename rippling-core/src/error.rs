//! Store Errors
//!
//! Every fallible store operation reports a [`StoreError`]. The variants fall
//! into three groups:
//!
//! - Usage errors (`NotWritable`, `TypeMismatch`, `AlreadySubscribed`,
//!   `Disposed`) are raised synchronously and never retried.
//! - `Cycle` is raised at the point where an evaluation re-enters itself.
//! - `Computation` wraps an error returned by a user closure. It is isolated
//!   to the failing node: nothing is cached, and the next read tries again.

use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

/// Error type carried through user closures.
///
/// Closures passed to [`computed`](crate::computed) and
/// [`effect`](crate::effect) return this, so `?` works on both
/// [`StoreError`] and any other error type.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Errors reported by a [`Store`](crate::Store).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Only `Value` atoms accept writes.
    #[error("atom {atom} is not writable")]
    NotWritable { atom: String },

    /// An untyped write or read used a value of the wrong type.
    #[error("atom {atom} holds a value of type {expected}")]
    TypeMismatch { atom: String, expected: &'static str },

    /// The `(target, effect)` pair already has a live subscription.
    #[error("effect {effect} is already subscribed to {atom}")]
    AlreadySubscribed { atom: String, effect: String },

    /// The store was torn down with [`Store::dispose`](crate::Store::dispose).
    #[error("store has been disposed")]
    Disposed,

    /// Evaluating `atom` re-entered its own evaluation.
    #[error("cycle detected while evaluating {atom}")]
    Cycle { atom: String },

    /// A computed or effect closure returned an error.
    #[error("computation of {atom} failed: {source}")]
    Computation {
        atom: String,
        #[source]
        source: Arc<dyn Error + Send + Sync + 'static>,
    },
}

impl StoreError {
    /// Recover a store error that travelled through a user closure as a
    /// [`BoxError`], or wrap a foreign error as a computation failure of
    /// `atom`.
    pub(crate) fn from_closure(atom: impl FnOnce() -> String, err: BoxError) -> Self {
        match err.downcast::<StoreError>() {
            Ok(inner) => *inner,
            Err(other) => StoreError::Computation {
                atom: atom(),
                source: Arc::from(other),
            },
        }
    }

    /// Whether this is a cycle error.
    pub fn is_cycle(&self) -> bool {
        matches!(self, StoreError::Cycle { .. })
    }
}
