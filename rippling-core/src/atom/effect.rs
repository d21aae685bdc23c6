//! Effect Atoms
//!
//! An Effect is a side-effecting reaction and the unit of subscription.
//!
//! # How Effects Run
//!
//! 1. [`Store::sub`](crate::Store::sub) mounts the effect and runs it once,
//!    recording its read-set.
//!
//! 2. A write to anything in that read-set, or to the subscribed target,
//!    marks the effect dirty and queues it.
//!
//! 3. [`Store::notify`](crate::Store::notify) runs each queued effect that is
//!    still mounted and still dirty, exactly once per flush.
//!
//! # Cleanup
//!
//! [`effect_with_cleanup`] lets a run return a [`Cleanup`]. It is called
//! before the next run and when the effect unmounts.

use super::{sealed, AnyAtom, AtomDef, AtomHandle, AtomId, AtomInner, AtomKind};
use crate::error::BoxError;
use crate::store::{Getter, Setter};

/// Teardown returned by an effect run.
pub type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// A side-effecting computation driven by a store.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use rippling_core::{effect, value, Store};
///
/// let count = value(0);
/// let runs = Arc::new(AtomicUsize::new(0));
/// let log = {
///     let (count, runs) = (count.clone(), runs.clone());
///     effect(move |get, _set| {
///         runs.fetch_add(1, Ordering::SeqCst);
///         get.get(&count)?;
///         Ok(())
///     })
/// };
///
/// let store = Store::new();
/// let _sub = store.sub(&count, &log).unwrap();
/// store.set(&count, 1).unwrap();
/// store.notify();
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    atom: AnyAtom,
}

/// Create an effect without cleanup.
pub fn effect<F>(run: F) -> Effect
where
    F: Fn(&Getter<'_>, &Setter<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Effect::from_def(AtomDef::Effect {
        run: Box::new(move |get: &Getter<'_>, set: &Setter<'_>| {
            run(get, set).map(|()| None::<Cleanup>)
        }),
    })
}

/// Create an effect whose every run returns a [`Cleanup`].
pub fn effect_with_cleanup<F>(run: F) -> Effect
where
    F: Fn(&Getter<'_>, &Setter<'_>) -> Result<Cleanup, BoxError> + Send + Sync + 'static,
{
    Effect::from_def(AtomDef::Effect {
        run: Box::new(move |get: &Getter<'_>, set: &Setter<'_>| run(get, set).map(Some)),
    })
}

impl Effect {
    fn from_def(def: AtomDef) -> Self {
        Self {
            atom: AnyAtom::from_inner(AtomInner::new::<()>(def)),
        }
    }

    /// Attach a diagnostic label. Only the first label sticks.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        self.atom.inner().set_label(label.into());
        self
    }

    /// The diagnostic label, if any.
    pub fn label(&self) -> Option<&str> {
        self.atom.label()
    }
}

impl_handle_identity!(Effect);

impl sealed::Sealed for Effect {
    fn erased(&self) -> &AnyAtom {
        &self.atom
    }
}

impl AtomHandle for Effect {
    fn id(&self) -> AtomId {
        self.atom.id()
    }

    fn kind(&self) -> AtomKind {
        AtomKind::Effect
    }

    fn erase(&self) -> AnyAtom {
        self.atom.clone()
    }

    fn from_erased(atom: &AnyAtom) -> Option<Self> {
        let inner = atom.inner();
        (inner.kind() == AtomKind::Effect).then(|| Self {
            atom: atom.clone(),
        })
    }
}
