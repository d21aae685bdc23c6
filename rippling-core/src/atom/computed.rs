//! Computed Atoms
//!
//! A Computed is a memoized derivation over other atoms. It re-evaluates only
//! when read while stale:
//!
//! - While mounted, a write to any dependency marks it dirty synchronously,
//!   and the next read recomputes.
//! - While unmounted, nothing is pushed to it. A read checks the epochs of the
//!   dependencies recorded during its last run and recomputes only if one of
//!   them moved.
//!
//! The read-set is re-recorded on every run, so conditional reads are exact:
//! a dependency skipped by the latest run can no longer invalidate it.

use std::marker::PhantomData;
use std::sync::Arc;

use super::{sealed, AnyAtom, AnyValue, AtomDef, AtomHandle, AtomId, AtomInner, AtomKind, Readable};
use crate::error::BoxError;
use crate::store::Getter;

/// A cached derived value.
///
/// # Example
///
/// ```rust
/// use rippling_core::{computed, value, Store};
///
/// let base = value(0);
/// let doubled = {
///     let base = base.clone();
///     computed(move |get| Ok(get.get(&base)? * 2))
/// };
///
/// let store = Store::new();
/// store.set(&base, 5).unwrap();
/// assert_eq!(store.get(&doubled).unwrap(), 10);
/// ```
pub struct Computed<T> {
    atom: AnyAtom,
    _marker: PhantomData<fn() -> T>,
}

/// Create a computed atom from a read function.
///
/// The function must be pure: it may only observe the store through the
/// [`Getter`] it is given. It runs lazily, never at construction.
pub fn computed<T, F>(read: F) -> Computed<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Getter<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
{
    let def = AtomDef::Computed {
        read: Box::new(move |get: &Getter<'_>| read(get).map(|v| Arc::new(v) as AnyValue)),
    };
    Computed {
        atom: AnyAtom::from_inner(AtomInner::new::<T>(def)),
        _marker: PhantomData,
    }
}

impl<T> Computed<T> {
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

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            _marker: PhantomData,
        }
    }
}

impl_handle_identity!(Computed<T>);

impl<T: 'static> sealed::Sealed for Computed<T> {
    fn erased(&self) -> &AnyAtom {
        &self.atom
    }
}

impl<T: 'static> AtomHandle for Computed<T> {
    fn id(&self) -> AtomId {
        self.atom.id()
    }

    fn kind(&self) -> AtomKind {
        AtomKind::Computed
    }

    fn erase(&self) -> AnyAtom {
        self.atom.clone()
    }

    fn from_erased(atom: &AnyAtom) -> Option<Self> {
        let inner = atom.inner();
        (inner.kind() == AtomKind::Computed && inner.holds::<T>()).then(|| Self {
            atom: atom.clone(),
            _marker: PhantomData,
        })
    }
}

impl<T: 'static> Readable<T> for Computed<T> {}
