//! Value Atoms
//!
//! A Value is the only writable atom. It holds no state itself; each store
//! initializes its own copy on first touch, either from a literal or from a
//! lazy initializer.
//!
//! # Equality
//!
//! Writes compare the new value to the current one. An equal write is a
//! no-op: nothing is marked dirty and no effect re-runs. [`value`] compares
//! with `PartialEq`; [`value_with_equals`] takes a custom comparator, e.g.
//! `Arc::ptr_eq` for reference equality.

use std::marker::PhantomData;
use std::sync::Arc;

use super::{sealed, AnyAtom, AnyValue, AtomDef, AtomHandle, AtomId, AtomInner, AtomKind, Readable};

/// A writable reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use rippling_core::{value, Store};
///
/// let count = value(0);
/// let store = Store::new();
///
/// store.set(&count, 5).unwrap();
/// assert_eq!(store.get(&count).unwrap(), 5);
/// ```
pub struct Value<T> {
    atom: AnyAtom,
    _marker: PhantomData<fn() -> T>,
}

/// Create a value atom with a literal initial value.
pub fn value<T>(initial: T) -> Value<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    value_with_equals(initial, T::eq)
}

/// Create a value atom whose initial value is produced on first touch.
///
/// The initializer runs once per store that touches the atom.
pub fn lazy_value<T, F>(init: F) -> Value<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Value::from_parts(init, T::eq)
}

/// Create a value atom with a custom equality used to detect no-op writes.
pub fn value_with_equals<T, E>(initial: T, equals: E) -> Value<T>
where
    T: Clone + Send + Sync + 'static,
    E: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    Value::from_parts(move || initial.clone(), equals)
}

impl<T> Value<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from_parts<F, E>(init: F, equals: E) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let def = AtomDef::Value {
            init: Box::new(move || Arc::new(init()) as AnyValue),
            equals: Box::new(move |old: &AnyValue, new: &AnyValue| {
                match (old.downcast_ref::<T>(), new.downcast_ref::<T>()) {
                    (Some(old), Some(new)) => equals(old, new),
                    _ => false,
                }
            }),
        };
        Self {
            atom: AnyAtom::from_inner(AtomInner::new::<T>(def)),
            _marker: PhantomData,
        }
    }
}

impl<T> Value<T> {
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

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            _marker: PhantomData,
        }
    }
}

impl_handle_identity!(Value<T>);

impl<T: 'static> sealed::Sealed for Value<T> {
    fn erased(&self) -> &AnyAtom {
        &self.atom
    }
}

impl<T: 'static> AtomHandle for Value<T> {
    fn id(&self) -> AtomId {
        self.atom.id()
    }

    fn kind(&self) -> AtomKind {
        AtomKind::Value
    }

    fn erase(&self) -> AnyAtom {
        self.atom.clone()
    }

    fn from_erased(atom: &AnyAtom) -> Option<Self> {
        let inner = atom.inner();
        (inner.kind() == AtomKind::Value && inner.holds::<T>()).then(|| Self {
            atom: atom.clone(),
            _marker: PhantomData,
        })
    }
}

impl<T: 'static> Readable<T> for Value<T> {}
