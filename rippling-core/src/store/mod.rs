//! Stores
//!
//! A [`Store`] owns the state of every atom it touches. Atoms themselves are
//! stateless descriptors, so the same atom can be used with any number of
//! stores, each holding its own value for it.
//!
//! # Operations
//!
//! - [`Store::get`] returns the current value, recomputing stale computeds.
//! - [`Store::set`] writes a value atom and marks what depends on it dirty.
//! - [`Store::sub`] subscribes an effect to an atom and mounts both.
//! - [`Store::notify`] re-runs the effects invalidated since the last flush.
//!
//! Writes never run effects by themselves. Any number of writes followed by
//! one `notify` re-runs each affected effect once.
//!
//! # Threads
//!
//! `Store` is `Send + Sync` and cheap to clone. Every operation is one
//! critical section; closures called by the store may use the store again
//! from the same thread.

mod debug;
mod engine;
mod observer;

use std::any::Any;
use std::sync::{Arc, Weak};

use crate::atom::sealed::Inner;
use crate::atom::{AnyAtom, AnyValue, AtomHandle, AtomInner, Effect, Readable, Value};
use crate::config::StoreOptions;
use crate::error::StoreError;

use self::engine::StoreCore;

pub use debug::{DebugEvent, DebugStore, EventFilter};
pub use observer::{EventKind, EventState, Operation, StoreObserver};

fn downcast<T: Clone + 'static>(atom: &AtomInner, value: AnyValue) -> Result<T, StoreError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| StoreError::TypeMismatch {
            atom: atom.describe(),
            expected: atom.type_name(),
        })
}

/// Holds the state of atoms and schedules their effects.
///
/// # Example
///
/// ```rust
/// use rippling_core::{computed, value, Store};
///
/// let v = value(0);
/// let c = {
///     let v = v.clone();
///     computed(move |get| Ok(get.get(&v)? * 2))
/// };
///
/// let store = Store::new();
/// store.set(&v, 5).unwrap();
/// assert_eq!(store.get(&c).unwrap(), 10);
/// ```
#[derive(Clone, Debug)]
pub struct Store {
    core: Arc<StoreCore>,
}

impl Store {
    /// Create a store with default options.
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            core: Arc::new(StoreCore::new(options, None)),
        }
    }

    /// Create a store that reports every operation to `observer`.
    pub fn with_observer(options: StoreOptions, observer: Arc<dyn StoreObserver>) -> Self {
        Self {
            core: Arc::new(StoreCore::new(options, Some(observer))),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        self.core.options()
    }

    /// Read the current value of `atom`.
    ///
    /// Works whether or not the atom is mounted. A computed recomputes only
    /// if one of its inputs changed since its last run; an error from its
    /// closure is returned here and is not cached.
    pub fn get<T, A>(&self, atom: &A) -> Result<T, StoreError>
    where
        T: Clone + 'static,
        A: Readable<T>,
    {
        let inner = atom.inner();
        let value = self.core.get(inner)?;
        downcast(inner, value)
    }

    /// Write a value atom.
    ///
    /// Writing a value equal to the current one does nothing. Otherwise
    /// everything mounted downstream is marked dirty and affected effects are
    /// queued until the next [`notify`](Self::notify).
    pub fn set<T>(&self, atom: &Value<T>, value: T) -> Result<(), StoreError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.core
            .write(atom.inner(), None, |_| Ok(Arc::new(value) as AnyValue))
            .map(|_| ())
    }

    /// Write a value atom with a function of its current value.
    pub fn update<T, F>(&self, atom: &Value<T>, f: F) -> Result<(), StoreError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> T,
    {
        update_with(&self.core, atom.inner(), None, f)
    }

    /// Write through a type-erased handle.
    ///
    /// Fails with [`StoreError::NotWritable`] unless `atom` is a value atom,
    /// and with [`StoreError::TypeMismatch`] if it holds another type.
    pub fn set_dyn<T>(&self, atom: &AnyAtom, value: T) -> Result<(), StoreError>
    where
        T: Any + Send + Sync,
    {
        let inner = atom.inner();
        self.core
            .write(inner, None, |_| {
                if inner.holds::<T>() {
                    Ok(Arc::new(value) as AnyValue)
                } else {
                    Err(StoreError::TypeMismatch {
                        atom: inner.describe(),
                        expected: inner.type_name(),
                    })
                }
            })
            .map(|_| ())
    }

    /// Subscribe `effect` to `target`.
    ///
    /// `target` and its dependencies are mounted, and so is `effect`, which
    /// runs immediately if it was not mounted yet. From then on the effect
    /// re-runs on [`notify`](Self::notify) whenever `target` or anything the
    /// effect read has changed.
    ///
    /// An effect failing in its first run does not fail the subscription;
    /// the failure is logged and reported to the store's observer.
    pub fn sub<A: AtomHandle>(
        &self,
        target: &A,
        effect: &Effect,
    ) -> Result<Subscription, StoreError> {
        let target = Arc::clone(target.inner());
        let effect = Arc::clone(effect.inner());
        self.core.subscribe(&target, &effect)?;
        Ok(Subscription {
            core: Arc::downgrade(&self.core),
            target,
            effect,
            active: true,
        })
    }

    /// Run every effect invalidated since the last flush.
    ///
    /// Each pending effect that is still mounted runs once. Writes made by
    /// effects are handled by the same flush. Failing effects are logged and
    /// reported to the observer without stopping the flush. Calling this on a
    /// disposed store, or with nothing pending, does nothing.
    pub fn notify(&self) {
        self.core.notify();
    }

    /// Tear the store down.
    ///
    /// Runs the cleanup of every mounted effect and drops all state. Later
    /// `get`, `set` and `sub` calls fail with [`StoreError::Disposed`].
    pub fn dispose(&self) {
        self.core.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Whether `atom` is reachable from a live subscription.
    pub fn is_mounted<A: AtomHandle>(&self, atom: &A) -> bool {
        self.core.is_mounted(atom.id())
    }

    /// The atoms `atom` read during its latest run.
    pub fn dependencies_of<A: AtomHandle>(&self, atom: &A) -> Vec<AnyAtom> {
        self.core.dependencies_of(atom.id())
    }

    /// The atoms whose latest run read `atom`.
    pub fn dependents_of<A: AtomHandle>(&self, atom: &A) -> Vec<AnyAtom> {
        self.core.dependents_of(atom.id())
    }

    /// Number of atoms this store holds state for.
    pub fn node_count(&self) -> usize {
        self.core.node_count()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn update_with<T, F>(
    core: &StoreCore,
    atom: &Arc<AtomInner>,
    origin: Option<&Arc<AtomInner>>,
    f: F,
) -> Result<(), StoreError>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce(&T) -> T,
{
    core.write(atom, origin, |current| {
        let current = current
            .downcast_ref::<T>()
            .ok_or_else(|| StoreError::TypeMismatch {
                atom: atom.describe(),
                expected: atom.type_name(),
            })?;
        Ok(Arc::new(f(current)) as AnyValue)
    })
    .map(|_| ())
}

/// Read access handed to computed and effect closures.
///
/// Every read through a getter becomes a dependency of the running atom.
pub struct Getter<'a> {
    core: &'a StoreCore,
    owner: &'a Arc<AtomInner>,
}

impl<'a> Getter<'a> {
    pub(crate) fn new(core: &'a StoreCore, owner: &'a Arc<AtomInner>) -> Self {
        Self { core, owner }
    }

    /// Read `atom` and record it as a dependency.
    pub fn get<T, A>(&self, atom: &A) -> Result<T, StoreError>
    where
        T: Clone + 'static,
        A: Readable<T>,
    {
        let inner = atom.inner();
        let value = self.core.get_tracked(self.owner, inner)?;
        downcast(inner, value)
    }
}

/// Write access handed to effect closures.
///
/// Writes made during a flush are picked up by that same flush.
pub struct Setter<'a> {
    core: &'a StoreCore,
    owner: &'a Arc<AtomInner>,
}

impl<'a> Setter<'a> {
    pub(crate) fn new(core: &'a StoreCore, owner: &'a Arc<AtomInner>) -> Self {
        Self { core, owner }
    }

    pub fn set<T>(&self, atom: &Value<T>, value: T) -> Result<(), StoreError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.core
            .write(atom.inner(), Some(self.owner), |_| Ok(Arc::new(value) as AnyValue))
            .map(|_| ())
    }

    pub fn update<T, F>(&self, atom: &Value<T>, f: F) -> Result<(), StoreError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> T,
    {
        update_with(self.core, atom.inner(), Some(self.owner), f)
    }
}

/// A live subscription returned by [`Store::sub`].
///
/// Dropping it unsubscribes. Once the last subscription reaching an atom is
/// gone, the atom unmounts and effect cleanups run.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    core: Weak<StoreCore>,
    target: Arc<AtomInner>,
    effect: Arc<AtomInner>,
    active: bool,
}

impl Subscription {
    /// The subscribed atom.
    pub fn target(&self) -> AnyAtom {
        AnyAtom::from_inner(Arc::clone(&self.target))
    }

    /// The subscribed effect.
    pub fn effect(&self) -> AnyAtom {
        AnyAtom::from_inner(Arc::clone(&self.effect))
    }

    /// Unsubscribe now.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(core) = self.core.upgrade() {
            core.unsubscribe(&self.target, &self.effect);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.target.describe())
            .field("effect", &self.effect.describe())
            .field("active", &self.active)
            .finish()
    }
}
