//! Boundary Conveniences
//!
//! Nothing in the store engine uses this module. It serves code that sits
//! between the engine and an application:
//!
//! - [`AtomCache`] keeps atom identity stable when the code defining atoms
//!   runs more than once, as it does under hot reload. The first atom
//!   registered under a key is handed back on every later registration, so
//!   stores keep their state for it.
//! - [`default_store`] is a process-wide store for applications that only
//!   ever need one.

use std::sync::OnceLock;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::atom::sealed::Inner;
use crate::atom::{AnyAtom, AtomHandle};
use crate::store::Store;

/// A key to atom table.
///
/// # Example
///
/// ```rust
/// use rippling_core::{value, AtomCache};
///
/// let cache = AtomCache::new();
/// let first = cache.get_or_register("src/counter/count", value(0));
/// // Second evaluation of the same definition.
/// let second = cache.get_or_register("src/counter/count", value(0));
/// assert_eq!(first, second);
/// ```
#[derive(Debug, Default)]
pub struct AtomCache {
    atoms: DashMap<String, AnyAtom>,
}

impl AtomCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the atom registered under `key`, or register `atom` there.
    ///
    /// A newly registered atom without a label is labelled with `key`. If
    /// the registered atom has a different kind or value type (the definition
    /// changed between reloads), `atom` replaces it.
    pub fn get_or_register<A: AtomHandle>(&self, key: impl Into<String>, atom: A) -> A {
        match self.atoms.entry(key.into()) {
            Entry::Occupied(mut entry) => {
                if let Some(existing) = entry.get().downcast::<A>() {
                    return existing;
                }
                warn!(
                    key = %entry.key(),
                    previous = %entry.get(),
                    "atom definition changed shape, replacing cached atom"
                );
                label_with_key(&atom, entry.key());
                entry.insert(atom.erase());
                atom
            }
            Entry::Vacant(entry) => {
                label_with_key(&atom, entry.key());
                debug!(key = %entry.key(), atom = %atom.erase(), "atom registered");
                entry.insert(atom.erase());
                atom
            }
        }
    }

    /// The atom registered under `key`, if it has type `A`.
    pub fn get<A: AtomHandle>(&self, key: &str) -> Option<A> {
        self.atoms.get(key).and_then(|atom| atom.downcast::<A>())
    }

    pub fn remove(&self, key: &str) -> Option<AnyAtom> {
        self.atoms.remove(key).map(|(_, atom)| atom)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.atoms.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn clear(&self) {
        self.atoms.clear();
    }
}

fn label_with_key<A: AtomHandle>(atom: &A, key: &str) {
    if atom.inner().label().is_none() {
        atom.inner().set_label(key.to_owned());
    }
}

/// The process-wide default store, created on first use.
///
/// Prefer creating and passing stores explicitly; this exists for
/// applications that want a single implicit store at their outer layer.
pub fn default_store() -> &'static Store {
    static DEFAULT: OnceLock<Store> = OnceLock::new();
    DEFAULT.get_or_init(Store::new)
}
