//! Atoms
//!
//! An atom is an addressable node descriptor. It carries no state of its
//! own: every store keeps a separate node for each atom it has touched, keyed
//! by the atom's [`AtomId`].
//!
//! # Kinds
//!
//! ## Values
//!
//! A [`Value`] is a writable cell. Its initializer runs the first time a
//! store touches it, and a write only propagates when the new value differs
//! from the old one under the value's equality.
//!
//! ## Computeds
//!
//! A [`Computed`] is a pure derivation. Its closure receives a [`Getter`];
//! every read made through the getter is recorded as a dependency edge.
//!
//! ## Effects
//!
//! An [`Effect`] is an impure reaction. It is the unit of subscription:
//! effects run when subscribed and re-run on [`Store::notify`] after one of
//! their inputs changed.
//!
//! # Identity
//!
//! Handles are cheap clones of one shared descriptor. Two handles are equal
//! iff they point to the same descriptor, never by content. Labels are for
//! diagnostics only.
//!
//! [`Getter`]: crate::Getter
//! [`Store::notify`]: crate::Store::notify

/// Implements identity-based equality, hashing and `Debug` for a typed
/// handle.
macro_rules! impl_handle_identity {
    ($name:ident $(<$t:ident>)?) => {
        impl$(<$t: 'static>)? PartialEq for $name$(<$t>)? {
            fn eq(&self, other: &Self) -> bool {
                self.atom.id() == other.atom.id()
            }
        }

        impl$(<$t: 'static>)? Eq for $name$(<$t>)? {}

        impl$(<$t: 'static>)? std::hash::Hash for $name$(<$t>)? {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                std::hash::Hash::hash(&self.atom.id(), state);
            }
        }

        impl$(<$t: 'static>)? std::fmt::Debug for $name$(<$t>)? {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("id", &self.atom.id())
                    .field("label", &self.atom.label())
                    .finish()
            }
        }
    };
}

mod computed;
mod effect;
mod value;

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::BoxError;
use crate::store::{Getter, Setter};

pub use computed::{computed, Computed};
pub use effect::{effect, effect_with_cleanup, Cleanup, Effect};
pub use value::{lazy_value, value, value_with_equals, Value};

/// Unique identifier for an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomId(u64);

impl AtomId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomKind {
    /// A writable cell. Has no dependencies.
    Value,

    /// A memoized pure derivation.
    Computed,

    /// A side-effecting reaction. Has dependencies but no dependents.
    Effect,
}

/// A type-erased value as held by a store node.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

pub(crate) type InitFn = Box<dyn Fn() -> AnyValue + Send + Sync>;
pub(crate) type EqualsFn = Box<dyn Fn(&AnyValue, &AnyValue) -> bool + Send + Sync>;
pub(crate) type ReadFn = Box<dyn Fn(&Getter<'_>) -> Result<AnyValue, BoxError> + Send + Sync>;
pub(crate) type RunFn =
    Box<dyn Fn(&Getter<'_>, &Setter<'_>) -> Result<Option<Cleanup>, BoxError> + Send + Sync>;

/// What an atom does, as a closed set of variants.
pub(crate) enum AtomDef {
    Value { init: InitFn, equals: EqualsFn },
    Computed { read: ReadFn },
    Effect { run: RunFn },
}

/// The shared descriptor behind every atom handle.
pub(crate) struct AtomInner {
    id: AtomId,
    label: OnceLock<String>,
    /// Type of the held value, `None` for effects.
    value_type: Option<(TypeId, &'static str)>,
    def: AtomDef,
}

impl AtomInner {
    pub(crate) fn new<T: 'static>(def: AtomDef) -> Arc<Self> {
        let value_type = match def {
            AtomDef::Effect { .. } => None,
            _ => Some((TypeId::of::<T>(), std::any::type_name::<T>())),
        };
        Arc::new(Self {
            id: AtomId::next(),
            label: OnceLock::new(),
            value_type,
            def,
        })
    }

    pub(crate) fn id(&self) -> AtomId {
        self.id
    }

    pub(crate) fn kind(&self) -> AtomKind {
        match self.def {
            AtomDef::Value { .. } => AtomKind::Value,
            AtomDef::Computed { .. } => AtomKind::Computed,
            AtomDef::Effect { .. } => AtomKind::Effect,
        }
    }

    pub(crate) fn def(&self) -> &AtomDef {
        &self.def
    }

    pub(crate) fn label(&self) -> Option<&str> {
        self.label.get().map(String::as_str)
    }

    pub(crate) fn set_label(&self, label: String) {
        // First label wins; handles share the descriptor.
        let _ = self.label.set(label);
    }

    pub(crate) fn holds<T: 'static>(&self) -> bool {
        matches!(self.value_type, Some((ty, _)) if ty == TypeId::of::<T>())
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.value_type.map(|(_, name)| name).unwrap_or("()")
    }

    /// Human-readable name used in errors and debug events.
    pub(crate) fn describe(&self) -> String {
        match self.label() {
            Some(label) => format!("{label}#{}", self.id),
            None => format!("{}#{}", kind_name(self.kind()), self.id),
        }
    }
}

fn kind_name(kind: AtomKind) -> &'static str {
    match kind {
        AtomKind::Value => "value",
        AtomKind::Computed => "computed",
        AtomKind::Effect => "effect",
    }
}

pub(crate) mod sealed {
    use std::sync::Arc;

    use super::{AnyAtom, AtomInner};

    pub trait Sealed {
        fn erased(&self) -> &AnyAtom;
    }

    /// Crate access to the shared state behind a typed handle.
    pub(crate) trait Inner: Sealed {
        fn inner(&self) -> &Arc<AtomInner> {
            self.erased().inner()
        }
    }

    impl<A: Sealed + ?Sized> Inner for A {}
}

/// Common behaviour of typed atom handles.
///
/// This trait is sealed; it is implemented by [`Value`], [`Computed`] and
/// [`Effect`].
pub trait AtomHandle: sealed::Sealed + Clone + Send + Sync + 'static {
    /// The atom's identity.
    fn id(&self) -> AtomId;

    /// The atom's kind.
    fn kind(&self) -> AtomKind;

    /// Erase the static type of this handle.
    fn erase(&self) -> AnyAtom;

    /// Recover a typed handle from an erased one.
    ///
    /// Returns `None` when the kind or the value type does not match.
    fn from_erased(atom: &AnyAtom) -> Option<Self>;
}

/// Atoms that can be read with [`Store::get`](crate::Store::get).
pub trait Readable<T>: AtomHandle {}

/// A type-erased atom handle.
///
/// Used where atoms of different types are stored together, for example in
/// the hot-reload [`AtomCache`](crate::AtomCache) or in debug tooling.
#[derive(Clone)]
pub struct AnyAtom {
    inner: Arc<AtomInner>,
}

impl AnyAtom {
    pub(crate) fn from_inner(inner: Arc<AtomInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<AtomInner> {
        &self.inner
    }

    /// The atom's identity.
    pub fn id(&self) -> AtomId {
        self.inner.id()
    }

    /// The atom's kind.
    pub fn kind(&self) -> AtomKind {
        self.inner.kind()
    }

    /// The diagnostic label, if one was set.
    pub fn label(&self) -> Option<&str> {
        self.inner.label()
    }

    /// Recover a typed handle. See [`AtomHandle::from_erased`].
    pub fn downcast<A: AtomHandle>(&self) -> Option<A> {
        A::from_erased(self)
    }
}

impl PartialEq for AnyAtom {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for AnyAtom {}

impl Hash for AnyAtom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for AnyAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.describe())
    }
}

impl fmt::Debug for AnyAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyAtom")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("label", &self.label())
            .finish()
    }
}
