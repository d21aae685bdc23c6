//! Rippling Core
//!
//! This crate provides the store engine of the Rippling reactive state
//! library. It implements:
//!
//! - Atoms: writable values, memoized computeds and side-effecting effects
//! - A per-store dependency graph with exact, dynamically re-tracked edges
//! - Lazy recomputation: nothing runs until it is read or notified
//! - Reference-counted mounting driven by subscriptions
//! - Batched notification, so N writes re-run each effect once
//! - A debug store that logs every operation as a structured event
//!
//! # Architecture
//!
//! - `atom`: atom descriptors and their constructors
//! - `graph`: node state, edge bookkeeping, dirty propagation, mounting and
//!   the pending-effect queue
//! - `store`: the `Store` façade, the engine calling user closures, and the
//!   `DebugStore`
//! - `registry`: hot-reload atom cache and the default store
//! - `config`: store options
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use std::sync::Arc;
//! use rippling_core::{computed, effect, value, Store};
//!
//! let count = value(1);
//! let doubled = {
//!     let count = count.clone();
//!     computed(move |get| Ok(get.get(&count)? * 2))
//! };
//!
//! let seen = Arc::new(AtomicI32::new(0));
//! let log = {
//!     let (doubled, seen) = (doubled.clone(), seen.clone());
//!     effect(move |get, _set| {
//!         seen.store(get.get(&doubled)?, Ordering::SeqCst);
//!         Ok(())
//!     })
//! };
//!
//! let store = Store::new();
//! let _sub = store.sub(&doubled, &log).unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 2);
//!
//! store.set(&count, 5).unwrap();
//! store.notify();
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//! ```

pub mod atom;
pub mod config;
pub mod error;
mod graph;
pub mod registry;
pub mod store;

pub use atom::{
    computed, effect, effect_with_cleanup, lazy_value, value, value_with_equals, AnyAtom, AtomHandle,
    AtomId, AtomKind, Cleanup, Computed, Effect, Readable, Value,
};
pub use config::{DebugOptions, StoreOptions};
pub use error::{BoxError, StoreError};
pub use registry::{default_store, AtomCache};
pub use store::{
    DebugEvent, DebugStore, EventFilter, EventKind, EventState, Getter, Operation, Setter, Store,
    StoreObserver, Subscription,
};
