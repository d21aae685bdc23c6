//! Store Configuration
//!
//! Both option structs implement `Default` and `serde::Deserialize`, with
//! missing fields taking their defaults, so a host can load them from JSON:
//!
//! ```rust
//! use rippling_core::DebugOptions;
//!
//! let options: DebugOptions =
//!     serde_json::from_str(r#"{ "store": { "max_flush_rounds": 8 } }"#).unwrap();
//! assert_eq!(options.store.max_flush_rounds, 8);
//! assert_eq!(options.event_channel_capacity, 1024);
//! ```

use serde::{Deserialize, Serialize};

/// Options for a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Upper bound on the rounds of one flush.
    ///
    /// Effects that write during a flush queue more work into the same
    /// flush; an effect that keeps rewriting its own input never drains.
    /// After this many rounds the flush logs an error and drops whatever is
    /// still pending.
    pub max_flush_rounds: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_flush_rounds: 1_000,
        }
    }
}

/// Options for a [`DebugStore`](crate::DebugStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugOptions {
    /// Options of the wrapped store.
    pub store: StoreOptions,

    /// Buffer of the push channel returned by
    /// [`DebugStore::subscribe_events`](crate::DebugStore::subscribe_events).
    /// Receivers lagging further behind lose the oldest events.
    pub event_channel_capacity: usize,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            store: StoreOptions::default(),
            event_channel_capacity: 1024,
        }
    }
}
