//! Debug Store
//!
//! A [`DebugStore`] is a [`Store`] with an event log attached. Every store
//! operation, including the reads and writes that computeds and effects make
//! while running, is appended to the log as it happens. Tooling consumes the
//! log by pulling ([`DebugStore::events`], [`DebugStore::events_since`]) or
//! by listening on a broadcast channel ([`DebugStore::subscribe_events`]).
//!
//! # Event Shape
//!
//! An operation with a duration produces two events sharing one `event_id`:
//! a `pending` event when it starts and a `settled` or `error` event when it
//! ends. Operations nested inside it appear in between, attributed to the
//! running atom through `origin`. Mount transitions and effect failures are
//! logged as single events.
//!
//! The log has no effect on the store's behaviour.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::observer::{EventKind, EventState, Operation, StoreObserver};
use super::Store;
use crate::atom::{AnyAtom, AtomHandle, AtomId};
use crate::config::DebugOptions;
use crate::error::StoreError;

/// One entry of the debug log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugEvent {
    /// Milliseconds since the debug store was created.
    pub time: f64,

    /// Shared by the `pending` and final event of one operation.
    pub event_id: u64,

    /// Display name of the target atom. `None` for `notify`.
    #[serde(rename = "targetAtom")]
    pub target: Option<String>,

    pub target_id: Option<AtomId>,

    /// Display name of the computed or effect that issued the operation.
    pub origin: Option<String>,

    #[serde(rename = "type")]
    pub kind: EventKind,

    pub state: EventState,

    /// Rendered error for `error` events.
    pub error: Option<String>,
}

/// Selects events by kind and target label.
///
/// An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    /// Kinds to keep. Empty keeps every kind.
    pub kinds: Vec<EventKind>,

    /// Case-insensitive substring of the target's display name.
    pub label: Option<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn matches(&self, event: &DebugEvent) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        match &self.label {
            None => true,
            Some(label) => event
                .target
                .as_deref()
                .is_some_and(|target| target.to_lowercase().contains(&label.to_lowercase())),
        }
    }
}

/// The observer behind a [`DebugStore`].
struct EventLog {
    started: Instant,
    next_id: AtomicU64,
    events: Mutex<Vec<DebugEvent>>,
    sender: broadcast::Sender<DebugEvent>,
}

impl EventLog {
    fn new(channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            started: Instant::now(),
            next_id: AtomicU64::new(1),
            events: Mutex::new(Vec::new()),
            sender,
        }
    }

    fn push(&self, event_id: u64, op: &Operation<'_>, state: EventState, error: Option<String>) {
        let event = DebugEvent {
            time: self.started.elapsed().as_secs_f64() * 1_000.0,
            event_id,
            target: op.target.map(AnyAtom::to_string),
            target_id: op.target.map(AnyAtom::id),
            origin: op.origin.map(AnyAtom::to_string),
            kind: op.kind,
            state,
            error,
        };
        // Appended and sent under one lock so both sides see the same order.
        let mut events = self.events.lock();
        // No receivers is fine; the log is still pulled.
        let _ = self.sender.send(event.clone());
        events.push(event);
    }

    fn settle(&self, event_id: u64, op: &Operation<'_>, outcome: Result<(), &StoreError>) {
        match outcome {
            Ok(()) => self.push(event_id, op, EventState::Settled, None),
            Err(err) => self.push(event_id, op, EventState::Error, Some(err.to_string())),
        }
    }
}

impl StoreObserver for EventLog {
    fn begin(&self, op: &Operation<'_>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.push(id, op, EventState::Pending, None);
        id
    }

    fn end(&self, id: u64, op: &Operation<'_>, outcome: Result<(), &StoreError>) {
        self.settle(id, op, outcome);
    }

    fn record(&self, op: &Operation<'_>, outcome: Result<(), &StoreError>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.settle(id, op, outcome);
    }
}

/// A store that logs every operation.
///
/// Dereferences to [`Store`], so it is used exactly like one.
///
/// # Example
///
/// ```rust
/// use rippling_core::{value, DebugStore, EventKind, EventState};
///
/// let count = value(0).with_label("count");
/// let store = DebugStore::new();
/// store.set(&count, 1).unwrap();
///
/// let events = store.events();
/// assert_eq!(events.len(), 2);
/// assert_eq!(events[0].kind, EventKind::Set);
/// assert_eq!(events[0].state, EventState::Pending);
/// assert_eq!(events[1].state, EventState::Settled);
/// assert_eq!(events[0].event_id, events[1].event_id);
/// ```
#[derive(Clone)]
pub struct DebugStore {
    store: Store,
    log: Arc<EventLog>,
}

impl DebugStore {
    pub fn new() -> Self {
        Self::with_options(DebugOptions::default())
    }

    pub fn with_options(options: DebugOptions) -> Self {
        let log = Arc::new(EventLog::new(options.event_channel_capacity));
        let observer: Arc<dyn StoreObserver> = log.clone();
        Self {
            store: Store::with_observer(options.store, observer),
            log,
        }
    }

    /// The wrapped store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Every event logged so far, in emission order.
    pub fn events(&self) -> Vec<DebugEvent> {
        self.log.events.lock().clone()
    }

    /// Events logged after the first `offset` ones.
    ///
    /// Pass the length of the previous pull to get only what is new.
    pub fn events_since(&self, offset: usize) -> Vec<DebugEvent> {
        let events = self.log.events.lock();
        events.get(offset..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Logged events accepted by `filter`.
    pub fn events_matching(&self, filter: &EventFilter) -> Vec<DebugEvent> {
        self.log
            .events
            .lock()
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect()
    }

    /// Number of events logged so far.
    pub fn event_count(&self) -> usize {
        self.log.events.lock().len()
    }

    /// The whole log as a JSON array.
    pub fn events_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&*self.log.events.lock())
    }

    /// Drop every logged event. Event ids keep counting up.
    pub fn clear_events(&self) {
        self.log.events.lock().clear();
    }

    /// Receive events as they are logged.
    ///
    /// Only events logged after this call are delivered. A receiver that
    /// falls more than the configured capacity behind skips ahead.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DebugEvent> {
        self.log.sender.subscribe()
    }

    /// Display names of the atoms `atom` depends on.
    pub fn dependency_labels<A: AtomHandle>(&self, atom: &A) -> Vec<String> {
        self.store
            .dependencies_of(atom)
            .iter()
            .map(AnyAtom::to_string)
            .collect()
    }
}

impl Default for DebugStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for DebugStore {
    type Target = Store;

    fn deref(&self) -> &Store {
        &self.store
    }
}

impl std::fmt::Debug for DebugStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugStore")
            .field("store", &self.store)
            .field("events", &self.event_count())
            .finish()
    }
}
