//! Store Engine
//!
//! `StoreCore` is the part of the store that calls user code: it evaluates
//! computeds, runs effects, applies writes and drives the flush. Everything
//! it does to the graph goes through [`StoreCore::with`], which borrows the
//! state for the duration of one closure and never across a user callback.
//!
//! # Locking
//!
//! The state sits behind a re-entrant mutex. Each public operation takes the
//! lock once and keeps it until it returns, so `get`, `set`, `sub` and
//! `notify` are atomic with respect to other threads. Calls made from inside
//! computeds, effects and cleanups run on the thread that already holds the
//! lock and re-enter it.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::ReentrantMutex;
use tracing::{debug, error, trace, warn};

use super::observer::{EventKind, Operation, StoreObserver};
use crate::atom::{AnyAtom, AnyValue, AtomDef, AtomId, AtomInner, AtomKind};
use crate::config::StoreOptions;
use crate::error::StoreError;
use crate::graph::{Graph, MountChanges};
use crate::store::{Getter, Setter};

/// Everything a store owns.
#[derive(Debug)]
pub(crate) struct StoreState {
    graph: Graph,
    /// Live `(target, effect)` subscriptions.
    subscriptions: HashSet<(AtomId, AtomId)>,
    disposed: bool,
}

pub(crate) struct StoreCore {
    state: ReentrantMutex<RefCell<StoreState>>,
    options: StoreOptions,
    observer: Option<Arc<dyn StoreObserver>>,
}

impl StoreCore {
    pub(crate) fn new(options: StoreOptions, observer: Option<Arc<dyn StoreObserver>>) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(StoreState {
                graph: Graph::new(),
                subscriptions: HashSet::new(),
                disposed: false,
            })),
            options,
            observer,
        }
    }

    pub(crate) fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Run `f` with exclusive access to the store state.
    ///
    /// Must not be nested, and `f` must not call user code.
    fn with<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.with(|s| s.disposed)
    }

    fn ensure_alive(&self) -> Result<(), StoreError> {
        if self.is_disposed() {
            Err(StoreError::Disposed)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Run `op` as one observed operation.
    fn observed<R>(
        &self,
        kind: EventKind,
        target: Option<&Arc<AtomInner>>,
        origin: Option<&Arc<AtomInner>>,
        op: impl FnOnce() -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let Some(observer) = &self.observer else {
            return op();
        };
        let target = target.map(|atom| AnyAtom::from_inner(Arc::clone(atom)));
        let origin = origin.map(|atom| AnyAtom::from_inner(Arc::clone(atom)));
        let operation = Operation {
            kind,
            target: target.as_ref(),
            origin: origin.as_ref(),
        };

        let id = observer.begin(&operation);
        let result = op();
        observer.end(id, &operation, result.as_ref().map(|_| ()));
        result
    }

    fn record(&self, kind: EventKind, target: &Arc<AtomInner>, outcome: Result<(), &StoreError>) {
        if let Some(observer) = &self.observer {
            let target = AnyAtom::from_inner(Arc::clone(target));
            let operation = Operation {
                kind,
                target: Some(&target),
                origin: None,
            };
            observer.record(&operation, outcome);
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Top-level `get`.
    pub(crate) fn get(&self, atom: &Arc<AtomInner>) -> Result<AnyValue, StoreError> {
        let _lock = self.state.lock();
        self.ensure_alive()?;
        self.observed(EventKind::Get, Some(atom), None, || self.read(atom))
    }

    /// A read issued by the run of `owner`, recorded as a dependency.
    ///
    /// The edge is recorded even when the read fails, so that fixing the
    /// failing input invalidates `owner` too.
    pub(crate) fn get_tracked(
        &self,
        owner: &Arc<AtomInner>,
        atom: &Arc<AtomInner>,
    ) -> Result<AnyValue, StoreError> {
        self.ensure_alive()?;
        self.observed(EventKind::Get, Some(atom), Some(owner), || {
            let result = self.read(atom);
            self.with(|s| {
                let epoch = s.graph.node(atom.id()).map_or(0, |node| node.epoch());
                s.graph.tracking.record(owner.id(), atom.id(), epoch);
            });
            result
        })
    }

    /// Current value of `atom`, recomputing it if stale.
    fn read(&self, atom: &Arc<AtomInner>) -> Result<AnyValue, StoreError> {
        match atom.def() {
            AtomDef::Value { init, .. } => {
                if let Some(value) = self.with(|s| s.graph.ensure(atom).value().cloned()) {
                    return Ok(value);
                }
                let initial = init();
                Ok(self.with(|s| {
                    let node = s.graph.ensure(atom);
                    match node.value() {
                        // The initializer read the store and touched this atom.
                        Some(value) => Arc::clone(value),
                        None => {
                            node.set_value(Arc::clone(&initial));
                            initial
                        }
                    }
                }))
            }
            AtomDef::Computed { .. } => {
                if self.with(|s| s.graph.tracking.is_evaluating(atom.id())) {
                    return Err(StoreError::Cycle {
                        atom: atom.describe(),
                    });
                }
                match self.fresh_value(atom)? {
                    Some(value) => Ok(value),
                    None => self.evaluate(atom),
                }
            }
            AtomDef::Effect { .. } => Err(StoreError::TypeMismatch {
                atom: atom.describe(),
                expected: atom.type_name(),
            }),
        }
    }

    /// The cached value of a computed, if it is still current.
    fn fresh_value(&self, atom: &Arc<AtomInner>) -> Result<Option<AnyValue>, StoreError> {
        let id = atom.id();
        let (value, mounted, dirty, validated, dependencies) = self.with(|s| {
            let version = s.graph.version();
            let node = s.graph.ensure(atom);
            let mounted = node.is_mounted();
            if mounted && !node.is_dirty() {
                node.mark_validated(version);
            }
            (
                node.value().cloned(),
                mounted,
                node.is_dirty(),
                node.is_validated_at(version),
                node.dependencies().clone(),
            )
        });

        let Some(value) = value else {
            return Ok(None);
        };
        if mounted {
            return Ok((!dirty).then_some(value));
        }
        if validated {
            return Ok(Some(value));
        }

        // Unmounted: nothing was pushed here, so compare what the last run
        // saw against what its dependencies hold now. The open frame turns a
        // dependency reading back into this atom into a cycle error.
        let frame = FrameGuard::enter(self, atom)?;
        let unchanged = self.dependencies_unchanged(atom, &dependencies);
        frame.exit();

        if !unchanged {
            return Ok(None);
        }
        self.with(|s| {
            let version = s.graph.version();
            if let Some(node) = s.graph.node_mut(id) {
                node.mark_clean();
                node.mark_validated(version);
            }
        });
        Ok(Some(value))
    }

    /// Whether every recorded dependency still has the epoch it was read at.
    ///
    /// Dependencies are brought up to date first, so a stale computed
    /// dependency recomputes and shows a new epoch. These reads are observed
    /// as gets issued by `owner` but are not recorded as edges.
    fn dependencies_unchanged(
        &self,
        owner: &Arc<AtomInner>,
        dependencies: &IndexMap<AtomId, u64>,
    ) -> bool {
        dependencies.iter().all(|(dep, seen)| {
            let Some(atom) = self.with(|s| s.graph.node(*dep).map(|node| Arc::clone(node.atom())))
            else {
                return false;
            };
            let read =
                self.observed(EventKind::Get, Some(&atom), Some(owner), || self.read(&atom));
            if read.is_err() {
                return false;
            }
            self.with(|s| s.graph.node(*dep).map(|node| node.epoch())) == Some(*seen)
        })
    }

    /// Run the read function of a computed and cache the result.
    fn evaluate(&self, atom: &Arc<AtomInner>) -> Result<AnyValue, StoreError> {
        let AtomDef::Computed { read } = atom.def() else {
            return Err(StoreError::TypeMismatch {
                atom: atom.describe(),
                expected: atom.type_name(),
            });
        };
        let id = atom.id();

        let frame = FrameGuard::enter(self, atom)?;
        let result = read(&Getter::new(self, atom));
        let reads = frame.exit();

        let mut changes = MountChanges::default();
        let result = match result {
            Ok(value) => {
                let diff = self.with(|s| {
                    let diff = s.graph.commit_dependencies(id, reads, &mut changes);
                    let version = s.graph.version();
                    if let Some(node) = s.graph.node_mut(id) {
                        node.set_value(Arc::clone(&value));
                        node.mark_clean();
                        node.mark_validated(version);
                    }
                    diff
                });
                trace!(
                    atom = %atom.describe(),
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    "computed evaluated"
                );
                Ok(value)
            }
            Err(err) => {
                let err = StoreError::from_closure(|| atom.describe(), err);
                self.with(|s| {
                    if !err.is_cycle() {
                        s.graph.commit_dependencies(id, reads, &mut changes);
                    }
                    if let Some(node) = s.graph.node_mut(id) {
                        node.clear_value();
                        node.mark_clean();
                    }
                });
                trace!(atom = %atom.describe(), error = %err, "computed failed");
                Err(err)
            }
        };

        self.apply_mount_changes(changes);
        result
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write `atom`, computing the new value from the current one.
    ///
    /// Returns whether the value changed. An equal value is dropped without
    /// invalidating anything.
    pub(crate) fn write(
        &self,
        atom: &Arc<AtomInner>,
        origin: Option<&Arc<AtomInner>>,
        next: impl FnOnce(&AnyValue) -> Result<AnyValue, StoreError>,
    ) -> Result<bool, StoreError> {
        let _lock = self.state.lock();
        self.ensure_alive()?;
        self.observed(EventKind::Set, Some(atom), origin, || {
            let AtomDef::Value { equals, .. } = atom.def() else {
                return Err(StoreError::NotWritable {
                    atom: atom.describe(),
                });
            };

            let current = self.read(atom)?;
            let next = next(&current)?;
            if equals(&current, &next) {
                trace!(atom = %atom.describe(), "write skipped, value unchanged");
                return Ok(false);
            }

            let marked = self.with(|s| {
                s.graph.ensure(atom).set_value(next);
                s.graph.invalidate(atom.id())
            });
            trace!(atom = %atom.describe(), marked, "value written");
            Ok(true)
        })
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe `effect` to `target`.
    ///
    /// Mounts the target and the effect. If this mounts the effect for the
    /// first time, it runs once before returning.
    pub(crate) fn subscribe(
        &self,
        target: &Arc<AtomInner>,
        effect: &Arc<AtomInner>,
    ) -> Result<(), StoreError> {
        let _lock = self.state.lock();
        self.ensure_alive()?;
        self.observed(EventKind::Sub, Some(target), None, || {
            let pair = (target.id(), effect.id());
            if self.with(|s| s.subscriptions.contains(&pair)) {
                return Err(StoreError::AlreadySubscribed {
                    atom: target.describe(),
                    effect: effect.describe(),
                });
            }

            // Establish the target's dependencies before mounting them.
            if target.kind() != AtomKind::Effect {
                if let Err(err) = self.read(target) {
                    debug!(target = %target.describe(), error = %err, "subscribed to a failing atom");
                }
            }

            let (first_mount, changes) = self.with(|s| {
                s.subscriptions.insert(pair);
                s.graph.ensure(effect);
                s.graph.ensure(target).add_listener(effect.id());

                let was_mounted = s
                    .graph
                    .node(effect.id())
                    .is_some_and(|node| node.is_mounted());
                let mut changes = MountChanges::default();
                s.graph.mount(target.id(), &mut changes);
                s.graph.mount(effect.id(), &mut changes);
                (!was_mounted, changes)
            });
            self.apply_mount_changes(changes);
            debug!(target = %target.describe(), effect = %effect.describe(), "subscribed");

            if first_mount {
                if let Err(err) = self.run_effect(effect) {
                    self.report_effect_failure(EventKind::Sub, effect, &err);
                }
            }
            Ok(())
        })
    }

    /// Detach a subscription. Unknown pairs and disposed stores are ignored.
    pub(crate) fn unsubscribe(&self, target: &Arc<AtomInner>, effect: &Arc<AtomInner>) {
        let _lock = self.state.lock();
        let _ = self.observed(EventKind::Unsub, Some(target), None, || {
            let changes = self.with(|s| {
                if s.disposed || !s.subscriptions.remove(&(target.id(), effect.id())) {
                    return None;
                }
                if let Some(node) = s.graph.node_mut(target.id()) {
                    node.remove_listener(effect.id());
                }
                let mut changes = MountChanges::default();
                s.graph.unmount(effect.id(), &mut changes);
                s.graph.unmount(target.id(), &mut changes);
                Some(changes)
            });

            if let Some(changes) = changes {
                debug!(target = %target.describe(), effect = %effect.describe(), "unsubscribed");
                self.apply_mount_changes(changes);
            }
            Ok(())
        });
    }

    /// Report mount transitions and run the cleanups they collected.
    fn apply_mount_changes(&self, changes: MountChanges) {
        if changes.is_empty() {
            return;
        }

        let atoms = |ids: &[AtomId]| -> Vec<Arc<AtomInner>> {
            self.with(|s| {
                ids.iter()
                    .filter_map(|id| s.graph.node(*id).map(|node| Arc::clone(node.atom())))
                    .collect()
            })
        };
        for atom in atoms(&changes.mounted) {
            trace!(atom = %atom.describe(), "mounted");
            self.record(EventKind::Mount, &atom, Ok(()));
        }
        for atom in atoms(&changes.unmounted) {
            trace!(atom = %atom.describe(), "unmounted");
            self.record(EventKind::Unmount, &atom, Ok(()));
        }
        for (id, cleanup) in changes.cleanups {
            trace!(atom = %id, "running effect cleanup");
            cleanup();
        }
    }

    // ------------------------------------------------------------------
    // Effects and flushing
    // ------------------------------------------------------------------

    /// Run one effect, if it is still mounted.
    fn run_effect(&self, effect: &Arc<AtomInner>) -> Result<(), StoreError> {
        let AtomDef::Effect { run } = effect.def() else {
            return Ok(());
        };
        let id = effect.id();

        let previous = self.with(|s| {
            let node = s.graph.node_mut(id).filter(|node| node.is_mounted())?;
            node.mark_clean();
            Some(node.take_cleanup())
        });
        let Some(previous) = previous else {
            return Ok(());
        };
        if let Some(cleanup) = previous {
            cleanup();
        }

        let frame = FrameGuard::enter(self, effect)?;
        let result = run(&Getter::new(self, effect), &Setter::new(self, effect));
        let reads = frame.exit();

        let mut changes = MountChanges::default();
        match result {
            Ok(cleanup) => {
                let orphaned = self.with(|s| {
                    s.graph.commit_dependencies(id, reads, &mut changes);
                    match s.graph.node_mut(id) {
                        Some(node) if node.is_mounted() => {
                            node.bump_epoch();
                            node.set_cleanup(cleanup);
                            None
                        }
                        Some(node) => {
                            node.bump_epoch();
                            cleanup
                        }
                        None => cleanup,
                    }
                });
                self.apply_mount_changes(changes);
                // Unmounted during its own run: nothing will call it later.
                if let Some(cleanup) = orphaned {
                    cleanup();
                }
                trace!(effect = %effect.describe(), "effect ran");
                Ok(())
            }
            Err(err) => {
                let err = StoreError::from_closure(|| effect.describe(), err);
                if !err.is_cycle() {
                    self.with(|s| s.graph.commit_dependencies(id, reads, &mut changes));
                }
                self.apply_mount_changes(changes);
                Err(err)
            }
        }
    }

    fn report_effect_failure(&self, kind: EventKind, effect: &Arc<AtomInner>, err: &StoreError) {
        warn!(effect = %effect.describe(), error = %err, "effect failed");
        self.record(kind, effect, Err(err));
    }

    /// Run every pending effect.
    pub(crate) fn notify(&self) {
        let _lock = self.state.lock();
        if self.is_disposed() {
            return;
        }
        let _ = self.observed(EventKind::Notify, None, None, || {
            self.flush();
            Ok(())
        });
    }

    fn flush(&self) {
        let Some(pending) = self.with(|s| {
            s.graph
                .scheduler
                .begin_flush()
                .then(|| s.graph.scheduler.pending_len())
        }) else {
            return;
        };
        debug!(pending, "flush started");

        let mut rounds = 0;
        let mut ran = 0;
        loop {
            let batch = self.with(|s| s.graph.scheduler.next_batch());
            if batch.is_empty() {
                break;
            }
            rounds += 1;
            if rounds > self.options.max_flush_rounds {
                let dropped = self.with(|s| s.graph.abandon_flush(batch));
                error!(
                    rounds = self.options.max_flush_rounds,
                    dropped, "flush did not settle, dropping pending effects"
                );
                return;
            }
            debug!(round = rounds, effects = batch.len(), "flush round");

            for id in batch {
                // Checked at run time: an earlier effect in this batch may
                // have unsubscribed this one.
                let effect = self.with(|s| {
                    s.graph
                        .node(id)
                        .filter(|node| node.is_mounted() && node.is_dirty())
                        .map(|node| Arc::clone(node.atom()))
                });
                let Some(effect) = effect else {
                    continue;
                };
                ran += 1;
                if let Err(err) = self.run_effect(&effect) {
                    self.report_effect_failure(EventKind::Notify, &effect, &err);
                }
            }
        }

        self.with(|s| s.graph.scheduler.finish_flush());
        debug!(rounds, effects = ran, "flush finished");
    }

    // ------------------------------------------------------------------
    // Teardown and diagnostics
    // ------------------------------------------------------------------

    /// Run every live cleanup and drop all node state.
    pub(crate) fn dispose(&self) {
        let _lock = self.state.lock();
        let nodes = self.with(|s| {
            if s.disposed {
                return Vec::new();
            }
            s.disposed = true;
            s.subscriptions.clear();
            s.graph.drain_nodes()
        });

        let mut cleaned = 0;
        for mut node in nodes {
            if let Some(cleanup) = node.take_cleanup() {
                trace!(effect = %node.id(), "running effect cleanup");
                cleanup();
                cleaned += 1;
            }
        }
        debug!(cleanups = cleaned, "store disposed");
    }

    pub(crate) fn is_mounted(&self, id: AtomId) -> bool {
        self.with(|s| s.graph.node(id).is_some_and(|node| node.is_mounted()))
    }

    pub(crate) fn dependencies_of(&self, id: AtomId) -> Vec<AnyAtom> {
        self.with(|s| {
            let Some(node) = s.graph.node(id) else {
                return Vec::new();
            };
            node.dependencies()
                .keys()
                .filter_map(|dep| s.graph.node(*dep))
                .map(|dep| AnyAtom::from_inner(Arc::clone(dep.atom())))
                .collect()
        })
    }

    pub(crate) fn dependents_of(&self, id: AtomId) -> Vec<AnyAtom> {
        self.with(|s| {
            let Some(node) = s.graph.node(id) else {
                return Vec::new();
            };
            node.dependents()
                .iter()
                .filter_map(|dependent| s.graph.node(*dependent))
                .map(|dependent| AnyAtom::from_inner(Arc::clone(dependent.atom())))
                .collect()
        })
    }

    pub(crate) fn node_count(&self) -> usize {
        self.with(|s| s.graph.node_count())
    }
}

impl std::fmt::Debug for StoreCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.state.lock();
        let mut debug = f.debug_struct("StoreCore");
        match guard.try_borrow() {
            Ok(state) => debug
                .field("nodes", &state.graph.node_count())
                .field("subscriptions", &state.subscriptions.len())
                .field("disposed", &state.disposed),
            Err(_) => debug.field("state", &"<in use>"),
        };
        debug.field("options", &self.options).finish()
    }
}

/// An open tracking frame.
///
/// Closes the frame when dropped, so a panicking closure does not leave its
/// owner marked as evaluating.
struct FrameGuard<'a> {
    core: &'a StoreCore,
    owner: AtomId,
    open: bool,
}

impl<'a> FrameGuard<'a> {
    /// Open a frame for `atom`, or fail with a cycle error if it is already
    /// being evaluated.
    fn enter(core: &'a StoreCore, atom: &Arc<AtomInner>) -> Result<Self, StoreError> {
        if core.with(|s| s.graph.tracking.enter(atom.id())) {
            Ok(Self {
                core,
                owner: atom.id(),
                open: true,
            })
        } else {
            Err(StoreError::Cycle {
                atom: atom.describe(),
            })
        }
    }

    /// Close the frame and return what was read in it.
    fn exit(mut self) -> IndexMap<AtomId, u64> {
        self.open = false;
        let owner = self.owner;
        self.core
            .with(|s| s.graph.tracking.exit(owner))
            .unwrap_or_default()
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let guard = self.core.state.lock();
        if let Ok(mut state) = guard.try_borrow_mut() {
            state.graph.tracking.exit(self.owner);
        };
    }
}
