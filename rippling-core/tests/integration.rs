//! Integration Tests for the Store
//!
//! These tests verify that values, computeds and effects work together
//! through the public store API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rippling_core::{
    computed, effect, effect_with_cleanup, value, value_with_equals, AtomHandle, Cleanup, Computed,
    DebugStore, Effect, Store, StoreError, StoreOptions, Subscription, Value,
};

fn counter() -> Arc<AtomicI32> {
    Arc::new(AtomicI32::new(0))
}

/// An effect that counts its runs and reads `source`.
fn counting_effect(source: &Value<i32>, runs: &Arc<AtomicI32>) -> Effect {
    let (source, runs) = (source.clone(), runs.clone());
    effect(move |get, _| {
        runs.fetch_add(1, Ordering::SeqCst);
        get.get(&source)?;
        Ok(())
    })
}

/// A computed that doubles `source` and counts its runs.
fn counting_double(source: &Value<i32>, runs: &Arc<AtomicI32>) -> Computed<i32> {
    let (source, runs) = (source.clone(), runs.clone());
    computed(move |get| {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok(get.get(&source)? * 2)
    })
}

/// Test that a computed reflects a write made before the read.
#[test]
fn computed_reflects_prior_write() {
    let v = value(0);
    let c = counting_double(&v, &counter());
    let store = Store::new();

    store.set(&v, 5).unwrap();
    assert_eq!(store.get(&c).unwrap(), 10);
}

/// Test that an effect runs when subscribed and again after notify.
#[test]
fn effect_runs_on_sub_and_on_notify() {
    let v = value(0);
    let calls = counter();
    let e = counting_effect(&v, &calls);
    let store = Store::new();

    let _sub = store.sub(&v, &e).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    store.set(&v, 1).unwrap();
    // Writes alone never run effects.
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    store.notify();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Test that writing an equal value changes nothing.
#[test]
fn equal_write_is_a_noop() {
    let v = value(3);
    let computes = counter();
    let runs = counter();
    let c = counting_double(&v, &computes);
    let e = {
        let (c, runs) = (c.clone(), runs.clone());
        effect(move |get, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            get.get(&c)?;
            Ok(())
        })
    };
    let store = Store::new();
    let _sub = store.sub(&c, &e).unwrap();
    assert_eq!(computes.load(Ordering::SeqCst), 1);

    store.set(&v, 3).unwrap();
    store.notify();
    assert_eq!(store.get(&c).unwrap(), 6);
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Test that a custom equality decides what counts as a change.
#[test]
fn custom_equality_suppresses_writes() {
    let shared = Arc::new(vec![1, 2, 3]);
    let v = value_with_equals(Arc::clone(&shared), Arc::ptr_eq);
    let runs = counter();
    let e = {
        let (v, runs) = (v.clone(), runs.clone());
        effect(move |get, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            get.get(&v)?;
            Ok(())
        })
    };
    let store = Store::new();
    let _sub = store.sub(&v, &e).unwrap();

    // Same allocation: no change.
    store.set(&v, Arc::clone(&shared)).unwrap();
    store.notify();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Equal contents, new allocation: a change under reference equality.
    store.set(&v, Arc::new(vec![1, 2, 3])).unwrap();
    store.notify();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that an unmounted computed never runs unless read.
#[test]
fn unmounted_computed_is_lazy() {
    let v = value(0);
    let computes = counter();
    let c = counting_double(&v, &computes);
    let e = counting_effect(&v, &counter());
    let store = Store::new();
    let _sub = store.sub(&v, &e).unwrap();

    store.set(&v, 1).unwrap();
    store.set(&v, 2).unwrap();
    store.notify();
    assert_eq!(computes.load(Ordering::SeqCst), 0);

    assert_eq!(store.get(&c).unwrap(), 4);
    assert_eq!(computes.load(Ordering::SeqCst), 1);
}

/// Test that repeated reads of an unmounted computed are memoized.
#[test]
fn unmounted_computed_is_memoized_between_writes() {
    let v = value(1);
    let computes = counter();
    let c = counting_double(&v, &computes);
    let store = Store::new();

    assert_eq!(store.get(&c).unwrap(), 2);
    assert_eq!(store.get(&c).unwrap(), 2);
    assert_eq!(computes.load(Ordering::SeqCst), 1);

    store.set(&v, 2).unwrap();
    assert_eq!(store.get(&c).unwrap(), 4);
    assert_eq!(computes.load(Ordering::SeqCst), 2);
}

/// Test that a computed does not re-run when an atom it did not read changes.
#[test]
fn computed_ignores_unread_atoms() {
    let a = value(1);
    let b = value(1);
    let computes = counter();
    let c = counting_double(&a, &computes);
    let store = Store::new();

    // Unmounted.
    store.get(&c).unwrap();
    store.set(&b, 2).unwrap();
    store.get(&c).unwrap();
    assert_eq!(computes.load(Ordering::SeqCst), 1);

    // Mounted.
    let e = {
        let c = c.clone();
        effect(move |get, _| {
            get.get(&c)?;
            Ok(())
        })
    };
    let _sub = store.sub(&c, &e).unwrap();
    store.set(&b, 3).unwrap();
    store.notify();
    store.get(&c).unwrap();
    assert_eq!(computes.load(Ordering::SeqCst), 1);
}

/// Test that several writes before one notify run the effect once.
#[test]
fn writes_are_batched_until_notify() {
    let a = value(0);
    let runs = counter();
    let last_seen = Arc::new(AtomicI32::new(-1));
    let e = {
        let (a, runs, last_seen) = (a.clone(), runs.clone(), last_seen.clone());
        effect(move |get, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            last_seen.store(get.get(&a)?, Ordering::SeqCst);
            Ok(())
        })
    };
    let store = Store::new();
    let _sub = store.sub(&a, &e).unwrap();

    store.set(&a, 1).unwrap();
    store.set(&a, 2).unwrap();
    store.notify();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(last_seen.load(Ordering::SeqCst), 2);

    // Nothing pending: a second notify does nothing.
    store.notify();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that unsubscribing before notify cancels the pending run.
#[test]
fn unsubscribe_cancels_pending_run() {
    let v = value(0);
    let calls = counter();
    let e = counting_effect(&v, &calls);
    let store = Store::new();

    let sub = store.sub(&v, &e).unwrap();
    store.set(&v, 1).unwrap();
    sub.unsubscribe();
    store.notify();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test that a failing computed reports the error and recovers once fixed.
#[test]
fn computed_error_is_not_sticky() {
    let broken = value(true);
    let c = {
        let broken = broken.clone();
        computed(move |get| {
            if get.get(&broken)? {
                return Err("input is broken".into());
            }
            Ok(42)
        })
    };
    let store = Store::new();

    match store.get(&c) {
        Err(StoreError::Computation { source, .. }) => {
            assert_eq!(source.to_string(), "input is broken");
        }
        other => panic!("expected a computation error, got {other:?}"),
    }

    store.set(&broken, false).unwrap();
    assert_eq!(store.get(&c).unwrap(), 42);
}

/// Test that a failing computed re-runs when mounted and its input is fixed.
#[test]
fn mounted_computed_recovers_after_fix() {
    let broken = value(true);
    let c = {
        let broken = broken.clone();
        computed(move |get| {
            if get.get(&broken)? {
                return Err("input is broken".into());
            }
            Ok(1)
        })
    };
    let seen = Arc::new(AtomicI32::new(0));
    let e = {
        let (c, seen) = (c.clone(), seen.clone());
        effect(move |get, _| {
            seen.store(get.get(&c)?, Ordering::SeqCst);
            Ok(())
        })
    };
    let store = Store::new();

    // The first run fails; the subscription still stands.
    let _sub = store.sub(&c, &e).unwrap();
    assert!(store.is_mounted(&broken));
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    store.set(&broken, false).unwrap();
    store.notify();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

/// Test that mutually dependent computeds fail with a cycle error.
#[test]
fn cycle_is_detected() {
    let b_slot: Arc<OnceLock<Computed<i32>>> = Arc::new(OnceLock::new());
    let a = {
        let b_slot = b_slot.clone();
        computed(move |get| match b_slot.get() {
            Some(b) => Ok(get.get(b)?),
            None => Ok(0),
        })
    };
    let b = {
        let a = a.clone();
        computed(move |get| Ok(get.get(&a)?))
    };
    b_slot.set(b.clone()).unwrap();
    let store = Store::new();

    let err = store.get(&a).unwrap_err();
    assert!(err.is_cycle(), "unexpected error: {err}");
    assert!(store.get(&b).unwrap_err().is_cycle());

    // The store is still usable.
    let v = value(1);
    assert_eq!(store.get(&v).unwrap(), 1);
}

/// Test that a computed reading itself fails with a cycle error.
#[test]
fn self_reference_is_a_cycle() {
    let slot: Arc<OnceLock<Computed<i32>>> = Arc::new(OnceLock::new());
    let c = {
        let slot = slot.clone();
        computed(move |get| match slot.get() {
            Some(me) => Ok(get.get(me)?),
            None => Ok(0),
        })
    };
    slot.set(c.clone()).unwrap();

    assert!(Store::new().get(&c).unwrap_err().is_cycle());
}

/// Test that writing a computed is rejected.
#[test]
fn computed_is_not_writable() {
    let c = computed(|_| Ok(1));
    let store = Store::new();
    assert!(matches!(
        store.set_dyn(&c.erase(), 2),
        Err(StoreError::NotWritable { .. })
    ));
}

/// Test that cleanup runs before each re-run and on unsubscribe.
#[test]
fn effect_cleanup_lifecycle() {
    let v = value(0);
    let runs = counter();
    let cleanups = counter();
    let e = {
        let (v, runs, cleanups) = (v.clone(), runs.clone(), cleanups.clone());
        effect_with_cleanup(move |get, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            get.get(&v)?;
            let cleanups = cleanups.clone();
            let cleanup: Cleanup = Box::new(move || {
                cleanups.fetch_add(1, Ordering::SeqCst);
            });
            Ok(cleanup)
        })
    };
    let store = Store::new();

    let sub = store.sub(&v, &e).unwrap();
    assert_eq!(cleanups.load(Ordering::SeqCst), 0);

    store.set(&v, 1).unwrap();
    store.notify();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);

    sub.unsubscribe();
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
}

/// Test that writes made by effects are handled in the same flush.
#[test]
fn reentrant_writes_join_the_running_flush() {
    let a = value(0);
    let b = value(0);
    let forward = {
        let (a, b) = (a.clone(), b.clone());
        effect(move |get, set| {
            let n = get.get(&a)?;
            set.set(&b, n * 10)?;
            Ok(())
        })
    };
    let seen = Arc::new(AtomicI32::new(-1));
    let observe = {
        let (b, seen) = (b.clone(), seen.clone());
        effect(move |get, _| {
            seen.store(get.get(&b)?, Ordering::SeqCst);
            Ok(())
        })
    };
    let store = Store::new();
    let _s1 = store.sub(&a, &forward).unwrap();
    let _s2 = store.sub(&b, &observe).unwrap();

    store.set(&a, 4).unwrap();
    store.notify();

    assert_eq!(store.get(&b).unwrap(), 40);
    assert_eq!(seen.load(Ordering::SeqCst), 40);
}

/// Test that an effect invalidated twice within a flush runs once per round.
#[test]
fn reentrant_invalidations_coalesce() {
    let a = value(0);
    let b = value(0);
    let c = value(0);
    let fan_out = {
        let (a, b, c) = (a.clone(), b.clone(), c.clone());
        effect(move |get, set| {
            let n = get.get(&a)?;
            set.set(&b, n)?;
            set.set(&c, n)?;
            Ok(())
        })
    };
    let runs = counter();
    let sum = {
        let (b, c, runs) = (b.clone(), c.clone(), runs.clone());
        effect(move |get, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            get.get(&b)?;
            get.get(&c)?;
            Ok(())
        })
    };
    let store = Store::new();
    let _s1 = store.sub(&a, &fan_out).unwrap();
    let _s2 = store.sub(&b, &sum).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    store.set(&a, 1).unwrap();
    store.notify();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that an effect writing its own input forever is cut off.
#[test]
fn runaway_flush_is_bounded() {
    let n = value(0);
    let bump = {
        let n = n.clone();
        effect(move |get, set| {
            let current = get.get(&n)?;
            set.set(&n, current + 1)?;
            Ok(())
        })
    };
    let store = Store::with_options(StoreOptions { max_flush_rounds: 5 });

    let _sub = store.sub(&n, &bump).unwrap();
    assert_eq!(store.get(&n).unwrap(), 1);

    store.notify();
    assert_eq!(store.get(&n).unwrap(), 6);

    // The abandoned flush left the store idle and usable.
    store.notify();
    assert_eq!(store.get(&n).unwrap(), 6);
    store.set(&n, 100).unwrap();
    store.notify();
    assert_eq!(store.get(&n).unwrap(), 105);
}

/// Test that an effect cut off by the flush bound runs again on a later write.
#[test]
fn abandoned_effect_runs_on_next_write() {
    let n = value(0);
    let trigger = value(());
    let runs = counter();
    let bump = {
        let (n, runs) = (n.clone(), runs.clone());
        effect(move |get, set| {
            runs.fetch_add(1, Ordering::SeqCst);
            let current = get.get(&n)?;
            set.set(&n, current + 1)?;
            Ok(())
        })
    };
    let store = Store::with_options(StoreOptions { max_flush_rounds: 5 });

    // Subscribed to `trigger`: `n` reaches the effect only through its read.
    let _sub = store.sub(&trigger, &bump).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    store.set(&n, 10).unwrap();
    store.notify();
    assert_eq!(store.get(&n).unwrap(), 15);
    assert_eq!(runs.load(Ordering::SeqCst), 6);

    store.set(&n, 2000).unwrap();
    store.notify();
    assert_eq!(runs.load(Ordering::SeqCst), 11);
    assert_eq!(store.get(&n).unwrap(), 2005);
}

/// Test that an effect subscribed to a computed it never reads keeps firing.
#[test]
fn listener_of_unread_computed_fires_on_every_change() {
    let v = value(0);
    let doubled = counting_double(&v, &counter());
    let runs = counter();
    let ping = {
        let runs = runs.clone();
        effect(move |_, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };
    let store = Store::new();

    let _sub = store.sub(&doubled, &ping).unwrap();
    let mut seen = vec![runs.load(Ordering::SeqCst)];
    for i in 1..=3 {
        store.set(&v, i).unwrap();
        store.notify();
        seen.push(runs.load(Ordering::SeqCst));
    }

    assert_eq!(seen, vec![1, 2, 3, 4]);
}

/// Test that an effect can subscribe and unsubscribe other effects while it runs.
#[test]
fn effect_manages_subscriptions_while_running() {
    let show = value(false);
    let input = value(0);
    let inner_runs = counter();
    let inner = counting_effect(&input, &inner_runs);
    let store = Store::new();
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let outer = {
        let (show, input, inner, store, slot) =
            (show.clone(), input.clone(), inner.clone(), store.clone(), slot.clone());
        effect(move |get, _| {
            let dropped = if get.get(&show)? {
                let mut held = slot.lock();
                if held.is_none() {
                    *held = Some(store.sub(&input, &inner)?);
                }
                None
            } else {
                slot.lock().take()
            };
            drop(dropped);
            Ok(())
        })
    };

    let _sub = store.sub(&show, &outer).unwrap();
    assert!(!store.is_mounted(&inner));

    store.set(&show, true).unwrap();
    store.notify();
    assert!(store.is_mounted(&inner));
    assert_eq!(inner_runs.load(Ordering::SeqCst), 1);

    store.set(&input, 1).unwrap();
    store.notify();
    assert_eq!(inner_runs.load(Ordering::SeqCst), 2);

    store.set(&show, false).unwrap();
    store.notify();
    assert!(!store.is_mounted(&inner));
    assert!(!store.is_mounted(&input));

    store.set(&input, 2).unwrap();
    store.notify();
    assert_eq!(inner_runs.load(Ordering::SeqCst), 2);
}

/// Test that a failing effect does not stop the rest of the flush.
#[test]
fn effect_failure_is_isolated() {
    let v = value(0);
    let failing = {
        let v = v.clone();
        effect(move |get, _| {
            if get.get(&v)? > 0 {
                return Err("effect failed".into());
            }
            Ok(())
        })
    };
    let calls = counter();
    let healthy = counting_effect(&v, &calls);
    let store = Store::new();
    let _s1 = store.sub(&v, &failing).unwrap();
    let _s2 = store.sub(&v, &healthy).unwrap();

    store.set(&v, 1).unwrap();
    store.notify();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // The failed effect is retried on its next invalidation.
    store.set(&v, 0).unwrap();
    store.notify();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Test that conditional reads re-track dependencies on every run.
#[test]
fn dependencies_follow_conditional_reads() {
    let flag = value(true);
    let x = value(1);
    let y = value(2);
    let computes = counter();
    let pick = {
        let (flag, x, y, computes) = (flag.clone(), x.clone(), y.clone(), computes.clone());
        computed(move |get| {
            computes.fetch_add(1, Ordering::SeqCst);
            let source = if get.get(&flag)? { &x } else { &y };
            Ok(get.get(source)?)
        })
    };
    let e = {
        let pick = pick.clone();
        effect(move |get, _| {
            get.get(&pick)?;
            Ok(())
        })
    };
    let store = Store::new();
    let _sub = store.sub(&pick, &e).unwrap();
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    assert!(store.is_mounted(&x));
    assert!(!store.is_mounted(&y));

    store.set(&y, 20).unwrap();
    store.notify();
    assert_eq!(computes.load(Ordering::SeqCst), 1);

    store.set(&flag, false).unwrap();
    store.notify();
    assert_eq!(store.get(&pick).unwrap(), 20);
    assert_eq!(computes.load(Ordering::SeqCst), 2);
    assert!(!store.is_mounted(&x));
    assert!(store.is_mounted(&y));

    // `x` is no longer read, so it no longer invalidates.
    store.set(&x, 10).unwrap();
    store.notify();
    assert_eq!(computes.load(Ordering::SeqCst), 2);
}

/// Test that a diamond-shaped graph updates consistently.
#[test]
fn diamond_sees_consistent_values() {
    let base = value(1);
    let left = {
        let base = base.clone();
        computed(move |get| Ok(get.get(&base)? + 1))
    };
    let right = {
        let base = base.clone();
        computed(move |get| Ok(get.get(&base)? * 10))
    };
    let runs = counter();
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let top = {
        let (left, right, runs, snapshots) =
            (left.clone(), right.clone(), runs.clone(), snapshots.clone());
        effect(move |get, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            let pair = (get.get(&left)?, get.get(&right)?);
            snapshots.lock().push(pair);
            Ok(())
        })
    };
    let store = Store::new();
    let _sub = store.sub(&base, &top).unwrap();

    store.set(&base, 2).unwrap();
    store.notify();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(*snapshots.lock(), vec![(2, 10), (3, 20)]);
}

/// Test that shared dependencies stay mounted until the last subscriber leaves.
#[test]
fn mount_is_reference_counted() {
    let base = value(0);
    let c = {
        let base = base.clone();
        computed(move |get| Ok(get.get(&base)?))
    };
    let e1 = effect(|_, _| Ok(()));
    let e2 = effect(|_, _| Ok(()));
    let store = Store::new();

    let s1 = store.sub(&c, &e1).unwrap();
    let s2 = store.sub(&c, &e2).unwrap();
    assert!(store.is_mounted(&base));

    s1.unsubscribe();
    assert!(store.is_mounted(&c));
    assert!(store.is_mounted(&base));

    s2.unsubscribe();
    assert!(!store.is_mounted(&c));
    assert!(!store.is_mounted(&base));
}

/// Test that an effect unsubscribed by an earlier effect in the batch does not run.
#[test]
fn effect_unsubscribed_mid_flush_is_skipped() {
    let v = value(0);
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let first = {
        let (v, slot) = (v.clone(), slot.clone());
        effect(move |get, _| {
            get.get(&v)?;
            let dropped = slot.lock().take();
            drop(dropped);
            Ok(())
        })
    };
    let calls = counter();
    let second = counting_effect(&v, &calls);
    let store = Store::new();

    let _s1 = store.sub(&v, &first).unwrap();
    *slot.lock() = Some(store.sub(&v, &second).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    store.set(&v, 1).unwrap();
    store.notify();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!store.is_mounted(&second));
}

/// Test that a computed read while unmounted and then mounted is not stale.
#[test]
fn computed_mounted_after_a_write_is_refreshed() {
    let x = value(0);
    let doubled = counting_double(&x, &counter());
    let trigger = value(());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let e = {
        let (x, doubled, seen) = (x.clone(), doubled.clone(), seen.clone());
        effect(move |get, set| {
            let d = get.get(&doubled)?;
            seen.lock().push(d);
            if d == 0 {
                // Written after the read: `doubled` is behind once mounted.
                set.set(&x, 1)?;
            }
            Ok(())
        })
    };
    let store = Store::new();
    let _sub = store.sub(&trigger, &e).unwrap();

    store.notify();
    assert_eq!(*seen.lock(), vec![0, 2]);
    assert_eq!(store.get(&doubled).unwrap(), 2);
}

/// Test that the debug store behaves exactly like a plain store.
#[test]
fn debug_store_matches_plain_store() {
    fn scenario(store: &Store) -> (i32, i32) {
        let v = value(0);
        let calls = counter();
        let c = counting_double(&v, &counter());
        let e = counting_effect(&v, &calls);
        let _sub = store.sub(&v, &e).unwrap();
        store.set(&v, 7).unwrap();
        store.notify();
        (store.get(&c).unwrap(), calls.load(Ordering::SeqCst))
    }

    let debug = DebugStore::new();
    assert_eq!(scenario(&Store::new()), scenario(&debug));
    assert!(debug.event_count() > 0);
}

/// Test that the store is shared safely across threads.
#[test]
fn store_is_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Store>();
    assert_send_sync::<DebugStore>();
    assert_send_sync::<Value<i32>>();
    assert_send_sync::<Computed<String>>();
    assert_send_sync::<Effect>();
    assert_send_sync::<Subscription>();

    let count = value(0);
    let store = Store::new();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (store, count) = (store.clone(), count.clone());
            std::thread::spawn(move || {
                for _ in 0..100 {
                    store.update(&count, |n| n + 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.get(&count).unwrap(), 400);
}
