//! Integration tests for the reactive store.

use parking_lot::Mutex;
use reverb::{
    dep, shallow_eq, DerivedSelector, MemoSelector, Store, StoreConfig, Update, Value,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn test_store() -> Store {
    Store::new(json!({"count": 0}), StoreConfig::default()).unwrap()
}

// --- Store Core ---

#[test]
fn test_counter_scenario() {
    let store = test_store();
    let notifications = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notifications);

    store.subscribe(move |next, prev| {
        let next: serde_json::Value = next.into();
        let prev: serde_json::Value = prev.into();
        sink.lock().push((next, prev));
    });

    store.set_state(Update::merge(json!({"count": 1}))).unwrap();

    assert_eq!(store.get_state().get("count").unwrap().as_int(), Some(1));
    let seen = notifications.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, json!({"count": 1}));
    assert_eq!(seen[0].1, json!({"count": 0}));
}

#[test]
fn test_listeners_notified_in_registration_order_exactly_once() {
    let store = test_store();
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in 1..=4 {
        let order = Arc::clone(&order);
        store.subscribe(move |_, _| order.lock().push(tag));
    }

    store.set_state(Update::merge(json!({"count": 1}))).unwrap();
    assert_eq!(*order.lock(), vec![1, 2, 3, 4]);
}

#[test]
fn test_same_closure_subscribed_twice_fires_twice() {
    let store = test_store();
    let hits = Arc::new(AtomicUsize::new(0));

    let hits2 = Arc::clone(&hits);
    let listener = move |_: &Value, _: &Value| {
        hits2.fetch_add(1, Ordering::SeqCst);
    };
    store.subscribe(listener.clone());
    store.subscribe(listener);

    store.set_state(Update::merge(json!({"count": 1}))).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unsubscribe_during_notification_skips_that_listener() {
    let store = test_store();
    let order = Arc::new(Mutex::new(Vec::new()));

    let order1 = Arc::clone(&order);
    let second: Arc<Mutex<Option<reverb::Subscription>>> = Arc::new(Mutex::new(None));
    let second2 = Arc::clone(&second);
    store.subscribe(move |_, _| {
        order1.lock().push("first");
        if let Some(sub) = second2.lock().as_ref() {
            sub.unsubscribe();
        }
    });

    let order2 = Arc::clone(&order);
    *second.lock() = Some(store.subscribe(move |_, _| order2.lock().push("second")));

    let order3 = Arc::clone(&order);
    store.subscribe(move |_, _| order3.lock().push("third"));

    store.set_state(Update::merge(json!({"count": 1}))).unwrap();

    // The deregistered listener never ran, the rest did, in order.
    assert_eq!(*order.lock(), vec!["first", "third"]);
}

#[test]
fn test_previous_state_is_unchanged_after_update() {
    let store = Store::new(
        json!({"profile": {"name": "ada"}, "count": 0}),
        StoreConfig::default(),
    )
    .unwrap();

    let before = store.get_state();
    let deep_copy: serde_json::Value = (&before).into();

    store
        .set_state(Update::mutate(|draft| {
            if let Some(profile) = draft.get_mut("profile") {
                profile.set("name", "grace");
            }
            draft.set("count", 1);
        }))
        .unwrap();

    let after_copy: serde_json::Value = (&before).into();
    assert_eq!(deep_copy, after_copy);
    assert_eq!(
        store
            .get_state()
            .get("profile")
            .unwrap()
            .get("name")
            .unwrap()
            .as_str(),
        Some("grace")
    );
}

#[test]
fn test_untouched_siblings_keep_their_allocation() {
    let store = Store::new(
        json!({"users": {"list": []}, "settings": {"theme": "dark"}}),
        StoreConfig::default(),
    )
    .unwrap();

    let before = store.get_state();
    store
        .set_state(Update::mutate(|draft| {
            if let Some(users) = draft.get_mut("users") {
                users.set("filter", "a");
            }
        }))
        .unwrap();
    let after = store.get_state();

    assert!(after
        .get("settings")
        .unwrap()
        .identical(before.get("settings").unwrap()));
    assert!(!after.get("users").unwrap().identical(before.get("users").unwrap()));
}

// --- Middleware ---

#[test]
fn test_middleware_runs_in_order_with_stable_prev() {
    let observed = Arc::new(Mutex::new(Vec::new()));

    let obs1 = Arc::clone(&observed);
    let first = reverb::middleware(move |next, prev, _| {
        obs1.lock().push((
            "first",
            next.get("count").and_then(|v| v.as_int()),
            prev.get("count").and_then(|v| v.as_int()),
        ));
        let mut next = next;
        next.set("count", 10);
        Ok(Some(next))
    });

    let obs2 = Arc::clone(&observed);
    let second = reverb::middleware(move |next, prev, _| {
        obs2.lock().push((
            "second",
            next.get("count").and_then(|v| v.as_int()),
            prev.get("count").and_then(|v| v.as_int()),
        ));
        Ok(None)
    });

    let store = Store::new(
        json!({"count": 0}),
        StoreConfig {
            middleware: vec![first, second],
            ..Default::default()
        },
    )
    .unwrap();

    store.set_state(Update::merge(json!({"count": 1}))).unwrap();

    // Second middleware sees the first's output as `next`, but `prev` stays
    // the pre-update state for the whole pipeline.
    assert_eq!(
        *observed.lock(),
        vec![("first", Some(1), Some(0)), ("second", Some(10), Some(0))]
    );
    assert_eq!(store.get_state().get("count").unwrap().as_int(), Some(10));
}

#[test]
fn test_middleware_none_keeps_candidate() {
    let passthrough = reverb::middleware(|_, _, _| Ok(None));
    let store = Store::new(
        json!({"count": 0}),
        StoreConfig {
            middleware: vec![passthrough],
            ..Default::default()
        },
    )
    .unwrap();

    store.set_state(Update::merge(json!({"count": 2}))).unwrap();
    // "No change" means the candidate passes through, not a revert to prev.
    assert_eq!(store.get_state().get("count").unwrap().as_int(), Some(2));
}

#[test]
fn test_middleware_dispatch_is_a_new_update() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = Arc::clone(&fired);
    let follow_up = reverb::middleware(move |next, _, dispatch| {
        if fired2.fetch_add(1, Ordering::SeqCst) == 0 {
            dispatch.dispatch(Update::merge(json!({"follow_up": true})));
        }
        Ok(Some(next))
    });

    let store = Store::new(
        json!({"count": 0}),
        StoreConfig {
            middleware: vec![follow_up],
            ..Default::default()
        },
    )
    .unwrap();

    let committed = store.set_state(Update::merge(json!({"count": 1}))).unwrap();

    // The dispatched update was not nested into the triggering one...
    assert!(committed.get("follow_up").is_none());
    // ...but ran right after it, through the pipeline again.
    assert_eq!(store.get_state().get("follow_up").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

// --- Selectors ---

#[test]
fn test_identity_memoization_across_store_updates() {
    let store = test_store();
    let runs = Arc::new(AtomicUsize::new(0));
    let runs2 = Arc::clone(&runs);

    let selector = MemoSelector::new(move |s: &Value| {
        runs2.fetch_add(1, Ordering::SeqCst);
        s.get("count").and_then(|v| v.as_int()).unwrap_or(0)
    });

    assert_eq!(store.select(|s| selector.eval(s)), 0);
    assert_eq!(store.select(|s| selector.eval(s)), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    store.set_state(Update::merge(json!({"count": 3}))).unwrap();
    assert_eq!(store.select(|s| selector.eval(s)), 3);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_dependency_selector_stability_across_unrelated_updates() {
    let store = Store::new(json!({"a": 1, "b": 1, "c": 1}), StoreConfig::default()).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let runs2 = Arc::clone(&runs);

    let selector = DerivedSelector::new(
        vec![
            dep(|s| s.get("a").cloned().unwrap_or(Value::Null)),
            dep(|s| s.get("b").cloned().unwrap_or(Value::Null)),
        ],
        move |deps| {
            runs2.fetch_add(1, Ordering::SeqCst);
            deps[0].as_int().unwrap_or(0) + deps[1].as_int().unwrap_or(0)
        },
    );

    assert_eq!(store.select(|s| selector.eval(s)), 2);

    // A field outside the dependency list changes: no recompute.
    store.set_state(Update::merge(json!({"c": 9}))).unwrap();
    assert_eq!(store.select(|s| selector.eval(s)), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // A covered field changes: recompute.
    store.set_state(Update::merge(json!({"b": 5}))).unwrap();
    assert_eq!(store.select(|s| selector.eval(s)), 6);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

// --- Filtered Subscriptions ---

#[test]
fn test_filtered_subscription_fires_only_on_selected_change() {
    let store = Store::new(json!({"watched": 0, "other": 0}), StoreConfig::default()).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = Arc::clone(&hits);

    store.subscribe_filtered(
        |s| s.get("watched").cloned().unwrap_or(Value::Null),
        shallow_eq,
        move |_, _| {
            hits2.fetch_add(1, Ordering::SeqCst);
        },
    );

    store.set_state(Update::merge(json!({"other": 1}))).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    store.set_state(Update::merge(json!({"watched": 1}))).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// --- Slices ---

#[test]
fn test_users_slice_scenario() {
    let store = Store::new(
        json!({"users": {"list": [], "filter": ""}}),
        StoreConfig::default(),
    )
    .unwrap();
    let users = store.slice("users");

    users.set_slice(Update::merge(json!({"filter": "a"}))).unwrap();

    let slice = users.get_slice();
    assert_eq!(slice.get("filter").unwrap().as_str(), Some("a"));
    assert_eq!(slice.get("list").unwrap().as_list().map(<[Value]>::len), Some(0));
}

#[test]
fn test_slice_writes_notify_store_listeners() {
    let store = Store::new(json!({"users": {"filter": ""}}), StoreConfig::default()).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = Arc::clone(&hits);
    store.subscribe(move |_, _| {
        hits2.fetch_add(1, Ordering::SeqCst);
    });

    store
        .slice("users")
        .set_slice(Update::merge(json!({"filter": "x"})))
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// --- Properties ---

mod properties {
    use super::*;
    use proptest::collection::hash_map;
    use proptest::prelude::*;

    fn patch_strategy() -> impl Strategy<Value = std::collections::HashMap<String, i64>> {
        hash_map("[a-e]", any::<i64>(), 0..5)
    }

    proptest! {
        /// For any sequence of shallow merges, states captured before an
        /// update are never mutated by it.
        #[test]
        fn merges_never_mutate_prior_states(patches in proptest::collection::vec(patch_strategy(), 1..8)) {
            let store = Store::new(json!({"seed": 0}), StoreConfig::default()).unwrap();
            let mut captured: Vec<(Value, serde_json::Value)> = Vec::new();

            for patch in patches {
                let state = store.get_state();
                let copy: serde_json::Value = (&state).into();
                captured.push((state, copy));

                let mut fields = reverb::ValueMap::new();
                for (k, v) in patch {
                    fields.insert(k, Value::Int(v));
                }
                store.set_state(Update::merge(Value::from(fields))).unwrap();
            }

            for (state, copy) in &captured {
                let now: serde_json::Value = state.into();
                prop_assert_eq!(&now, copy);
            }
        }
    }
}
