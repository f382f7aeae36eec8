//! Timing middleware: throttling and debouncing on the update path.
//!
//! Both defer work by resolving the current commit to the pre-update state
//! and scheduling a later dispatch that re-enters the store as an
//! independent update. Buffered state is last-write-wins; a timer that fires
//! with nothing pending is a no-op.

use crate::middleware::{middleware, Middleware};
use crate::update::Update;
use crate::value::State;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct ThrottleState {
    window_start: Option<Instant>,
    pending: Option<State>,
    timer_armed: bool,
    flushing: bool,
}

/// Pass the first update in each window through immediately; buffer later
/// ones (last write wins) and commit only the most recent at the window
/// boundary.
pub fn throttle(window: Duration) -> Middleware {
    let shared = Arc::new(Mutex::new(ThrottleState {
        window_start: None,
        pending: None,
        timer_armed: false,
        flushing: false,
    }));

    middleware(move |next, prev, dispatch| {
        let mut t = shared.lock();

        if t.flushing {
            // The scheduled flush re-entering the pipeline; in the
            // cooperative model it is the next update to run after the timer
            // fires. Starts a new window.
            t.flushing = false;
            t.window_start = Some(Instant::now());
            return Ok(None);
        }

        let now = Instant::now();
        match t.window_start {
            Some(start) if now.duration_since(start) < window => {
                t.pending = Some(next);
                if !t.timer_armed {
                    t.timer_armed = true;
                    let delay = window - now.duration_since(start);
                    let worker_state = Arc::clone(&shared);
                    let dispatch = dispatch.clone();
                    thread::spawn(move || {
                        thread::sleep(delay);
                        let buffered = {
                            let mut t = worker_state.lock();
                            t.timer_armed = false;
                            let buffered = t.pending.take();
                            if buffered.is_some() {
                                t.flushing = true;
                            }
                            buffered
                        };
                        if let Some(state) = buffered {
                            dispatch.dispatch(Update::replace(state));
                        }
                    });
                }
                // Hold this commit: resolve to the pre-update state.
                Ok(Some(prev.clone()))
            }
            _ => {
                t.window_start = Some(now);
                Ok(None)
            }
        }
    })
}

struct DebounceState {
    pending: Option<State>,
    generation: u64,
    flushing: bool,
}

/// Hold every update until no new one has arrived for `quiet`; then commit
/// only the most recent. Each update supersedes the previous buffered state
/// and re-arms the timer.
pub fn debounce(quiet: Duration) -> Middleware {
    let shared = Arc::new(Mutex::new(DebounceState {
        pending: None,
        generation: 0,
        flushing: false,
    }));

    middleware(move |next, prev, dispatch| {
        let mut d = shared.lock();

        if d.flushing {
            d.flushing = false;
            return Ok(None);
        }

        d.pending = Some(next);
        d.generation += 1;
        let generation = d.generation;

        let worker_state = Arc::clone(&shared);
        let dispatch = dispatch.clone();
        thread::spawn(move || {
            thread::sleep(quiet);
            let buffered = {
                let mut d = worker_state.lock();
                // A newer update re-armed the timer; this one is stale.
                if d.generation != generation {
                    return;
                }
                let buffered = d.pending.take();
                if buffered.is_some() {
                    d.flushing = true;
                }
                buffered
            };
            if let Some(state) = buffered {
                dispatch.dispatch(Update::replace(state));
            }
        });

        Ok(Some(prev.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreConfig};
    use serde_json::json;

    fn counting_store(mw: Middleware) -> (Store, Arc<Mutex<Vec<i64>>>) {
        let store = Store::new(
            json!({"count": 0}),
            StoreConfig {
                middleware: vec![mw],
                ..Default::default()
            },
        )
        .unwrap();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let changes2 = Arc::clone(&changes);
        store.subscribe(move |next, prev| {
            let next = next.get("count").and_then(|v| v.as_int());
            let prev = prev.get("count").and_then(|v| v.as_int());
            if let (Some(n), Some(p)) = (next, prev) {
                if n != p {
                    changes2.lock().push(n);
                }
            }
        });
        (store, changes)
    }

    #[test]
    fn test_throttle_first_update_passes_through() {
        let (store, changes) = counting_store(throttle(Duration::from_millis(200)));
        store.set_state(Update::merge(json!({"count": 1}))).unwrap();
        assert_eq!(*changes.lock(), vec![1]);
    }

    #[test]
    fn test_throttle_coalesces_to_last_write() {
        let (store, changes) = counting_store(throttle(Duration::from_millis(100)));

        store.set_state(Update::merge(json!({"count": 1}))).unwrap();
        store.set_state(Update::merge(json!({"count": 2}))).unwrap();
        store.set_state(Update::merge(json!({"count": 3}))).unwrap();

        // Buffered updates have not committed yet.
        assert_eq!(store.get_state().get("count").unwrap().as_int(), Some(1));

        thread::sleep(Duration::from_millis(250));
        assert_eq!(store.get_state().get("count").unwrap().as_int(), Some(3));
        // Exactly one additional commit, reflecting only the last payload.
        assert_eq!(*changes.lock(), vec![1, 3]);
    }

    #[test]
    fn test_debounce_commits_only_after_quiet_period() {
        let (store, changes) = counting_store(debounce(Duration::from_millis(80)));

        store.set_state(Update::merge(json!({"count": 1}))).unwrap();
        store.set_state(Update::merge(json!({"count": 2}))).unwrap();
        assert_eq!(store.get_state().get("count").unwrap().as_int(), Some(0));

        thread::sleep(Duration::from_millis(200));
        assert_eq!(store.get_state().get("count").unwrap().as_int(), Some(2));
        assert_eq!(*changes.lock(), vec![2]);
    }

    #[test]
    fn test_debounce_supersession() {
        let (store, changes) = counting_store(debounce(Duration::from_millis(100)));

        store.set_state(Update::merge(json!({"count": 1}))).unwrap();
        thread::sleep(Duration::from_millis(50));
        // Arrives inside the quiet period: supersedes the first and re-arms.
        store.set_state(Update::merge(json!({"count": 2}))).unwrap();
        thread::sleep(Duration::from_millis(60));
        // First timer has fired by now but found a newer generation: no-op.
        assert_eq!(store.get_state().get("count").unwrap().as_int(), Some(0));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(*changes.lock(), vec![2]);
    }
}
