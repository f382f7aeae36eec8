//! The store core: state ownership, update sequencing, and notification.

use crate::error::{Result, StoreError};
use crate::middleware::Middleware;
use crate::types::ListenerId;
use crate::update::{self, Update};
use crate::value::{State, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

/// Listener callback, invoked with `(next, prev)` after every commit.
pub type Listener = Arc<dyn Fn(&State, &State) + Send + Sync>;

/// Store configuration.
#[derive(Clone)]
pub struct StoreConfig {
    /// Name used in log output.
    pub name: String,

    /// Middleware applied to every update, in registration order.
    pub middleware: Vec<Middleware>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            middleware: Vec::new(),
        }
    }
}

/// A reactive state container.
///
/// Owns the current state, applies updates through the middleware pipeline,
/// and notifies subscribers after every commit. `Store` is a cheap-to-clone
/// handle; clones share the same underlying store.
///
/// The whole update path (engine, pipeline, commit, notification) runs to
/// completion under one update lock before the next update may begin.
/// Calling [`Store::set_state`] from inside a listener or middleware does not
/// nest: the update is deferred and runs after the one in flight (use
/// [`Store::dispatcher`] for the same effect with an owned handle).
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("destroyed", &self.inner.destroyed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

pub(crate) struct StoreInner {
    name: String,

    /// Middleware chain, fixed at construction.
    middleware: Vec<Middleware>,

    /// Current state. Replaced wholesale on every commit, never mutated.
    state: RwLock<State>,

    /// Registered listeners in registration order.
    listeners: Mutex<Vec<(ListenerId, Listener)>>,

    /// Counter for listener ids.
    next_listener_id: AtomicU64,

    /// One-way Active -> Destroyed flag.
    destroyed: AtomicBool,

    /// Serializes the whole update path.
    update_lock: Mutex<()>,

    /// Thread currently driving the update path, for re-entrancy detection.
    driver: Mutex<Option<ThreadId>>,

    /// Updates deferred via [`Dispatcher`], run after the one in flight.
    pending: Mutex<VecDeque<Update>>,
}

/// Resets the driver marker even if an update panics out of the lock.
struct DriverGuard<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for DriverGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

impl Store {
    /// Create a store owning `initial` state.
    ///
    /// The initial state must be a map; anything else is rejected with
    /// [`StoreError::InvalidUpdate`].
    pub fn new(initial: impl Into<Value>, config: StoreConfig) -> Result<Self> {
        let initial = initial.into();
        if !matches!(initial, Value::Map(_)) {
            return Err(StoreError::InvalidUpdate(format!(
                "initial state must be a map, got {}",
                initial.type_name()
            )));
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                name: config.name,
                middleware: config.middleware,
                state: RwLock::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                destroyed: AtomicBool::new(false),
                update_lock: Mutex::new(()),
                driver: Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
            }),
        })
    }

    /// Current state. O(1): a clone of the shared top-level value.
    pub fn get_state(&self) -> State {
        self.inner.state.read().clone()
    }

    /// Apply an update: engine, middleware pipeline, commit, notification.
    ///
    /// Every middleware receives the pre-update state as `prev` and the
    /// cumulative output of the middlewares before it as `next`. Listeners
    /// are notified synchronously in registration order with `(next, prev)`;
    /// a panicking listener is isolated and reported, never aborting the
    /// notification of the rest.
    ///
    /// Fails fast with [`StoreError::Destroyed`] after [`Store::destroy`].
    /// Returns the committed state.
    pub fn set_state(&self, update: Update) -> Result<State> {
        self.ensure_active()?;

        let me = thread::current().id();
        if *self.inner.driver.lock() == Some(me) {
            // Re-entrant call from a listener or middleware: defer as a new,
            // independent update sequenced after the one in flight.
            self.inner.pending.lock().push_back(update);
            return Ok(self.get_state());
        }

        let _guard = self.inner.update_lock.lock();
        self.inner.drive(update)
    }

    /// Register a listener. Returns a capability to deregister; dropping the
    /// handle does NOT unsubscribe. The same closure registered twice is two
    /// distinct subscriptions. Subscribing after `destroy()` returns an inert
    /// handle that never fires.
    pub fn subscribe(&self, listener: impl Fn(&State, &State) + Send + Sync + 'static) -> Subscription {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst));
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Subscription { id, inner: Weak::new() };
        }
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Register a listener that only fires when a selected projection of the
    /// state changes (compared with `equality`). The projection is captured
    /// at subscription time to seed the comparison.
    pub fn subscribe_filtered(
        &self,
        selector: impl Fn(&State) -> Value + Send + Sync + 'static,
        equality: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
        listener: impl Fn(&State, &State) + Send + Sync + 'static,
    ) -> Subscription {
        let last = Mutex::new(selector(&self.get_state()));
        self.subscribe(move |next, prev| {
            let current = selector(next);
            let mut last = last.lock();
            if equality(&last, &current) {
                return;
            }
            *last = current;
            listener(next, prev);
        })
    }

    /// Synchronous selector application against the current state. Pure: no
    /// subscription side effect. Selector panics propagate to the caller.
    pub fn select<R>(&self, selector: impl FnOnce(&State) -> R) -> R {
        let state = self.get_state();
        selector(&state)
    }

    /// Handle for deferred, re-entrant updates (timer callbacks, middleware
    /// follow-ups). Dispatched updates run as independent updates sequenced
    /// after whatever update is in flight; their errors are logged rather
    /// than propagated, since there is no caller to receive them.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Destroy the store: releases all listeners and drops any pending
    /// deferred updates. One-way; all subsequent mutating operations fail
    /// fast with [`StoreError::Destroyed`]. Reads remain valid.
    pub fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        self.inner.listeners.lock().clear();
        self.inner.pending.lock().clear();
        tracing::debug!(store = %self.inner.name, "store destroyed");
    }

    /// Whether `destroy()` has been called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Store name (used in log output).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn ensure_active(&self) -> Result<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            Err(StoreError::Destroyed)
        } else {
            Ok(())
        }
    }
}

impl StoreInner {
    /// Run one update plus any updates deferred during it. Caller must hold
    /// the update lock.
    fn drive(self: &Arc<Self>, update: Update) -> Result<State> {
        *self.driver.lock() = Some(thread::current().id());
        let _reset = DriverGuard(&self.driver);

        let dispatcher = Dispatcher {
            inner: Arc::downgrade(self),
        };
        let result = self.run_update(update, &dispatcher);
        self.drain_pending(&dispatcher);
        result
    }

    /// Drain the deferred-update queue. Caller must hold the update lock.
    fn drain_pending(&self, dispatcher: &Dispatcher) {
        loop {
            let update = self.pending.lock().pop_front();
            let Some(update) = update else { break };
            if let Err(e) = self.run_update(update, dispatcher) {
                tracing::warn!(store = %self.name, error = %e, "deferred update failed");
            }
        }
    }

    /// Engine -> pipeline -> commit -> notify, as one atomic sequence.
    fn run_update(&self, update: Update, dispatcher: &Dispatcher) -> Result<State> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(StoreError::Destroyed);
        }

        let prev = self.state.read().clone();
        let mut next = update::apply(&prev, update)?;

        // Every middleware sees the same pre-update state as `prev`; `next`
        // is the cumulative output of the middlewares before it. An error
        // aborts the pipeline and nothing commits.
        for mw in &self.middleware {
            if let Some(replaced) = (**mw)(next.clone(), &prev, dispatcher)? {
                next = replaced;
            }
        }
        if !matches!(next, Value::Map(_)) {
            return Err(StoreError::InvalidUpdate(format!(
                "middleware produced {}, expected a map",
                next.type_name()
            )));
        }

        *self.state.write() = next.clone();
        tracing::debug!(store = %self.name, "state committed");

        self.notify(&next, &prev);
        Ok(next)
    }

    /// Notify listeners in registration order with `(next, prev)`.
    fn notify(&self, next: &State, prev: &State) {
        let entries: Vec<(ListenerId, Listener)> = self.listeners.lock().clone();
        for (id, listener) in entries {
            // A listener deregistered mid-notification is skipped even though
            // it was captured before notification began.
            let still_registered = self.listeners.lock().iter().any(|(lid, _)| *lid == id);
            if !still_registered {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| (*listener)(next, prev))).is_err() {
                tracing::error!(store = %self.name, listener = %id, "listener panicked during notification");
            }
        }
    }
}

/// Capability to deregister a listener.
pub struct Subscription {
    id: ListenerId,
    inner: Weak<StoreInner>,
}

impl Subscription {
    /// Deregister the listener. Idempotent: a second call (or a call racing
    /// `destroy`) is a no-op and never disturbs other subscriptions.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.lock().retain(|(lid, _)| *lid != self.id);
        }
    }

    /// The listener's id.
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

/// Handle for deferred re-entrant updates. Holds only a weak reference, so
/// timer threads never keep a dropped store alive.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Weak<StoreInner>,
}

impl Dispatcher {
    /// Enqueue an independent update. If no update is in flight it runs
    /// immediately on this thread; otherwise the in-flight driver runs it
    /// after committing. Errors are logged, not returned.
    pub fn dispatch(&self, update: Update) {
        let Some(inner) = self.inner.upgrade() else {
            tracing::warn!("dispatch dropped: store is gone");
            return;
        };
        if inner.destroyed.load(Ordering::SeqCst) {
            tracing::warn!(store = %inner.name, "dispatch dropped: store destroyed");
            return;
        }

        inner.pending.lock().push_back(update);
        loop {
            // If an update is in flight its driver drains the queue after
            // committing; otherwise become the driver here.
            let Some(guard) = inner.update_lock.try_lock() else {
                return;
            };
            *inner.driver.lock() = Some(thread::current().id());
            let reset = DriverGuard(&inner.driver);
            inner.drain_pending(self);
            drop(reset);
            drop(guard);
            // Re-check: a dispatch that raced the lock release would
            // otherwise languish until the next update.
            if inner.pending.lock().is_empty() {
                return;
            }
        }
    }
}
