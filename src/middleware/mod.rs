//! Middleware: interceptors on the commit path of every update.

mod timing;

pub use timing::{debounce, throttle};

use crate::error::Result;
use crate::store::Dispatcher;
use crate::value::State;
use std::sync::Arc;

/// A middleware function.
///
/// Called with the candidate next state (the cumulative output of the
/// middlewares before it), the state from before the update began, and a
/// dispatcher for deferred follow-up updates.
///
/// - `Ok(None)` passes the candidate through unchanged (never "revert").
/// - `Ok(Some(state))` replaces the candidate for the rest of the pipeline.
/// - `Err` aborts the pipeline; nothing commits and the error propagates to
///   the `set_state` caller.
pub type Middleware =
    Arc<dyn Fn(State, &State, &Dispatcher) -> Result<Option<State>> + Send + Sync>;

/// Wrap a closure as a [`Middleware`].
pub fn middleware(
    f: impl Fn(State, &State, &Dispatcher) -> Result<Option<State>> + Send + Sync + 'static,
) -> Middleware {
    Arc::new(f)
}
