//! # Reverb
//!
//! A reactive state container: a single store of application state accessed
//! through immutable snapshots, with subscriber notification, middleware
//! interception, memoized derived values, and snapshot-based undo/redo.
//!
//! ## Core Concepts
//!
//! - **Store**: owns the current state, sequences updates, notifies subscribers
//! - **Updates**: shallow merges or copy-on-write draft functions
//! - **Middleware**: ordered interceptors on the commit path of every update
//! - **Selectors**: memoized pure projections of state
//! - **Slices**: scoped read/write views over a single state field
//! - **Snapshots**: bounded history with linear undo/redo and arbitrary jumps
//!
//! ## Example
//!
//! ```ignore
//! use reverb::{Store, StoreConfig, Update};
//! use serde_json::json;
//!
//! let store = Store::new(json!({"count": 0}), StoreConfig::default())?;
//!
//! let sub = store.subscribe(|next, prev| {
//!     println!("{:?} -> {:?}", prev.get("count"), next.get("count"));
//! });
//!
//! store.set_state(Update::merge(json!({"count": 1})))?;
//! sub.unsubscribe();
//! ```

pub mod error;
pub mod middleware;
pub mod selectors;
pub mod slice;
pub mod snapshots;
pub mod store;
pub mod types;
pub mod update;
pub mod value;

// Re-exports
pub use error::{Result, StoreError};
pub use middleware::{debounce, middleware, throttle, Middleware};
pub use selectors::{dep, DepFn, DerivedSelector, EqualityFn, MemoSelector};
pub use slice::Slice;
pub use snapshots::{Snapshot, SnapshotConfig, SnapshotManager};
pub use store::{Dispatcher, Listener, Store, StoreConfig, Subscription};
pub use types::{ListenerId, Timestamp};
pub use update::{DraftFn, Update};
pub use value::{identical, shallow_eq, State, Value, ValueMap};
