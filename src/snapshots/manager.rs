//! Linear undo/redo history over store snapshots.

use super::{Snapshot, SnapshotConfig};
use crate::error::Result;
use crate::store::Store;
use crate::types::Timestamp;
use crate::update::Update;
use crate::value::State;
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Ordered snapshot sequence plus cursor.
///
/// Invariant: once at least one snapshot exists, the cursor is a valid index
/// into the sequence. The manager captures an initial snapshot at
/// construction, so the invariant holds for its whole lifetime.
struct History {
    snapshots: Vec<Snapshot>,
    cursor: usize,
}

impl History {
    /// Capture `state`: truncate any stale redo branch after the cursor,
    /// append, advance the cursor, and evict the oldest entries beyond `max`.
    fn record(&mut self, state: State, description: Option<String>, max: usize) -> Snapshot {
        if self.cursor + 1 < self.snapshots.len() {
            self.snapshots.truncate(self.cursor + 1);
        }
        self.snapshots.push(Snapshot {
            state,
            timestamp: Timestamp::now(),
            description,
        });
        self.cursor = self.snapshots.len() - 1;
        while max > 0 && self.snapshots.len() > max {
            self.snapshots.remove(0);
            self.cursor -= 1;
        }
        self.snapshots[self.cursor].clone()
    }
}

/// Maintains an ordered history of state captures with a cursor, supporting
/// linear undo/redo and arbitrary jumps.
///
/// Restoring a snapshot is a normal store update: it passes through the
/// middleware pipeline and triggers listener notification like any other
/// `set_state` call.
pub struct SnapshotManager {
    store: Store,
    config: SnapshotConfig,
    history: Arc<Mutex<History>>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SnapshotManager {
    /// Create a manager and capture the initial snapshot. When
    /// `auto_snapshot` is enabled, a worker thread captures an
    /// "Auto snapshot" every interval, unconditionally, whether or not the
    /// state changed since the last capture.
    pub fn new(store: Store, config: SnapshotConfig) -> Self {
        let history = Arc::new(Mutex::new(History {
            snapshots: Vec::new(),
            cursor: 0,
        }));
        history.lock().record(
            store.get_state(),
            Some("Initial state".to_string()),
            config.max_snapshots,
        );

        let (shutdown, worker) = if config.auto_snapshot {
            let (tx, rx) = bounded::<()>(1);
            let ticker = crossbeam_channel::tick(config.auto_snapshot_interval);
            let worker_store = store.clone();
            let worker_history = Arc::clone(&history);
            let max = config.max_snapshots;
            let handle = std::thread::spawn(move || loop {
                crossbeam_channel::select! {
                    recv(ticker) -> _ => {
                        worker_history.lock().record(
                            worker_store.get_state(),
                            Some("Auto snapshot".to_string()),
                            max,
                        );
                    }
                    recv(rx) -> _ => break,
                }
            });
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        Self {
            store,
            config,
            history,
            shutdown,
            worker,
        }
    }

    /// Capture the current store state as a new snapshot. Taking a snapshot
    /// while the cursor is not at the end discards everything after the
    /// cursor: redo history is invalidated by the new branch.
    pub fn take_snapshot(&self, description: Option<&str>) -> Snapshot {
        self.history.lock().record(
            self.store.get_state(),
            description.map(String::from),
            self.config.max_snapshots,
        )
    }

    /// Restore the state captured at `index` and move the cursor there.
    /// `Ok(false)` when the index is out of bounds.
    pub fn apply_snapshot(&self, index: usize) -> Result<bool> {
        let state = {
            let history = self.history.lock();
            match history.snapshots.get(index) {
                Some(snapshot) => snapshot.state.clone(),
                None => return Ok(false),
            }
        };
        self.store.set_state(Update::replace(state))?;
        self.history.lock().cursor = index;
        Ok(true)
    }

    /// Step the cursor back one snapshot. `Ok(false)` when already at the
    /// oldest entry.
    pub fn undo(&self) -> Result<bool> {
        let target = {
            let history = self.history.lock();
            if history.cursor == 0 {
                return Ok(false);
            }
            history.cursor - 1
        };
        self.apply_snapshot(target)
    }

    /// Step the cursor forward one snapshot. `Ok(false)` when already at the
    /// newest entry.
    pub fn redo(&self) -> Result<bool> {
        let target = {
            let history = self.history.lock();
            if history.cursor + 1 >= history.snapshots.len() {
                return Ok(false);
            }
            history.cursor + 1
        };
        self.apply_snapshot(target)
    }

    /// Whether `undo` would move the cursor.
    pub fn can_undo(&self) -> bool {
        self.history.lock().cursor > 0
    }

    /// Whether `redo` would move the cursor.
    pub fn can_redo(&self) -> bool {
        let history = self.history.lock();
        history.cursor + 1 < history.snapshots.len()
    }

    /// All snapshots, oldest first.
    pub fn get_snapshots(&self) -> Vec<Snapshot> {
        self.history.lock().snapshots.clone()
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.history.lock().cursor
    }

    /// Number of snapshots currently held.
    pub fn snapshot_count(&self) -> usize {
        self.history.lock().snapshots.len()
    }

    /// Reset the history to a single fresh capture of the current state, so
    /// the cursor invariant keeps holding unconditionally.
    pub fn clear_snapshots(&self) {
        let mut history = self.history.lock();
        history.snapshots.clear();
        history.cursor = 0;
        history.record(
            self.store.get_state(),
            Some("Initial state".to_string()),
            self.config.max_snapshots,
        );
    }
}

impl Drop for SnapshotManager {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
