//! Snapshot capture and time travel.

mod manager;

pub use manager::SnapshotManager;

use crate::types::Timestamp;
use crate::value::State;
use std::time::Duration;

/// An immutable capture of store state.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// The captured state.
    pub state: State,

    /// When the capture was taken.
    pub timestamp: Timestamp,

    /// Optional human-readable label.
    pub description: Option<String>,
}

/// Snapshot manager configuration.
#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    /// Oldest snapshots are evicted beyond this count (0 = unlimited).
    pub max_snapshots: usize,

    /// Capture a snapshot on a fixed interval.
    pub auto_snapshot: bool,

    /// Interval between auto-snapshots.
    pub auto_snapshot_interval: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_snapshots: 50,
            auto_snapshot: false,
            auto_snapshot_interval: Duration::from_secs(30),
        }
    }
}
