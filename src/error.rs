//! Error types for the state container.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `set_state` was called with an update that is neither a draft function
    /// nor a map, or an update produced a non-map top-level state.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// Slice access was requested beyond the single supported nesting level.
    #[error("Slice nesting not supported: {0}")]
    SliceNesting(String),

    /// A mutating operation was attempted after `destroy()`.
    #[error("Store has been destroyed")]
    Destroyed,

    /// A middleware aborted the update pipeline.
    #[error("Middleware error: {0}")]
    Middleware(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
