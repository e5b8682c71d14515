//! # Workspace Error Types
//!
//! Faults that can escape a component. Per-command failures never show up
//! here: they travel as data inside the dispatch crate's `HandlerResult`.

use thiserror::Error;

/// Errors that can escape a TWINFRAME component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TwinframeError {
    /// The command queue was at capacity and the command was dropped.
    #[error("command queue full: capacity {capacity}")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The worker did not acknowledge shutdown in time and was abandoned.
    #[error("worker did not shut down within {waited_ms}ms, thread abandoned")]
    WorkerShutdownTimeout {
        /// How long the owner waited before giving up.
        waited_ms: u64,
    },

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A script could not be read or compiled.
    #[error("script load failed: {0}")]
    ScriptLoad(String),
}

/// Result type for TWINFRAME operations.
pub type TwinframeResult<T> = Result<T, TwinframeError>;
