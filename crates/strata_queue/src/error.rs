//! # Queue Error Types

use thiserror::Error;

/// Errors raised by the block queues and the scheduler.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The vertical layout of the world is unusable.
    #[error("invalid chunk layout: {0}")]
    InvalidLayout(String),

    /// The worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// A synchronous flush was requested from the thread that drives ticks.
    #[error("flush must not run on the host loop thread")]
    FlushOnHostThread,

    /// The tick driver thread could not be spawned.
    #[error("failed to spawn tick driver: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Failure reported by a world backend while applying a chunk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The target world is not available.
    #[error("world {0} is not loaded")]
    WorldNotLoaded(String),

    /// The backend refused the chunk.
    #[error("chunk ({x}, {z}) rejected: {reason}")]
    Rejected {
        /// Chunk X.
        x: i32,
        /// Chunk Z.
        z: i32,
        /// Backend-specific reason.
        reason: String,
    },
}
