//! # Log Error Types

use strata_core::CoreError;
use thiserror::Error;

/// Errors that can occur while persisting or querying changes.
#[derive(Error, Debug)]
pub enum LogError {
    /// The underlying database failed.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A change value could not be built or decoded.
    #[error("change model error: {0}")]
    Model(#[from] CoreError),

    /// The logger has not been started.
    #[error("logger is not running")]
    NotRunning,

    /// The logger was already started.
    #[error("logger is already running")]
    AlreadyRunning,

    /// The driver thread could not be spawned.
    #[error("failed to spawn logger driver: {0}")]
    Spawn(#[from] std::io::Error),

    /// A query task was cancelled or panicked.
    #[error("query task failed: {0}")]
    QueryTask(String),
}

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;
