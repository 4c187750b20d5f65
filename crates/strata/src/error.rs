//! # Error Types

use std::path::PathBuf;

use strata_core::{CoreError, CuboidRegion};
use strata_log::LogError;
use strata_queue::QueueError;
use thiserror::Error;

/// Errors surfaced by the facade and the restoration orchestrator.
#[derive(Error, Debug)]
pub enum StrataError {
    /// Another restoration holds an overlapping region in the same world.
    #[error("region {region:?} in {world} is already being restored")]
    RegionLocked {
        /// World of the refused restoration.
        world: String,
        /// Region of the refused restoration.
        region: CuboidRegion,
    },

    /// No backend is registered for the host version.
    #[error("no world backend registered for host version {0:?}")]
    UnknownHostVersion(String),

    /// A change set or query failed validation.
    #[error(transparent)]
    Model(#[from] CoreError),

    /// Persisting or querying changes failed.
    #[error(transparent)]
    Log(#[from] LogError),

    /// The scheduler refused an operation.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The configuration document is malformed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },
}

/// Result type for facade operations.
pub type StrataResult<T> = Result<T, StrataError>;
