//! # STRATA Change Log
//!
//! Append-only, batched persistence of [`strata_core::Change`] values and
//! the query engine that reads them back.
//!
//! ## Data Flow
//!
//! ```text
//! log_change ──> FIFO ──> driver (every interval) ──> SqliteChangeStore
//!                                                          │
//! ChangeQuery ──> build() ──> query_changes (blocking pool) ┘──> Vec<Change>
//! ```
//!
//! The loss window on a crash is bounded by one drive interval.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod error;
pub mod logger;
pub mod sqlite;

pub use backend::{ChangeBackend, ChangeBatch, NameSourceResolver, SourceResolver};
pub use error::{LogError, LogResult};
pub use logger::{DrainReport, LoggerConfig, LoggerStats, ScheduledChangeLogger};
pub use sqlite::{SqliteBatch, SqliteChangeStore};

/// Logger persisting into SQLite.
pub type SqliteChangeLogger = ScheduledChangeLogger<SqliteChangeStore>;
