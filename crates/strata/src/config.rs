//! # Configuration
//!
//! One TOML document, every field optional:
//!
//! ```toml
//! [logger]
//! database = "strata.db"   # omitted: in-memory store
//! interval_ms = 1000
//! max_batch_size = 128
//!
//! [scheduler]
//! tick_allotment_ms = 50
//! target_time_ms = 65
//! parallel_workers = 1
//! backlog_threshold = 64
//! promote_after_ms = 1000
//! stale_after_ms = 60000
//!
//! [world]
//! min_y = 0
//! height = 256
//! host_version = "1.20"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use strata_log::LoggerConfig;
use strata_queue::{ChunkLayout, SchedulerConfig};

use crate::error::{StrataError, StrataResult};

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrataConfig {
    /// Change log settings.
    pub logger: LoggerSection,
    /// Block queue scheduler settings.
    pub scheduler: SchedulerSection,
    /// World shape and host version.
    pub world: WorldSection,
}

/// `[logger]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerSection {
    /// SQLite database file. `None` keeps the log in memory.
    pub database: Option<PathBuf>,
    /// Time between two drains (ms).
    pub interval_ms: u64,
    /// Maximum changes per batch.
    pub max_batch_size: usize,
}

impl Default for LoggerSection {
    fn default() -> Self {
        let defaults = LoggerConfig::production();
        Self {
            database: None,
            interval_ms: defaults.interval_ms,
            max_batch_size: defaults.max_batch_size,
        }
    }
}

impl LoggerSection {
    /// Logger tuning described by this section.
    #[must_use]
    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            interval_ms: self.interval_ms.max(1),
            max_batch_size: self.max_batch_size.max(1),
        }
    }
}

/// `[scheduler]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    /// Nominal time per host tick (ms).
    pub tick_allotment_ms: u64,
    /// Ceiling on one tick's drain time (ms).
    pub target_time_ms: u64,
    /// Concurrent drain workers per tick.
    pub parallel_workers: usize,
    /// Inactive backlog (chunks) that forces a promotion.
    pub backlog_threshold: usize,
    /// Idle time (ms) after which an inactive queue is promoted.
    pub promote_after_ms: i64,
    /// Idle time (ms) after which an empty inactive queue is dropped.
    pub stale_after_ms: i64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let defaults = SchedulerConfig::host();
        Self {
            tick_allotment_ms: defaults.tick_allotment_ms,
            target_time_ms: defaults.target_time_ms,
            parallel_workers: defaults.parallel_workers,
            backlog_threshold: defaults.backlog_threshold,
            promote_after_ms: defaults.promote_after_ms,
            stale_after_ms: defaults.stale_after_ms,
        }
    }
}

impl SchedulerSection {
    /// Scheduler tuning described by this section.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_allotment_ms: self.tick_allotment_ms,
            target_time_ms: self.target_time_ms,
            parallel_workers: self.parallel_workers.max(1),
            backlog_threshold: self.backlog_threshold,
            promote_after_ms: self.promote_after_ms,
            stale_after_ms: self.stale_after_ms,
        }
    }
}

/// `[world]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldSection {
    /// Lowest buildable Y.
    pub min_y: i32,
    /// Number of buildable Y levels, a multiple of 16.
    pub height: u32,
    /// Key into the backend registry.
    pub host_version: String,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            min_y: 0,
            height: 256,
            host_version: String::new(),
        }
    }
}

impl WorldSection {
    /// Vertical layout described by this section.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Queue`] if the height is not a positive
    /// multiple of 16.
    pub fn layout(&self) -> StrataResult<ChunkLayout> {
        Ok(ChunkLayout::new(self.min_y, self.height)?)
    }
}

impl StrataConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Config`] on malformed TOML or unknown keys.
    pub fn from_toml_str(document: &str) -> StrataResult<Self> {
        Ok(toml::from_str(document)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Io`] if the file cannot be read and
    /// [`StrataError::Config`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> StrataResult<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| StrataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&document)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
