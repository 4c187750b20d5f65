//! # STRATA
//!
//! **Block change logging and time-budgeted world restoration.**
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Strata                                  │
//! │                                                                      │
//! │  log_change ──> ScheduledChangeLogger ──(1s batches)──> SQLite       │
//! │                                                           │          │
//! │  query / lookup <──────── async, off the host thread ─────┘          │
//! │        │                                                             │
//! │        ▼                                                             │
//! │  restore ──> log inverse ──> LocalBlockQueue ──> BlockQueueScheduler │
//! │                                                        │ tick()      │
//! │                                                        ▼             │
//! │                                     WorldBackend (per host version)  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is constructed explicitly and passed by `Arc`; there are no
//! process-wide singletons, so tests can build isolated instances.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod locks;
pub mod registry;
pub mod restore;

use std::sync::Arc;

pub use config::{LoggerSection, SchedulerSection, StrataConfig, WorldSection};
pub use error::{StrataError, StrataResult};
pub use locks::{RegionGuard, RegionLocks};
pub use registry::{BackendFactory, BackendRegistry};
pub use restore::{RestoreTicket, Restorer};

use strata_core::{Change, ChangeQuery, ChangeSource, Changes};
use strata_log::{DrainReport, SqliteChangeLogger, SqliteChangeStore};
use strata_queue::{
    BlockQueueScheduler, SchedulerDriver, TickReport, WorldBackend, HOST_TICK_RATE,
};

/// The assembled system: change log, scheduler and restorer.
pub struct Strata {
    logger: Arc<SqliteChangeLogger>,
    scheduler: Arc<BlockQueueScheduler>,
    restorer: Restorer<SqliteChangeStore>,
}

impl std::fmt::Debug for Strata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strata")
            .field("scheduler", &self.scheduler)
            .field("restorer", &self.restorer)
            .finish_non_exhaustive()
    }
}

impl Strata {
    /// Builds the system, resolving the world backend for
    /// `config.world.host_version` from `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::UnknownHostVersion`] if the registry has no
    /// backend for the host, or any error from [`Strata::with_backend`].
    pub fn open(config: &StrataConfig, registry: &BackendRegistry) -> StrataResult<Self> {
        let backend = registry.resolve(&config.world.host_version)?;
        Self::with_backend(config, backend)
    }

    /// Builds the system around an explicit world backend.
    ///
    /// # Errors
    ///
    /// Fails if the world layout is invalid, the database cannot be opened,
    /// or the drain worker pool cannot be built.
    pub fn with_backend(
        config: &StrataConfig,
        backend: Arc<dyn WorldBackend>,
    ) -> StrataResult<Self> {
        let layout = Arc::new(config.world.layout()?);
        let store = match &config.logger.database {
            Some(path) => SqliteChangeStore::open(path)?,
            None => SqliteChangeStore::open_in_memory()?,
        };
        let logger = Arc::new(SqliteChangeLogger::new(
            store,
            config.logger.logger_config(),
        ));
        let scheduler = Arc::new(BlockQueueScheduler::new(
            config.scheduler.scheduler_config(),
            layout,
            backend,
        )?);
        let restorer = Restorer::new(Arc::clone(&logger), Arc::clone(&scheduler));
        Ok(Self {
            logger,
            scheduler,
            restorer,
        })
    }

    /// Starts the change logger's driver thread.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Log`] if the logger is already running or its
    /// thread cannot be spawned.
    pub fn start(&self) -> StrataResult<()> {
        self.logger.start()?;
        Ok(())
    }

    /// Stops the scheduler and the logger, persisting everything still queued.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Log`] if joining the logger thread fails.
    pub fn stop(&self) -> StrataResult<DrainReport> {
        self.scheduler.stop();
        if self.logger.is_running() {
            Ok(self.logger.stop()?)
        } else {
            Ok(self.logger.drain_once())
        }
    }

    /// Change logger.
    #[must_use]
    pub fn logger(&self) -> &Arc<SqliteChangeLogger> {
        &self.logger
    }

    /// Block queue scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<BlockQueueScheduler> {
        &self.scheduler
    }

    /// Restoration orchestrator.
    #[must_use]
    pub fn restorer(&self) -> &Restorer<SqliteChangeStore> {
        &self.restorer
    }

    /// Queues a change for persistence. Never blocks.
    pub fn log_change(&self, change: Change) {
        self.logger.log_change(change);
    }

    /// Binds the calling thread as the host loop and starts accepting ticks.
    pub fn run_task(&self) -> bool {
        self.scheduler.run_task()
    }

    /// Runs one scheduler slice. Call once per host tick.
    pub fn tick(&self) -> TickReport {
        self.scheduler.tick()
    }

    /// Ticks the scheduler from a dedicated thread at the host tick rate,
    /// for hosts without a loop of their own.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Queue`] if the thread cannot be spawned.
    pub fn spawn_driver(&self) -> StrataResult<SchedulerDriver> {
        Ok(SchedulerDriver::spawn(
            Arc::clone(&self.scheduler),
            HOST_TICK_RATE,
        )?)
    }

    /// Runs a query, most recent change first.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Model`] for an invalid query and
    /// [`StrataError::Log`] if the store fails.
    pub async fn query(&self, query: ChangeQuery) -> StrataResult<Vec<Change>> {
        let resolved = query.build()?;
        Ok(self.logger.backend().query_changes(resolved).await?)
    }

    /// Runs a query and groups the result by location.
    ///
    /// # Errors
    ///
    /// Same as [`Strata::query`].
    pub async fn lookup(&self, query: ChangeQuery) -> StrataResult<Changes> {
        let resolved = query.build()?;
        Ok(self.logger.backend().lookup(resolved).await?)
    }

    /// Restores `changes`; see [`Restorer::restore`].
    ///
    /// # Errors
    ///
    /// Same as [`Restorer::restore`].
    pub fn restore<F>(
        &self,
        changes: &Changes,
        source: &ChangeSource,
        on_complete: F,
    ) -> StrataResult<RestoreTicket>
    where
        F: FnOnce() + Send + 'static,
    {
        self.restorer.restore(changes, source, on_complete)
    }
}
