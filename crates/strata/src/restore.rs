//! # Restoration Orchestrator
//!
//! Rolls a distinct [`Changes`] set back to each location's original value.
//!
//! ## Order of Operations
//!
//! ```text
//! restore(changes, source, on_complete)
//!   1. reject non-distinct sets                 (nothing touched)
//!   2. lock the populated region of the world   (or RegionLocked)
//!   3. build the inverse changes                (live value ─> original "from",
//!                                                 restoration markers left out)
//!   4. log every inverse change                 (before any cell is written)
//!   5. buffer the original values into a fresh queue and enqueue it
//!   6. completion task: release the lock, then on_complete
//! ```
//!
//! The completion task rides on the scheduler's "all queues drained" hook,
//! so it fires exactly once and only after every chunk has been applied.

use std::sync::Arc;

use strata_core::{BlockPos, ChangeSource, ChangeSubject, Changes, CoreError, CuboidRegion};
use strata_log::{ChangeBackend, ScheduledChangeLogger};
use strata_queue::BlockQueueScheduler;

use crate::error::{StrataError, StrataResult};
use crate::locks::RegionLocks;

/// What a restoration handed off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreTicket {
    /// Inverse block changes queued for logging.
    pub logged: usize,
    /// Cells buffered for writing.
    pub cells: usize,
    /// Chunks enqueued with the scheduler.
    pub chunks: usize,
}

/// Logs and applies inverse change sets.
pub struct Restorer<B: ChangeBackend> {
    logger: Arc<ScheduledChangeLogger<B>>,
    scheduler: Arc<BlockQueueScheduler>,
    locks: RegionLocks,
}

impl<B: ChangeBackend> Restorer<B> {
    /// Creates an orchestrator over a logger and a scheduler.
    #[must_use]
    pub fn new(logger: Arc<ScheduledChangeLogger<B>>, scheduler: Arc<BlockQueueScheduler>) -> Self {
        Self {
            logger,
            scheduler,
            locks: RegionLocks::new(),
        }
    }

    /// Regions currently being restored.
    #[must_use]
    pub fn locks(&self) -> &RegionLocks {
        &self.locks
    }

    /// Restores every location of `changes` to its recorded original value.
    ///
    /// `on_complete` runs once the scheduler has drained every queue.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Model`] with [`CoreError::NotDistinct`] if a
    /// location holds more than one change, and
    /// [`StrataError::RegionLocked`] if an overlapping restoration of the same
    /// world is still in flight. Nothing is logged or written in either case.
    pub fn restore<F>(
        &self,
        changes: &Changes,
        source: &ChangeSource,
        on_complete: F,
    ) -> StrataResult<RestoreTicket>
    where
        F: FnOnce() + Send + 'static,
    {
        if !changes.is_distinct() {
            return Err(CoreError::NotDistinct.into());
        }

        let world = changes.world();
        let region = CuboidRegion::enclosing(changes.locations()).unwrap_or(changes.region());
        let guard = self
            .locks
            .try_lock(world, region)
            .ok_or_else(|| StrataError::RegionLocked {
                world: world.to_owned(),
                region,
            })?;

        let backend = Arc::clone(self.scheduler.backend());
        let mut inverse = changes.restoration_change_set_with(source, |location| {
            backend.current_block(location)
        })?;
        // Restoration markers carry no cell value; logging them again would
        // only duplicate the marker.
        inverse.retain(|change| matches!(change.subject(), ChangeSubject::Block { .. }));

        let writes: Vec<_> = inverse
            .iter()
            .filter_map(|change| {
                let block = change.subject().to_wrapper()?;
                Some((change.location().pos, block))
            })
            .collect();

        let logged = inverse.len();
        self.logger.log_changes(inverse);

        let queue = self.scheduler.get_new_queue(world, false);
        let mut cells = 0;
        for (BlockPos { x, y, z }, block) in writes {
            if queue.set_block(x, y, z, block) {
                cells += 1;
            } else {
                tracing::warn!(
                    "Skipping restoration of ({}, {}, {}) in {}: outside world height",
                    x,
                    y,
                    z,
                    world
                );
            }
        }
        let chunks = queue.size();
        self.scheduler.enqueue(&queue);

        tracing::info!(
            "Restoring {} locations in {} ({} chunks, source {})",
            cells,
            world,
            chunks,
            source
        );

        self.scheduler.add_empty_task(move || {
            drop(guard);
            on_complete();
        });

        Ok(RestoreTicket {
            logged,
            cells,
            chunks,
        })
    }
}

impl<B: ChangeBackend> std::fmt::Debug for Restorer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Restorer")
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}
