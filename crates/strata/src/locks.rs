//! # Region Locks
//!
//! At most one restoration per overlapping region of a world. A lock is a
//! guard value: it is released when dropped, which the orchestrator does
//! from the restoration's completion task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::CuboidRegion;

#[derive(Debug)]
struct Held {
    id: u64,
    world: String,
    region: CuboidRegion,
}

#[derive(Debug, Default)]
struct Table {
    held: Mutex<Vec<Held>>,
    next_id: AtomicU64,
}

/// Table of regions currently being restored.
#[derive(Clone, Debug, Default)]
pub struct RegionLocks {
    table: Arc<Table>,
}

impl RegionLocks {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `region` in `world` unless it intersects a held region of the
    /// same world.
    #[must_use]
    pub fn try_lock(&self, world: &str, region: CuboidRegion) -> Option<RegionGuard> {
        let mut held = self.table.held.lock();
        if held
            .iter()
            .any(|h| h.world == world && h.region.intersects(&region))
        {
            return None;
        }
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed);
        held.push(Held {
            id,
            world: world.to_owned(),
            region,
        });
        Some(RegionGuard {
            table: Arc::clone(&self.table),
            id,
        })
    }

    /// Returns true if `region` in `world` intersects a held region.
    #[must_use]
    pub fn is_locked(&self, world: &str, region: &CuboidRegion) -> bool {
        self.table
            .held
            .lock()
            .iter()
            .any(|h| h.world == world && h.region.intersects(region))
    }

    /// Number of held locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.held.lock().len()
    }

    /// Returns true if no lock is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A held region lock. Dropping it releases the region.
#[derive(Debug)]
pub struct RegionGuard {
    table: Arc<Table>,
    id: u64,
}

impl Drop for RegionGuard {
    fn drop(&mut self) {
        self.table.held.lock().retain(|h| h.id != self.id);
    }
}
