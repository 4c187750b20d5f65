//! # Local Block Queue
//!
//! A per-world buffer of pending cell writes, partitioned by chunk.
//!
//! ## Design
//!
//! ```text
//! set_block(x, y, z) ─┬─ last touched chunk?  ──> slot (no map lookup)
//!                     ├─ index[coord]?        ──> slot
//!                     └─ new LocalChunk       ──> slot, pushed to the back of `order`
//!
//! next() ── pop front of `order` ── take slot ── apply outside the lock
//! ```
//!
//! Chunks drain FIFO by first write. A chunk created for a coordinate is
//! reused for every later write until it is drained. `size()` counts chunks,
//! not cells, because a chunk is the unit of work handed to the backend.
//!
//! The pop happens under the buffer lock, so several workers can call
//! [`LocalBlockQueue::next`] on the same queue and each chunk is handed to
//! exactly one of them.
//!
//! A popped chunk stays counted as in flight until its apply returns.
//! `size() == 0` only means nothing is left to hand out; the queue is
//! [drained](LocalBlockQueue::is_drained) once no apply is running either.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use strata_core::{now_millis, BlockPos, BlockWrapper, CuboidRegion};

use crate::backend::WorldBackend;
use crate::chunk::{ChunkCoord, ChunkLayout, LocalChunk};

/// Slab of pending chunks plus their FIFO order.
#[derive(Default)]
struct ChunkBuffer {
    slots: Vec<Option<LocalChunk>>,
    free: Vec<usize>,
    index: HashMap<ChunkCoord, usize>,
    order: VecDeque<usize>,
    last: Option<(ChunkCoord, usize)>,
    in_flight: usize,
}

impl ChunkBuffer {
    fn slot_for(&mut self, coord: ChunkCoord, layers: usize) -> usize {
        if let Some((last, slot)) = self.last {
            if last == coord {
                return slot;
            }
        }
        let slot = match self.index.get(&coord) {
            Some(&slot) => slot,
            None => {
                let chunk = Some(LocalChunk::new(coord, layers));
                let slot = if let Some(slot) = self.free.pop() {
                    self.slots[slot] = chunk;
                    slot
                } else {
                    self.slots.push(chunk);
                    self.slots.len() - 1
                };
                self.index.insert(coord, slot);
                self.order.push_back(slot);
                slot
            }
        };
        self.last = Some((coord, slot));
        slot
    }

    fn pop(&mut self) -> Option<LocalChunk> {
        let slot = self.order.pop_front()?;
        let chunk = self.slots[slot].take()?;
        self.index.remove(&chunk.coord());
        self.free.push(slot);
        if matches!(self.last, Some((_, last)) if last == slot) {
            self.last = None;
        }
        self.in_flight += 1;
        Some(chunk)
    }
}

/// Pending cell writes for one world.
pub struct LocalBlockQueue {
    world: String,
    layout: Arc<ChunkLayout>,
    backend: Arc<dyn WorldBackend>,
    buffer: Mutex<ChunkBuffer>,
    settled: Condvar,
    modified: AtomicI64,
    applied: AtomicU64,
    failed: AtomicU64,
}

impl std::fmt::Debug for LocalBlockQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBlockQueue")
            .field("world", &self.world)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

impl LocalBlockQueue {
    /// Creates an empty queue for `world`.
    #[must_use]
    pub fn new(
        world: impl Into<String>,
        layout: Arc<ChunkLayout>,
        backend: Arc<dyn WorldBackend>,
    ) -> Self {
        Self {
            world: world.into(),
            layout,
            backend,
            buffer: Mutex::new(ChunkBuffer::default()),
            settled: Condvar::new(),
            modified: AtomicI64::new(now_millis()),
            applied: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// World the queue writes into.
    #[inline]
    #[must_use]
    pub fn world(&self) -> &str {
        &self.world
    }

    /// Vertical layout shared with the backend.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Buffers a write. Returns false if `y` is outside the world.
    pub fn set_block(&self, x: i32, y: i32, z: i32, block: BlockWrapper) -> bool {
        let Some((layer, offset)) = self.layout.index(x, y, z) else {
            return false;
        };
        let coord = ChunkCoord::from_block_pos(x, z);
        let mut buffer = self.buffer.lock();
        let slot = buffer.slot_for(coord, self.layout.layers());
        match buffer.slots[slot].as_mut() {
            Some(chunk) => {
                chunk.set(layer, offset, block);
                true
            }
            None => false,
        }
    }

    /// Drains the oldest pending chunk into the backend.
    ///
    /// Returns false once no chunk is left. A chunk that fails to apply is
    /// logged and counts as drained.
    pub fn next(&self) -> bool {
        let Some(chunk) = self.buffer.lock().pop() else {
            return false;
        };
        self.apply(&chunk);
        let mut buffer = self.buffer.lock();
        buffer.in_flight -= 1;
        if buffer.in_flight == 0 {
            self.settled.notify_all();
        }
        true
    }

    /// Blocks until no chunk of this queue is being applied.
    pub fn wait_in_flight(&self) {
        let mut buffer = self.buffer.lock();
        while buffer.in_flight > 0 {
            self.settled.wait(&mut buffer);
        }
    }

    fn apply(&self, chunk: &LocalChunk) {
        let coord = chunk.coord();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.backend.apply_chunk(&self.world, &self.layout, chunk)
        }));
        match result {
            Ok(Ok(())) => {
                self.applied.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    "Failed to apply chunk ({}, {}) in {}: {}",
                    coord.x,
                    coord.z,
                    self.world,
                    e
                );
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    "Backend panicked applying chunk ({}, {}) in {}",
                    coord.x,
                    coord.z,
                    self.world
                );
            }
        }
    }

    /// Number of chunks still pending.
    #[must_use]
    pub fn size(&self) -> usize {
        self.buffer.lock().order.len()
    }

    /// Returns true if no chunk is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns true if no chunk is pending and none is being applied.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        let buffer = self.buffer.lock();
        buffer.order.is_empty() && buffer.in_flight == 0
    }

    /// Last time the scheduler touched this queue (ms since epoch).
    #[must_use]
    pub fn modified(&self) -> i64 {
        self.modified.load(Ordering::Relaxed)
    }

    /// Records a scheduler touch.
    pub fn set_modified(&self, millis: i64) {
        self.modified.store(millis, Ordering::Relaxed);
    }

    /// Chunks applied successfully so far.
    #[must_use]
    pub fn applied_chunks(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Chunks whose application failed so far.
    #[must_use]
    pub fn failed_chunks(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// A view of this queue restricted to `region`.
    #[must_use]
    pub fn scoped(&self, region: CuboidRegion) -> ScopedBlockQueue<'_> {
        ScopedBlockQueue {
            parent: self,
            region,
        }
    }
}

/// Writes relative to a region's minimum corner, clipped to the region.
#[derive(Debug)]
pub struct ScopedBlockQueue<'a> {
    parent: &'a LocalBlockQueue,
    region: CuboidRegion,
}

impl ScopedBlockQueue<'_> {
    /// Region the view is bounded by.
    #[must_use]
    pub fn region(&self) -> CuboidRegion {
        self.region
    }

    /// Buffers a write at an offset from the region's minimum corner.
    ///
    /// Returns false for offsets outside the region.
    pub fn set_block(&self, dx: i32, dy: i32, dz: i32, block: BlockWrapper) -> bool {
        let min = self.region.min();
        let (Some(x), Some(y), Some(z)) = (
            min.x.checked_add(dx),
            min.y.checked_add(dy),
            min.z.checked_add(dz),
        ) else {
            return false;
        };
        if !self.region.contains(BlockPos::new(x, y, z)) {
            return false;
        }
        self.parent.set_block(x, y, z, block)
    }
}
