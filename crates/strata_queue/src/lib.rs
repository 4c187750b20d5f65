//! # STRATA Block Queues
//!
//! Chunk-partitioned buffers of pending world writes and the scheduler that
//! applies them a bounded slice at a time.
//!
//! ## Data Flow
//!
//! ```text
//! get_new_queue ──> set_block* ──> enqueue ──> BlockQueueScheduler
//!                                                   │ tick() once per host tick
//!                                                   ▼
//!                                   LocalBlockQueue::next ──> WorldBackend::apply_chunk
//!                                                   │
//!                                   all queues drained ──> completion tasks
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod budget;
pub mod chunk;
pub mod driver;
pub mod error;
pub mod queue;
pub mod scheduler;

pub use backend::WorldBackend;
pub use budget::TickBudget;
pub use chunk::{ChunkCoord, ChunkLayout, LocalCell, LocalChunk, CHUNK_SIZE, LAYER_HEIGHT, LAYER_VOLUME};
pub use driver::{DriverStats, SchedulerDriver, HOST_TICK_RATE};
pub use error::{ApplyError, QueueError, QueueResult};
pub use queue::{LocalBlockQueue, ScopedBlockQueue};
pub use scheduler::{BlockQueueScheduler, EmptyTask, SchedulerConfig, TickReport};
