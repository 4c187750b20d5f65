//! # Block Queue Scheduler
//!
//! **One bounded slice of world writes per host tick**
//!
//! The scheduler owns every outstanding [`LocalBlockQueue`] and, once per
//! host tick, drains chunks from one of them for at most the tick budget.
//!
//! ## Queue Sets
//!
//! ```text
//!              get_new_queue(auto_register = true)
//!                          │
//!                          ▼
//!   ┌───────────────────────────────────┐   enqueue (if non-empty)   ┌──────────────────┐
//!   │ inactive                          │ ─────────────────────────> │ active (FIFO)    │
//!   │ new, or idle; dropped when empty  │                            │ drained first    │
//!   │ and older than stale_after        │                            │ removed when dry │
//!   └───────────────────────────────────┘                            └──────────────────┘
//! ```
//!
//! ## Per Tick
//!
//! 1. Both sets empty: reset the carried overrun, fire completion tasks, done.
//! 2. Ask the [`TickBudget`] for this tick's budget, or skip on backpressure.
//! 3. Pick a queue: the head of `active` if it has chunks, otherwise an
//!    inactive queue chosen by backlog or by age.
//! 4. Drain it until it runs dry or the budget is spent (at least one chunk).
//!    With `parallel_workers > 1` the draining fans out over a reusable pool
//!    and every worker is joined before the tick returns.
//! 5. A drained active queue leaves the registry; if that empties both
//!    sets, completion tasks fire.
//!
//! ## Completion
//!
//! Completion tasks are taken under the `queues` lock, in the same critical
//! section that observes both sets empty, and run after it is released. A
//! queue only leaves the registry once [`LocalBlockQueue::is_drained`]: a
//! chunk still being applied by another thread (a [`flush`] caller, say)
//! keeps its queue registered. Lock order is `queues`, then `empty_tasks`,
//! then a queue's buffer.
//!
//! [`flush`]: BlockQueueScheduler::flush

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use strata_core::now_millis;

use crate::backend::WorldBackend;
use crate::budget::TickBudget;
use crate::chunk::ChunkLayout;
use crate::error::{QueueError, QueueResult};
use crate::queue::LocalBlockQueue;

/// Completion task fired once every queue has drained.
pub type EmptyTask = Box<dyn FnOnce() + Send>;

/// Scheduler tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Nominal time per host tick (ms).
    pub tick_allotment_ms: u64,
    /// Ceiling on the drain time of one tick (ms).
    pub target_time_ms: u64,
    /// Concurrent drain workers per tick. 1 drains on the calling thread.
    pub parallel_workers: usize,
    /// Inactive backlog (chunks) that forces a promotion.
    pub backlog_threshold: usize,
    /// Age (ms) after which any non-empty inactive queue is promoted.
    pub promote_after_ms: i64,
    /// Age (ms) after which an empty inactive queue is dropped.
    pub stale_after_ms: i64,
}

impl SchedulerConfig {
    /// Tuning for a 20 Hz host loop.
    #[must_use]
    pub const fn host() -> Self {
        Self {
            tick_allotment_ms: 50,
            target_time_ms: 65,
            parallel_workers: 1,
            backlog_threshold: 64,
            promote_after_ms: 1000,
            stale_after_ms: 60_000,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::host()
    }
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickReport {
    /// The scheduler is stopped.
    Stopped,
    /// No queue was registered.
    Idle,
    /// Skipped for backpressure; carries the remaining overrun.
    Skipped {
        /// Overrun still carried after this skip.
        carried: Duration,
    },
    /// Queues exist but none is due yet.
    Waiting,
    /// Chunks were drained.
    Drained {
        /// Chunks handed to the backend.
        chunks: usize,
        /// True if the queue ran dry.
        exhausted: bool,
        /// Budget granted to this tick.
        budget: Duration,
    },
}

#[derive(Default)]
struct QueueSets {
    active: VecDeque<Arc<LocalBlockQueue>>,
    inactive: VecDeque<Arc<LocalBlockQueue>>,
}

impl QueueSets {
    fn is_empty(&self) -> bool {
        self.active.is_empty() && self.inactive.is_empty()
    }
}

/// Cooperative, time-budgeted scheduler for block queues.
pub struct BlockQueueScheduler {
    config: SchedulerConfig,
    layout: Arc<ChunkLayout>,
    backend: Arc<dyn WorldBackend>,
    queues: Mutex<QueueSets>,
    empty_tasks: Mutex<Vec<EmptyTask>>,
    budget: Mutex<TickBudget>,
    running: AtomicBool,
    host_thread: Mutex<Option<ThreadId>>,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for BlockQueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (active, inactive) = self.queue_counts();
        f.debug_struct("BlockQueueScheduler")
            .field("active", &active)
            .field("inactive", &inactive)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl BlockQueueScheduler {
    /// Creates a stopped scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Pool`] if the worker pool cannot be built.
    pub fn new(
        config: SchedulerConfig,
        layout: Arc<ChunkLayout>,
        backend: Arc<dyn WorldBackend>,
    ) -> QueueResult<Self> {
        let pool = if config.parallel_workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.parallel_workers)
                    .thread_name(|i| format!("strata-drain-{i}"))
                    .build()?,
            )
        } else {
            None
        };
        let budget = TickBudget::new(
            Duration::from_millis(config.tick_allotment_ms),
            Duration::from_millis(config.target_time_ms),
        );
        Ok(Self {
            config,
            layout,
            backend,
            queues: Mutex::new(QueueSets::default()),
            empty_tasks: Mutex::new(Vec::new()),
            budget: Mutex::new(budget),
            running: AtomicBool::new(false),
            host_thread: Mutex::new(None),
            pool,
        })
    }

    /// Scheduler tuning.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// World backend the queues apply into.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn WorldBackend> {
        &self.backend
    }

    /// Starts accepting ticks and binds the calling thread as the host loop
    /// thread. Returns false if already running.
    pub fn run_task(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.host_thread.lock() = Some(thread::current().id());
        tracing::info!(
            "Block queue scheduler started (workers={}, target={}ms)",
            self.config.parallel_workers,
            self.config.target_time_ms
        );
        true
    }

    /// Stops accepting ticks. Returns false if already stopped.
    pub fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        *self.host_thread.lock() = None;
        tracing::info!("Block queue scheduler stopped");
        true
    }

    /// Returns true between [`run_task`](Self::run_task) and
    /// [`stop`](Self::stop).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Creates a queue for `world`. With `auto_register` it starts in the
    /// inactive set and is picked up without an explicit enqueue.
    #[must_use]
    pub fn get_new_queue(&self, world: &str, auto_register: bool) -> Arc<LocalBlockQueue> {
        let queue = Arc::new(LocalBlockQueue::new(
            world,
            Arc::clone(&self.layout),
            Arc::clone(&self.backend),
        ));
        if auto_register {
            self.queues.lock().inactive.push_back(Arc::clone(&queue));
        }
        queue
    }

    /// Moves a queue to the active set. Empty queues are only removed from
    /// the inactive set. Returns true if the queue is now active.
    pub fn enqueue(&self, queue: &Arc<LocalBlockQueue>) -> bool {
        let mut sets = self.queues.lock();
        sets.inactive.retain(|q| !Arc::ptr_eq(q, queue));
        if queue.size() == 0 {
            return false;
        }
        if !sets.active.iter().any(|q| Arc::ptr_eq(q, queue)) {
            sets.active.push_back(Arc::clone(queue));
        }
        true
    }

    /// Picks the queue to drain next.
    ///
    /// The first active queue with chunks wins; drained active queues are
    /// evicted, and ones with a chunk still in flight are passed over.
    /// Otherwise the inactive set is scanned in order while
    /// summing pending chunks: the first non-empty queue wins once the sum
    /// exceeds `backlog_threshold`, and any queue untouched for longer than
    /// `promote_after_ms` wins on its own. Drained inactive queues older
    /// than `stale_after_ms` are dropped along the way.
    #[must_use]
    pub fn get_next_queue(&self) -> Option<Arc<LocalBlockQueue>> {
        let now = now_millis();
        let mut sets = self.queues.lock();

        let mut i = 0;
        while i < sets.active.len() {
            let queue = &sets.active[i];
            if queue.size() > 0 {
                queue.set_modified(now);
                return Some(Arc::clone(queue));
            }
            if queue.is_drained() {
                sets.active.remove(i);
            } else {
                i += 1;
            }
        }

        let mut total = 0usize;
        let mut first_non_empty = None;
        let mut chosen = None;
        let mut i = 0;
        while i < sets.inactive.len() {
            let queue = &sets.inactive[i];
            let size = queue.size();
            let age = now - queue.modified();
            total += size;
            if size == 0 {
                if age > self.config.stale_after_ms && queue.is_drained() {
                    tracing::debug!("Dropping stale queue for {}", queue.world());
                    sets.inactive.remove(i);
                } else {
                    i += 1;
                }
                continue;
            }
            let first = *first_non_empty.get_or_insert(i);
            if total > self.config.backlog_threshold {
                chosen = Some(first);
                break;
            }
            if age > self.config.promote_after_ms {
                chosen = Some(i);
                break;
            }
            i += 1;
        }

        let queue = Arc::clone(sets.inactive.get(chosen?)?);
        queue.set_modified(now);
        Some(queue)
    }

    /// Returns true if no queue is registered.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.queues.lock().is_empty()
    }

    /// `(active, inactive)` queue counts.
    #[must_use]
    pub fn queue_counts(&self) -> (usize, usize) {
        let sets = self.queues.lock();
        (sets.active.len(), sets.inactive.len())
    }

    /// Runs `task` once every queue has drained, or right away if none is
    /// registered.
    pub fn add_empty_task(&self, task: impl FnOnce() + Send + 'static) {
        let tasks = {
            let sets = self.queues.lock();
            self.empty_tasks.lock().push(Box::new(task));
            self.take_empty_tasks(&sets)
        };
        Self::run_empty_tasks(tasks);
    }

    /// Takes every pending completion task if both sets are empty. Borrowing
    /// `sets` ties the check and the take to one `queues` critical section.
    fn take_empty_tasks(&self, sets: &QueueSets) -> Option<Vec<EmptyTask>> {
        sets.is_empty().then(|| std::mem::take(&mut *self.empty_tasks.lock()))
    }

    fn run_empty_tasks(tasks: Option<Vec<EmptyTask>>) {
        let Some(tasks) = tasks.filter(|tasks| !tasks.is_empty()) else {
            return;
        };
        tracing::debug!("All block queues drained, running {} tasks", tasks.len());
        for task in tasks {
            task();
        }
    }

    /// Runs one scheduler slice. Call once per host tick.
    pub fn tick(&self) -> TickReport {
        if !self.is_running() {
            return TickReport::Stopped;
        }
        let idle = self.take_empty_tasks(&self.queues.lock());
        if idle.is_some() {
            self.budget.lock().reset_idle();
            Self::run_empty_tasks(idle);
            return TickReport::Idle;
        }

        let started = Instant::now();
        let granted = {
            let mut budget = self.budget.lock();
            match budget.begin(started) {
                Some(granted) => granted,
                None => {
                    let carried = budget.carried_overrun();
                    tracing::trace!("Host loop behind, skipping tick ({:?} carried)", carried);
                    return TickReport::Skipped { carried };
                }
            }
        };

        let Some(queue) = self.get_next_queue() else {
            return TickReport::Waiting;
        };

        let (chunks, exhausted) = match &self.pool {
            Some(pool) => self.drain_parallel(pool, &queue, started, granted),
            None => Self::drain(&queue, started, granted),
        };
        self.budget.lock().finish(Instant::now());

        if exhausted {
            let tasks = {
                let mut sets = self.queues.lock();
                if queue.is_drained() {
                    sets.active.retain(|q| !Arc::ptr_eq(q, &queue));
                }
                self.take_empty_tasks(&sets)
            };
            Self::run_empty_tasks(tasks);
        }

        TickReport::Drained {
            chunks,
            exhausted,
            budget: granted,
        }
    }

    /// Drains at least one chunk, then until the queue runs dry or the
    /// budget measured from `started` is spent.
    fn drain(queue: &LocalBlockQueue, started: Instant, budget: Duration) -> (usize, bool) {
        let mut chunks = 0;
        loop {
            if !queue.next() {
                return (chunks, true);
            }
            chunks += 1;
            if started.elapsed() >= budget {
                return (chunks, queue.size() == 0);
            }
        }
    }

    fn drain_parallel(
        &self,
        pool: &rayon::ThreadPool,
        queue: &Arc<LocalBlockQueue>,
        started: Instant,
        budget: Duration,
    ) -> (usize, bool) {
        let chunks = AtomicUsize::new(0);
        let exhausted = AtomicBool::new(false);
        pool.scope(|scope| {
            for _ in 0..self.config.parallel_workers {
                scope.spawn(|_| {
                    let (drained, dry) = Self::drain(queue, started, budget);
                    chunks.fetch_add(drained, Ordering::Relaxed);
                    if dry {
                        exhausted.store(true, Ordering::Relaxed);
                    }
                });
            }
        });
        (
            chunks.into_inner(),
            exhausted.into_inner() || queue.size() == 0,
        )
    }

    /// Drains `queue` to completion on the calling thread and removes it
    /// from the registry. Returns the number of chunks drained here.
    ///
    /// Chunks another thread is applying at the same time are waited for, so
    /// the queue is drained when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::FlushOnHostThread`] when called from the thread
    /// that drives ticks.
    pub fn flush(&self, queue: &Arc<LocalBlockQueue>) -> QueueResult<usize> {
        if *self.host_thread.lock() == Some(thread::current().id()) {
            return Err(QueueError::FlushOnHostThread);
        }
        let mut chunks = 0;
        loop {
            while queue.next() {
                chunks += 1;
            }
            queue.wait_in_flight();
            if queue.is_drained() {
                break;
            }
        }
        let tasks = {
            let mut sets = self.queues.lock();
            sets.active.retain(|q| !Arc::ptr_eq(q, queue));
            sets.inactive.retain(|q| !Arc::ptr_eq(q, queue));
            self.take_empty_tasks(&sets)
        };
        Self::run_empty_tasks(tasks);
        tracing::debug!("Flushed {} chunks for {}", chunks, queue.world());
        Ok(chunks)
    }

    /// Overrides the drain time carried into the next tick.
    pub fn set_carried_overrun(&self, period: Duration) {
        self.budget.lock().set_carried_overrun(period);
    }

    /// Drain time carried into the next tick.
    #[must_use]
    pub fn carried_overrun(&self) -> Duration {
        self.budget.lock().carried_overrun()
    }
}

impl Drop for BlockQueueScheduler {
    fn drop(&mut self) {
        let (active, inactive) = self.queue_counts();
        if active + inactive > 0 {
            tracing::warn!(
                "Block queue scheduler dropped with {} active and {} inactive queues",
                active,
                inactive
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::LocalChunk;
    use crate::error::ApplyError;
    use std::sync::atomic::AtomicU32;
    use strata_core::{BlockData, BlockWrapper};

    #[derive(Default)]
    struct Counter {
        chunks: AtomicUsize,
    }

    impl WorldBackend for Counter {
        fn apply_chunk(
            &self,
            _world: &str,
            _layout: &ChunkLayout,
            _chunk: &LocalChunk,
        ) -> Result<(), ApplyError> {
            self.chunks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Parks every apply between two barriers shared with the test.
    struct Gate {
        entered: std::sync::Barrier,
        release: std::sync::Barrier,
    }

    impl WorldBackend for Gate {
        fn apply_chunk(
            &self,
            _world: &str,
            _layout: &ChunkLayout,
            _chunk: &LocalChunk,
        ) -> Result<(), ApplyError> {
            self.entered.wait();
            self.release.wait();
            Ok(())
        }
    }

    /// Counts applies and takes a moment over each one.
    #[derive(Default)]
    struct Slow {
        chunks: AtomicUsize,
    }

    impl WorldBackend for Slow {
        fn apply_chunk(
            &self,
            _world: &str,
            _layout: &ChunkLayout,
            _chunk: &LocalChunk,
        ) -> Result<(), ApplyError> {
            thread::sleep(Duration::from_micros(50));
            self.chunks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scheduler(config: SchedulerConfig) -> (BlockQueueScheduler, Arc<Counter>) {
        let counter = Arc::new(Counter::default());
        let scheduler =
            BlockQueueScheduler::new(config, Arc::new(ChunkLayout::default()), counter.clone())
                .unwrap();
        (scheduler, counter)
    }

    fn fill(queue: &LocalBlockQueue, chunks: i32) {
        for cx in 0..chunks {
            queue.set_block(
                cx * 16,
                64,
                0,
                BlockWrapper::plain(BlockData::new("minecraft:stone")),
            );
        }
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        assert_eq!(scheduler.tick(), TickReport::Stopped);
        assert!(scheduler.run_task());
        assert!(!scheduler.run_task());
        assert_eq!(scheduler.tick(), TickReport::Idle);
        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert_eq!(scheduler.tick(), TickReport::Stopped);
    }

    #[test]
    fn test_enqueue_of_empty_queue_is_a_noop() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let queue = scheduler.get_new_queue("world", true);
        assert_eq!(scheduler.queue_counts(), (0, 1));

        assert!(!scheduler.enqueue(&queue));
        assert_eq!(scheduler.queue_counts(), (0, 0));

        fill(&queue, 2);
        assert!(scheduler.enqueue(&queue));
        assert!(scheduler.enqueue(&queue));
        assert_eq!(scheduler.queue_counts(), (1, 0));
    }

    #[test]
    fn test_active_head_beats_inactive_backlog() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let waiting = scheduler.get_new_queue("world", true);
        fill(&waiting, 100);
        waiting.set_modified(now_millis() - 10_000);

        let active = scheduler.get_new_queue("world", false);
        fill(&active, 1);
        scheduler.enqueue(&active);

        let next = scheduler.get_next_queue().unwrap();
        assert!(Arc::ptr_eq(&next, &active));
    }

    #[test]
    fn test_dry_active_head_is_evicted() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let first = scheduler.get_new_queue("world", false);
        let second = scheduler.get_new_queue("world", false);
        fill(&first, 1);
        fill(&second, 1);
        scheduler.enqueue(&first);
        scheduler.enqueue(&second);

        assert!(first.next());
        let next = scheduler.get_next_queue().unwrap();
        assert!(Arc::ptr_eq(&next, &second));
        assert_eq!(scheduler.queue_counts(), (1, 0));
    }

    #[test]
    fn test_inactive_promotion_by_backlog() {
        let (scheduler, _) = scheduler(SchedulerConfig {
            backlog_threshold: 10,
            ..SchedulerConfig::default()
        });
        let small = scheduler.get_new_queue("world", true);
        let large = scheduler.get_new_queue("world", true);
        fill(&small, 4);
        assert!(scheduler.get_next_queue().is_none());

        fill(&large, 7);
        // 4 + 7 > 10: the first non-empty queue in scan order wins.
        let next = scheduler.get_next_queue().unwrap();
        assert!(Arc::ptr_eq(&next, &small));
        assert_eq!(scheduler.queue_counts(), (0, 2));
    }

    #[test]
    fn test_inactive_promotion_by_age() {
        let (scheduler, _) = scheduler(SchedulerConfig {
            promote_after_ms: 1000,
            ..SchedulerConfig::default()
        });
        let fresh = scheduler.get_new_queue("world", true);
        let old = scheduler.get_new_queue("world", true);
        fill(&fresh, 1);
        fill(&old, 1);
        assert!(scheduler.get_next_queue().is_none());

        old.set_modified(now_millis() - 1_500);
        let next = scheduler.get_next_queue().unwrap();
        assert!(Arc::ptr_eq(&next, &old));
        // Promotion touches the queue.
        assert!(now_millis() - old.modified() < 1_000);
    }

    #[test]
    fn test_stale_empty_inactive_queue_is_dropped() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let stale = scheduler.get_new_queue("world", true);
        let _recent = scheduler.get_new_queue("world", true);
        stale.set_modified(now_millis() - 61_000);

        assert!(scheduler.get_next_queue().is_none());
        assert_eq!(scheduler.queue_counts(), (0, 1));
    }

    #[test]
    fn test_overrun_tick_drains_nothing() {
        let (scheduler, counter) = scheduler(SchedulerConfig::default());
        scheduler.run_task();
        let queue = scheduler.get_new_queue("world", false);
        fill(&queue, 3);
        scheduler.enqueue(&queue);

        scheduler.set_carried_overrun(Duration::from_millis(100));
        let report = scheduler.tick();
        assert_eq!(
            report,
            TickReport::Skipped {
                carried: Duration::from_millis(35)
            }
        );
        assert_eq!(counter.chunks.load(Ordering::SeqCst), 0);
        assert_eq!(queue.size(), 3);
    }

    #[test]
    fn test_every_tick_makes_progress_and_fires_once() {
        let (scheduler, counter) = scheduler(SchedulerConfig::default());
        scheduler.run_task();
        let queue = scheduler.get_new_queue("world", false);
        fill(&queue, 5);
        scheduler.enqueue(&queue);

        let fired = Arc::new(AtomicU32::new(0));
        let fired_task = Arc::clone(&fired);
        scheduler.add_empty_task(move || {
            fired_task.fetch_add(1, Ordering::SeqCst);
        });

        let mut ticks = 0;
        while !scheduler.is_done() {
            match scheduler.tick() {
                TickReport::Drained { chunks, .. } => assert!(chunks >= 1),
                TickReport::Skipped { .. } => {}
                other => panic!("unexpected tick outcome: {other:?}"),
            }
            assert!(fired.load(Ordering::SeqCst) == 0 || scheduler.is_done());
            ticks += 1;
            assert!(ticks < 1_000);
        }
        assert_eq!(counter.chunks.load(Ordering::SeqCst), 5);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert_eq!(scheduler.tick(), TickReport::Idle);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_task_runs_immediately_when_done() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        scheduler.add_empty_task(move || flag.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_parallel_workers_drain_every_chunk_once() {
        let (scheduler, counter) = scheduler(SchedulerConfig {
            parallel_workers: 4,
            target_time_ms: 1_000,
            tick_allotment_ms: 1_000,
            ..SchedulerConfig::default()
        });
        scheduler.run_task();
        let queue = scheduler.get_new_queue("world", false);
        fill(&queue, 200);
        scheduler.enqueue(&queue);

        let mut ticks = 0;
        while !scheduler.is_done() && ticks < 10_000 {
            let _ = scheduler.tick();
            ticks += 1;
        }
        assert!(scheduler.is_done());
        assert_eq!(counter.chunks.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn test_queue_with_chunk_in_flight_stays_registered() {
        let gate = Arc::new(Gate {
            entered: std::sync::Barrier::new(2),
            release: std::sync::Barrier::new(2),
        });
        let scheduler = BlockQueueScheduler::new(
            SchedulerConfig::default(),
            Arc::new(ChunkLayout::default()),
            gate.clone(),
        )
        .unwrap();
        scheduler.run_task();
        let queue = scheduler.get_new_queue("world", false);
        fill(&queue, 1);
        scheduler.enqueue(&queue);

        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        scheduler.add_empty_task(move || flag.store(true, Ordering::SeqCst));

        let applier = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.next())
        };
        gate.entered.wait();

        assert!(scheduler.get_next_queue().is_none());
        assert_eq!(scheduler.queue_counts(), (1, 0));
        assert_eq!(scheduler.tick(), TickReport::Waiting);
        assert!(!fired.load(Ordering::SeqCst));

        gate.release.wait();
        assert!(applier.join().unwrap());
        let mut ticks = 0;
        while !fired.load(Ordering::SeqCst) {
            let _ = scheduler.tick();
            ticks += 1;
            assert!(ticks < 1_000);
        }
        assert!(scheduler.is_done());
    }

    #[test]
    fn test_completion_never_precedes_drain_across_threads() {
        let backend = Arc::new(Slow::default());
        let scheduler = Arc::new(
            BlockQueueScheduler::new(
                SchedulerConfig::default(),
                Arc::new(ChunkLayout::default()),
                backend.clone(),
            )
            .unwrap(),
        );
        let stop = Arc::new(AtomicBool::new(false));
        let host = {
            let scheduler = Arc::clone(&scheduler);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                scheduler.run_task();
                while !stop.load(Ordering::SeqCst) {
                    let _ = scheduler.tick();
                    thread::yield_now();
                }
            })
        };
        while !scheduler.is_running() {
            thread::yield_now();
        }

        let early = Arc::new(AtomicUsize::new(0));
        for round in 0..300 {
            let queue = scheduler.get_new_queue("world", false);
            fill(&queue, 2);
            let expected = backend.chunks.load(Ordering::SeqCst) + 2;
            scheduler.enqueue(&queue);

            let (tx, rx) = std::sync::mpsc::channel();
            let task_queue = Arc::clone(&queue);
            let task_backend = Arc::clone(&backend);
            let task_early = Arc::clone(&early);
            scheduler.add_empty_task(move || {
                if !task_queue.is_drained() || task_backend.chunks.load(Ordering::SeqCst) < expected
                {
                    task_early.fetch_add(1, Ordering::SeqCst);
                }
                let _ = tx.send(());
            });
            // Every other round races a flush from this thread against the
            // host thread's ticks.
            if round % 2 == 1 {
                scheduler.flush(&queue).unwrap();
            }
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        stop.store(true, Ordering::SeqCst);
        host.join().unwrap();
        assert_eq!(early.load(Ordering::SeqCst), 0);
        assert_eq!(backend.chunks.load(Ordering::SeqCst), 600);
    }

    #[test]
    fn test_flush_is_refused_on_host_thread() {
        let (scheduler, counter) = scheduler(SchedulerConfig::default());
        let scheduler = Arc::new(scheduler);
        scheduler.run_task();
        let queue = scheduler.get_new_queue("world", true);
        fill(&queue, 3);

        assert!(matches!(
            scheduler.flush(&queue),
            Err(QueueError::FlushOnHostThread)
        ));

        let worker = {
            let scheduler = Arc::clone(&scheduler);
            let queue = Arc::clone(&queue);
            thread::spawn(move || scheduler.flush(&queue))
        };
        assert_eq!(worker.join().unwrap().unwrap(), 3);
        assert_eq!(counter.chunks.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_done());
    }
}
