//! # Scheduler Driver
//!
//! Runs [`BlockQueueScheduler::tick`] on a dedicated thread at a fixed rate.
//! Hosts that already have a main loop call `tick` themselves and do not
//! need this.
//!
//! The driver thread becomes the scheduler's host thread, so
//! [`BlockQueueScheduler::flush`] is refused there and allowed everywhere
//! else.
//!
//! ## Pacing
//!
//! ```text
//! due ──> tick() ──> due += period ──> sleep until due (in MAX_SLEEP steps)
//!                        │
//!                        └── more than one period behind: due = now
//! ```
//!
//! A late tick is followed by the next one straight away, but the driver
//! never bursts to catch up on missed periods; the scheduler's own budget
//! already carries the overrun.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::QueueResult;
use crate::scheduler::{BlockQueueScheduler, TickReport};

/// Nominal host tick rate (Hz).
pub const HOST_TICK_RATE: u32 = 20;

/// Longest single sleep between stop checks.
const MAX_SLEEP: Duration = Duration::from_millis(10);

/// What a driver thread did over its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Ticks run.
    pub ticks: u64,
    /// Ticks that found no queue registered.
    pub idle: u64,
    /// Ticks skipped for backpressure.
    pub skipped: u64,
    /// Ticks with queues registered but none due.
    pub waiting: u64,
    /// Ticks that drained a queue.
    pub drained_ticks: u64,
    /// Chunks handed to the backend.
    pub chunks: u64,
    /// Ticks that took longer than one period.
    pub late_ticks: u64,
    /// Slowest tick observed (µs).
    pub max_tick_us: u64,
}

impl DriverStats {
    /// Folds one tick into the totals.
    pub fn record(&mut self, report: TickReport, elapsed: Duration, period: Duration) {
        self.ticks += 1;
        match report {
            TickReport::Stopped => {}
            TickReport::Idle => self.idle += 1,
            TickReport::Skipped { .. } => self.skipped += 1,
            TickReport::Waiting => self.waiting += 1,
            TickReport::Drained { chunks, .. } => {
                self.drained_ticks += 1;
                self.chunks += u64::try_from(chunks).unwrap_or(u64::MAX);
            }
        }
        if elapsed > period {
            self.late_ticks += 1;
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.max_tick_us = self.max_tick_us.max(micros);
    }
}

/// Tick period for `tick_rate` Hz. Zero is treated as 1 Hz.
const fn period_for(tick_rate: u32) -> Duration {
    let rate = if tick_rate == 0 { 1 } else { tick_rate };
    Duration::from_micros(1_000_000 / rate as u64)
}

/// Owns the thread that ticks a scheduler.
pub struct SchedulerDriver {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<DriverStats>>,
}

impl SchedulerDriver {
    /// Spawns a driver ticking `scheduler` at `tick_rate` Hz.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Spawn`](crate::QueueError::Spawn) if the thread
    /// cannot be created.
    pub fn spawn(scheduler: Arc<BlockQueueScheduler>, tick_rate: u32) -> QueueResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let period = period_for(tick_rate);
        let handle = thread::Builder::new()
            .name("strata-scheduler".into())
            .spawn(move || Self::run(&scheduler, &flag, period))?;
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    fn run(
        scheduler: &BlockQueueScheduler,
        shutdown: &AtomicBool,
        period: Duration,
    ) -> DriverStats {
        let mut stats = DriverStats::default();
        if !scheduler.run_task() {
            tracing::warn!("Scheduler already running, driver exiting");
            return stats;
        }
        let mut due = Instant::now();
        while !shutdown.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < due {
                thread::sleep((due - now).min(MAX_SLEEP));
                continue;
            }

            let report = scheduler.tick();
            let elapsed = now.elapsed();
            stats.record(report, elapsed, period);
            tracing::trace!("tick {}: {:?} in {:?}", stats.ticks, report, elapsed);

            due += period;
            let now = Instant::now();
            if now.saturating_duration_since(due) > period {
                due = now;
            }
        }
        scheduler.stop();
        tracing::info!(
            "Scheduler driver stopped after {} ticks ({} late, {} chunks)",
            stats.ticks,
            stats.late_ticks,
            stats.chunks
        );
        stats
    }

    /// Returns true while the driver thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops ticking, joins the thread and returns what it did.
    pub fn stop(mut self) -> Option<DriverStats> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Option<DriverStats> {
        self.shutdown.store(true, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                tracing::error!("Scheduler driver thread panicked");
                None
            }
        }
    }
}

impl Drop for SchedulerDriver {
    fn drop(&mut self) {
        let _ = self.shutdown_and_join();
    }
}
