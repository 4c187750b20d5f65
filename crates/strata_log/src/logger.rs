//! # Scheduled Queuing Change Logger
//!
//! **Batched persistence off the calling thread**
//!
//! Producers push changes into an unbounded FIFO and return immediately. A
//! dedicated driver thread wakes on a fixed interval and drains the FIFO into
//! the backend in batches of at most `max_batch_size` changes.
//!
//! ## Architecture
//!
//! ```text
//!   Thread 1 ──┐
//!   Thread 2 ──┼──> [Unbounded FIFO] ──> [Driver Thread] ──> begin → persist* → finish
//!   Thread N ──┘    (O(1) enqueue)       (every interval)
//! ```
//!
//! ## Failure Handling
//!
//! - A change that fails to persist is logged and dropped. The batch goes on.
//! - A batch that fails to open or close ends the run early. Whatever is
//!   still queued waits for the next run.
//!
//! At most one drain runs at a time, whether it comes from the driver or an
//! explicit [`ScheduledChangeLogger::drain_once`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use strata_core::Change;

use crate::backend::{ChangeBackend, ChangeBatch};
use crate::error::{LogError, LogResult};

/// Configuration for the scheduled logger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Time between two drains (ms).
    pub interval_ms: u64,
    /// Maximum changes per batch.
    pub max_batch_size: usize,
}

impl LoggerConfig {
    /// One drain per second, 128 changes per batch.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            interval_ms: 1000,
            max_batch_size: 128,
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// Outcome of a single drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Changes written and committed.
    pub persisted: usize,
    /// Changes that failed to persist and were dropped.
    pub dropped: usize,
    /// Batches committed.
    pub batches: usize,
    /// True if the run ended early on a batch failure.
    pub aborted: bool,
}

/// Cumulative logger statistics.
#[derive(Clone, Debug, Default)]
pub struct LoggerStats {
    /// Total changes committed.
    pub total_persisted: u64,
    /// Total changes dropped after a persist failure.
    pub total_dropped: u64,
    /// Total batches committed.
    pub total_batches: u64,
    /// Total runs that ended early.
    pub total_aborted_runs: u64,
    /// Total time spent in drains (nanoseconds).
    pub total_drain_time_ns: u64,
}

struct Shared<B> {
    backend: B,
    config: LoggerConfig,
    sender: Sender<Change>,
    receiver: Receiver<Change>,
    run_lock: Mutex<()>,
    running: AtomicBool,
    wake: Mutex<bool>,
    wake_signal: Condvar,
    stats: Mutex<LoggerStats>,
}

/// Change logger that persists on a fixed schedule.
pub struct ScheduledChangeLogger<B: ChangeBackend> {
    shared: Arc<Shared<B>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl<B: ChangeBackend> ScheduledChangeLogger<B> {
    /// Creates a stopped logger.
    #[must_use]
    pub fn new(backend: B, config: LoggerConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                sender,
                receiver,
                run_lock: Mutex::new(()),
                running: AtomicBool::new(false),
                wake: Mutex::new(false),
                wake_signal: Condvar::new(),
                stats: Mutex::new(LoggerStats::default()),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Starts the driver thread.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::AlreadyRunning`] if the logger is running and
    /// [`LogError::Spawn`] if the thread cannot be created.
    pub fn start(&self) -> LogResult<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(LogError::AlreadyRunning);
        }
        *self.shared.wake.lock() = false;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("strata-change-logger".into())
            .spawn(move || Self::driver_loop(&shared));
        match handle {
            Ok(handle) => {
                *self.driver.lock() = Some(handle);
                tracing::info!(
                    "Change logger started (interval={}ms, max_batch_size={})",
                    self.shared.config.interval_ms,
                    self.shared.config.max_batch_size
                );
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(LogError::Spawn(e))
            }
        }
    }

    /// Stops the driver thread and runs one final drain.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NotRunning`] if the logger was not started.
    pub fn stop(&self) -> LogResult<DrainReport> {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return Err(LogError::NotRunning);
        }
        {
            let mut woken = self.shared.wake.lock();
            *woken = true;
            self.shared.wake_signal.notify_all();
        }
        if let Some(handle) = self.driver.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Change logger driver panicked");
            }
        }
        let report = self.drain_once();
        tracing::info!(
            "Change logger stopped ({} changes flushed on shutdown)",
            report.persisted
        );
        Ok(report)
    }

    /// Returns true while the driver thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Queues a change for persistence. Never blocks.
    pub fn log_change(&self, change: Change) {
        if self.shared.sender.send(change).is_err() {
            tracing::error!("Change queue disconnected, change dropped");
        }
    }

    /// Queues several changes for persistence.
    pub fn log_changes(&self, changes: impl IntoIterator<Item = Change>) {
        for change in changes {
            self.log_change(change);
        }
    }

    /// Number of changes waiting for the next drain.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.receiver.len()
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Returns cumulative statistics.
    #[must_use]
    pub fn stats(&self) -> LoggerStats {
        self.shared.stats.lock().clone()
    }

    /// Drains the queue once on the calling thread.
    pub fn drain_once(&self) -> DrainReport {
        Self::drain(&self.shared)
    }

    fn driver_loop(shared: &Shared<B>) {
        let interval = Duration::from_millis(shared.config.interval_ms);
        while shared.running.load(Ordering::SeqCst) {
            {
                let mut woken = shared.wake.lock();
                if !*woken {
                    shared.wake_signal.wait_for(&mut woken, interval);
                }
                if *woken {
                    break;
                }
            }
            Self::drain(shared);
        }
    }

    fn drain(shared: &Shared<B>) -> DrainReport {
        let _run = shared.run_lock.lock();
        let started = Instant::now();
        let mut report = DrainReport::default();

        'run: while !shared.receiver.is_empty() {
            let mut batch = match shared.backend.begin_batch() {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!("Failed to create batch, aborting: {}", e);
                    report.aborted = true;
                    break 'run;
                }
            };

            let mut in_batch = 0;
            let mut written = 0;
            while in_batch < shared.config.max_batch_size {
                let Ok(change) = shared.receiver.try_recv() else {
                    break;
                };
                in_batch += 1;
                match batch.persist(&change) {
                    Ok(()) => written += 1,
                    Err(e) => {
                        tracing::error!("Failed to persist change at {}: {}", change.location(), e);
                        report.dropped += 1;
                    }
                }
            }

            match batch.finish() {
                Ok(_) => {
                    report.persisted += written;
                    report.batches += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to save batch of {} changes: {}", written, e);
                    report.dropped += written;
                    report.aborted = true;
                    break 'run;
                }
            }
        }

        {
            let mut stats = shared.stats.lock();
            stats.total_persisted += report.persisted as u64;
            stats.total_dropped += report.dropped as u64;
            stats.total_batches += report.batches as u64;
            stats.total_aborted_runs += u64::from(report.aborted);
            stats.total_drain_time_ns += started.elapsed().as_nanos() as u64;
        }
        if report.persisted > 0 || report.dropped > 0 {
            tracing::debug!(
                "Drained {} changes in {} batches ({} dropped)",
                report.persisted,
                report.batches,
                report.dropped
            );
        }
        report
    }
}

impl<B: ChangeBackend> Drop for ScheduledChangeLogger<B> {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
