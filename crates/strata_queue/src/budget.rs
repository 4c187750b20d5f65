//! # Tick Budget
//!
//! How long the scheduler may drain chunks during one host tick.
//!
//! ## Formula
//!
//! ```text
//! since_start = now - start of previous tick
//! since_drain = now - end of previous drain
//!
//! budget = min(2 * allotment - since_start, allotment - since_drain)
//!          clamped to [0, target_time]
//! ```
//!
//! A host tick that arrives late eats into the budget, and so does a
//! previous drain that ended late. A budget of zero still drains one chunk,
//! so queued work always makes progress.
//!
//! ## Backpressure
//!
//! The time spent draining in a tick is carried into the next one. If it
//! exceeds `target_time`, the next tick does no work at all and the carried
//! overrun shrinks by exactly `target_time`. A host loop that is already
//! behind gets nothing extra piled on.

use std::time::{Duration, Instant};

/// Per-tick drain budget with carried overrun.
#[derive(Clone, Debug)]
pub struct TickBudget {
    allotment: Duration,
    target_time: Duration,
    last_start: Instant,
    last_drain_end: Instant,
    last_period: Duration,
}

impl TickBudget {
    /// Creates a budget with the given per-tick allotment and ceiling.
    #[must_use]
    pub fn new(allotment: Duration, target_time: Duration) -> Self {
        let now = Instant::now();
        Self {
            allotment,
            target_time,
            last_start: now,
            last_drain_end: now,
            last_period: Duration::ZERO,
        }
    }

    /// Per-tick allotment.
    #[must_use]
    pub const fn allotment(&self) -> Duration {
        self.allotment
    }

    /// Ceiling on a single tick's drain time.
    #[must_use]
    pub const fn target_time(&self) -> Duration {
        self.target_time
    }

    /// Drain time carried over from previous ticks.
    #[must_use]
    pub const fn carried_overrun(&self) -> Duration {
        self.last_period
    }

    /// Overrides the carried drain time.
    pub fn set_carried_overrun(&mut self, period: Duration) {
        self.last_period = period;
    }

    /// Forgets any carried overrun. Called on idle ticks.
    pub fn reset_idle(&mut self) {
        self.last_period = Duration::ZERO;
    }

    /// Starts a tick at `now`.
    ///
    /// Returns `None` if the tick must be skipped for backpressure, otherwise
    /// the time this tick may spend draining.
    pub fn begin(&mut self, now: Instant) -> Option<Duration> {
        if self.last_period > self.target_time {
            self.last_period -= self.target_time;
            return None;
        }
        let since_start = now.saturating_duration_since(self.last_start);
        let since_drain = now.saturating_duration_since(self.last_drain_end);
        let by_cadence = (self.allotment * 2).saturating_sub(since_start);
        let by_last_drain = self.allotment.saturating_sub(since_drain);
        self.last_start = now;
        Some(by_cadence.min(by_last_drain).min(self.target_time))
    }

    /// Records the end of this tick's drain.
    pub fn finish(&mut self, now: Instant) {
        self.last_drain_end = now;
        self.last_period = now.saturating_duration_since(self.last_start);
    }

    /// Start of the current (or last) tick.
    #[must_use]
    pub const fn tick_start(&self) -> Instant {
        self.last_start
    }
}

impl Default for TickBudget {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(65))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_overrun_skips_and_shrinks_by_target() {
        let mut budget = TickBudget::default();
        budget.set_carried_overrun(MS * 150);

        assert!(budget.begin(Instant::now()).is_none());
        assert_eq!(budget.carried_overrun(), MS * 85);

        assert!(budget.begin(Instant::now()).is_none());
        assert_eq!(budget.carried_overrun(), MS * 20);

        assert!(budget.begin(Instant::now()).is_some());
    }

    #[test]
    fn test_overrun_equal_to_target_does_not_skip() {
        let mut budget = TickBudget::default();
        budget.set_carried_overrun(MS * 65);
        assert!(budget.begin(Instant::now()).is_some());
    }

    #[test]
    fn test_budget_formula() {
        let mut budget = TickBudget::new(MS * 50, MS * 65);
        let t0 = budget.tick_start();

        // Previous drain ended 10ms into a tick that started 50ms ago.
        budget.finish(t0 + MS * 10);
        let granted = budget.begin(t0 + MS * 50).unwrap();
        // min(100 - 50, 50 - 40) = 10
        assert_eq!(granted, MS * 10);
    }

    #[test]
    fn test_early_tick_is_capped_by_target() {
        let mut budget = TickBudget::new(MS * 50, MS * 30);
        let t0 = budget.tick_start();
        budget.finish(t0);
        // min(100 - 1, 50 - 1) = 49, capped to 30
        assert_eq!(budget.begin(t0 + MS).unwrap(), MS * 30);
    }

    #[test]
    fn test_late_tick_gets_zero_budget() {
        let mut budget = TickBudget::new(MS * 50, MS * 65);
        let t0 = budget.tick_start();
        budget.finish(t0);
        assert_eq!(budget.begin(t0 + MS * 500).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_finish_carries_drain_time() {
        let mut budget = TickBudget::default();
        let start = budget.tick_start() + MS * 5;
        budget.begin(start).unwrap();
        budget.finish(start + MS * 80);
        assert_eq!(budget.carried_overrun(), MS * 80);
        assert!(budget.begin(start + MS * 100).is_none());
        assert_eq!(budget.carried_overrun(), MS * 15);

        budget.reset_idle();
        assert_eq!(budget.carried_overrun(), Duration::ZERO);
    }
}
