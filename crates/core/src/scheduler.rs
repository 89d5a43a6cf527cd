//! Adaptive poll delays for consumers waiting on streamed data.
//!
//! Exponential backoff with instant reset: every empty poll multiplies the
//! delay by the spin factor up to a ceiling, every successful poll drops it
//! back to the floor. Idle streams stop burning CPU while bursts keep
//! near-zero latency.

use std::time::Duration;

/// Default delay after the first empty poll.
pub const DEFAULT_POLL_FLOOR: Duration = Duration::from_millis(5);

/// Default multiplier applied after each empty poll.
pub const DEFAULT_SPIN_FACTOR: f64 = 2.0;

/// Default upper bound for the delay.
pub const DEFAULT_POLL_CEILING: Duration = Duration::from_millis(2500);

/// Produces the delay sequence for a waiting consumer.
///
/// Pure timing logic: the scheduler never sleeps itself and never fails.
/// After `k` consecutive empty polls the current delay is
/// `min(floor * spin^k, ceiling)`.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    floor: Duration,
    ceiling: Duration,
    spin: f64,
    /// Consecutive empty polls since the last reset.
    empty_polls: u32,
    current: Duration,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_FLOOR, DEFAULT_SPIN_FACTOR, DEFAULT_POLL_CEILING)
    }
}

impl PollScheduler {
    /// Create a scheduler.
    ///
    /// A spin factor below 1 (or NaN) is treated as 1; a ceiling below the
    /// floor is raised to the floor.
    pub fn new(floor: Duration, spin: f64, ceiling: Duration) -> Self {
        let spin = if spin >= 1.0 { spin } else { 1.0 };
        Self {
            floor,
            ceiling: ceiling.max(floor),
            spin,
            empty_polls: 0,
            current: floor,
        }
    }

    /// Delay the next empty poll will wait for.
    pub fn current_delay(&self) -> Duration {
        self.current
    }

    /// Consecutive empty polls since the last successful one.
    pub fn empty_polls(&self) -> u32 {
        self.empty_polls
    }

    /// Record an empty poll.
    ///
    /// Returns the delay to wait now and advances the schedule.
    pub fn on_empty(&mut self) -> Duration {
        let delay = self.current;
        self.empty_polls = self.empty_polls.saturating_add(1);
        self.current = self.delay_after(self.empty_polls);
        delay
    }

    /// Record a successful poll, resetting to the floor.
    pub fn on_data(&mut self) {
        self.empty_polls = 0;
        self.current = self.floor;
    }

    fn delay_after(&self, empty_polls: u32) -> Duration {
        if self.current >= self.ceiling {
            return self.ceiling;
        }
        let exponent = i32::try_from(empty_polls).unwrap_or(i32::MAX);
        let nanos = self.floor.as_nanos() as f64 * self.spin.powi(exponent);
        let ceiling = self.ceiling.as_nanos() as f64;
        if nanos >= ceiling {
            self.ceiling
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}
