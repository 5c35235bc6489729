//! Monotonic time source.
//!
//! Policy bookkeeping (failure-rate buckets) reads time through [`Clock`] so
//! it stays immune to wall-clock adjustments and can be driven
//! deterministically in tests. Timers, including reactivation deadlines, run
//! on Tokio's clock instead; pause Tokio time to drive them.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// A monotonic clock.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant. Timers are armed against this value.
    fn now(&self) -> Instant;

    /// Time elapsed since the clock was created.
    fn tick_count(&self) -> Duration;
}

/// Clock backed by tokio's instant, which honours paused test time.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn tick_count(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Jump to an absolute tick count.
    pub fn set_tick_count(&self, ticks: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset = ticks;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.tick_count()
    }

    fn tick_count(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.tick_count(), Duration::ZERO);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.tick_count(), Duration::from_millis(1500));
        assert_eq!(clock.now() - start, Duration::from_millis(1500));

        clock.set_tick_count(Duration::from_secs(10));
        assert_eq!(clock.tick_count(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monotonic_clock_follows_paused_time() {
        let clock = MonotonicClock::new();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(clock.tick_count() >= Duration::from_secs(3));
    }
}
