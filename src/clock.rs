//! Time sources for recordings.
//!
//! # Responsibilities
//! - Supply monotonic instants for durations
//! - Supply wall-clock timestamps for exported spans
//!
//! # Design Decisions
//! - Recordings and spans never call `Instant::now()` directly; everything goes
//!   through a `Clock` so tests can drive time by hand

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic instant, used for durations.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for exported timestamps.
    fn wall_time(&self) -> SystemTime;

    /// Wall-clock time as microseconds since the Unix epoch.
    fn epoch_micros(&self) -> u64 {
        self.wall_time()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: SystemTime,
    elapsed_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            elapsed_nanos: AtomicU64::new(0),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.elapsed_nanos
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall_time(&self) -> SystemTime {
        self.wall_origin + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let w0 = clock.epoch_micros();

        clock.advance(Duration::from_millis(250));

        assert_eq!(clock.now() - t0, Duration::from_millis(250));
        assert_eq!(clock.epoch_micros() - w0, 250_000);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
