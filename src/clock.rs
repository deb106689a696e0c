//! Insertion ticks and the clocks that produce them.
//!
//! A tick is a 100ns unit measured from the clock's origin. Rows are stamped
//! with the tick at which they entered the cache; age-based eviction removes
//! rows stamped strictly before a cutoff tick.

use std::fmt;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of ticks in one second.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Nanoseconds per tick.
const NANOS_PER_TICK: u64 = 100;

/// Monotonic insertion timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(pub u64);

impl Tick {
    /// The earliest possible tick.
    pub const ZERO: Tick = Tick(0);

    /// Convert a duration into a tick span.
    pub fn from_duration(d: Duration) -> Self {
        Tick((d.as_nanos() / NANOS_PER_TICK as u128).min(u64::MAX as u128) as u64)
    }

    /// Convert this tick span into a duration.
    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0.saturating_mul(NANOS_PER_TICK))
    }

    /// Raw tick value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// The following tick.
    pub fn next(self) -> Self {
        Tick(self.0.saturating_add(1))
    }
}

impl Add for Tick {
    type Output = Tick;

    fn add(self, rhs: Tick) -> Tick {
        Tick(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Tick {
    type Output = Tick;

    fn sub(self, rhs: Tick) -> Tick {
        Tick(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Source of insertion ticks.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current tick. Never goes backwards.
    fn now(&self) -> Tick;
}

/// Wall-clock ticks measured from process-local creation time.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose tick zero is now.
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
    fn now(&self) -> Tick {
        Tick::from_duration(self.origin.elapsed())
    }
}

/// Clock that only moves when told to.
///
/// Used for deterministic eviction in tests and for callers that stamp rows
/// with a logical sequence instead of wall time.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `start`.
    pub fn new(start: Tick) -> Self {
        Self {
            now: AtomicU64::new(start.0),
        }
    }

    /// Jump to an absolute tick. Earlier ticks are ignored.
    pub fn set(&self, tick: Tick) {
        self.now.fetch_max(tick.0, Ordering::SeqCst);
    }

    /// Move forward by `ticks` and return the new tick.
    pub fn advance(&self, ticks: u64) -> Tick {
        Tick(self.now.fetch_add(ticks, Ordering::SeqCst) + ticks)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        Tick(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_duration_conversion() {
        let tick = Tick::from_duration(Duration::from_secs(2));
        assert_eq!(tick.get(), 2 * TICKS_PER_SECOND);
        assert_eq!(tick.as_duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_tick_arithmetic_saturates() {
        assert_eq!(Tick(5) - Tick(10), Tick::ZERO);
        assert_eq!(Tick(u64::MAX) + Tick(1), Tick(u64::MAX));
        assert_eq!(Tick(3).next(), Tick(4));
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(Tick(100));
        assert_eq!(clock.now(), Tick(100));
        assert_eq!(clock.advance(5), Tick(105));
        clock.set(Tick(50));
        assert_eq!(clock.now(), Tick(105));
        clock.set(Tick(200));
        assert_eq!(clock.now(), Tick(200));
    }
}
