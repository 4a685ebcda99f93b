//! Time source abstraction for transaction timing.
//!
//! Transactions never read the wall clock directly; they go through a
//! [`TimeSource`] so tests can drive time deterministically. Production code
//! uses [`WallClock`], tests use [`ManualClock`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic timestamp, in nanoseconds since the time source's epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The zero instant (epoch).
    pub const ZERO: Self = Self(0);

    /// Creates a time from nanoseconds since epoch.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds since epoch.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a time from seconds since epoch.
    #[inline]
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns the time as nanoseconds since epoch.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time as milliseconds since epoch (truncated).
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Returns the elapsed nanoseconds since `earlier`.
    ///
    /// Returns 0 if `self` is before `earlier`.
    #[inline]
    #[must_use]
    pub const fn duration_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({}ns)", self.0)
    }
}

/// Source of the current time.
///
/// Implementations must be monotonic: successive calls never go backwards.
pub trait TimeSource: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Time;
}

/// Wall clock time source for production use.
///
/// Uses `std::time::Instant` internally; the epoch is the instant the
/// source was created.
#[derive(Debug)]
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    /// Creates a new wall clock time source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> Time {
        // Clamped to u64::MAX first, so the cast cannot truncate.
        let nanos = self.epoch.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
        Time::from_nanos(nanos)
    }
}

/// Manually driven time source for deterministic tests.
///
/// Starts at [`Time::ZERO`]; advance it explicitly with
/// [`advance`](Self::advance) or [`set`](Self::set).
#[derive(Debug, Default)]
pub struct ManualClock {
    now_nanos: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `nanos` nanoseconds.
    pub fn advance(&self, nanos: u64) {
        self.now_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Advances the clock by `millis` milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(millis.saturating_mul(1_000_000));
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, time: Time) {
        self.now_nanos.store(time.as_nanos(), Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Time {
        Time::from_nanos(self.now_nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_conversions_truncate() {
        let t = Time::from_nanos(1_999_999);
        assert_eq!(t.as_millis(), 1);
        assert_eq!(Time::from_millis(5).as_nanos(), 5_000_000);
        assert_eq!(Time::from_secs(2).as_millis(), 2_000);
    }

    #[test]
    fn duration_since_saturates_at_zero() {
        let earlier = Time::from_millis(10);
        let later = Time::from_millis(25);
        assert_eq!(later.duration_since(earlier), 15_000_000);
        assert_eq!(earlier.duration_since(later), 0);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Time::ZERO);
        clock.advance_millis(7);
        assert_eq!(clock.now(), Time::from_millis(7));
        clock.set(Time::from_secs(1));
        assert_eq!(clock.now(), Time::from_secs(1));
    }

    #[test]
    fn wall_clock_is_monotonic() {
        let clock = WallClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
