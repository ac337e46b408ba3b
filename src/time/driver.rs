//! Time sources for context schedulers.
//!
//! Schedulers read "now" through [`TimeSource`] so that the same timer logic
//! runs against wall-clock time in production and virtual time in tests.

use crate::types::Time;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[inline]
pub(crate) fn duration_to_nanos_saturating(duration: Duration) -> u64 {
    duration.as_nanos().min(u128::from(u64::MAX)) as u64
}

/// Time source abstraction for getting the current time.
pub trait TimeSource: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Time;
}

/// Wall clock time source for production use.
///
/// Uses `std::time::Instant` internally, converting to our `Time` type.
/// The epoch is the time when this source was created.
#[derive(Debug)]
pub struct WallClock {
    epoch: std::time::Instant,
}

impl WallClock {
    /// Creates a new wall clock time source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Time {
        Time::from_nanos(duration_to_nanos_saturating(self.epoch.elapsed()))
    }
}

/// Virtual time source for lab testing.
///
/// Time only advances when explicitly told to do so, enabling
/// deterministic testing of time-dependent code.
///
/// # Example
///
/// ```
/// use threadcx::time::{TimeSource, VirtualClock};
/// use threadcx::types::Time;
///
/// let clock = VirtualClock::new();
/// assert_eq!(clock.now(), Time::ZERO);
///
/// clock.advance(std::time::Duration::from_secs(1));
/// assert_eq!(clock.now(), Time::from_secs(1));
/// ```
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: AtomicU64,
}

impl VirtualClock {
    /// Creates a new virtual clock starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a virtual clock starting at the given time.
    #[must_use]
    pub fn starting_at(time: Time) -> Self {
        Self {
            now: AtomicU64::new(time.as_nanos()),
        }
    }

    /// Advances time by the given duration.
    pub fn advance(&self, by: Duration) {
        let nanos = duration_to_nanos_saturating(by);
        let mut current = self.now.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(nanos);
            match self
                .now
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Advances time to the given absolute time.
    ///
    /// If the target time is in the past, this is a no-op.
    pub fn advance_to(&self, time: Time) {
        self.now.fetch_max(time.as_nanos(), Ordering::AcqRel);
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Time {
        Time::from_nanos(self.now.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_is_monotonic() {
        let clock = WallClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn virtual_clock_advances_only_on_request() {
        let clock = VirtualClock::new();
        assert_eq!(clock.now(), Time::ZERO);
        clock.advance(Duration::from_millis(10));
        assert_eq!(clock.now(), Time::from_millis(10));
    }

    #[test]
    fn virtual_clock_advance_to_never_goes_back() {
        let clock = VirtualClock::starting_at(Time::from_secs(5));
        clock.advance_to(Time::from_secs(2));
        assert_eq!(clock.now(), Time::from_secs(5));
        clock.advance_to(Time::from_secs(7));
        assert_eq!(clock.now(), Time::from_secs(7));
    }
}
