//! Wall-clock abstraction for TTL and lease-expiry arithmetic.
//!
//! Mirrors the teacher's `ClockSource`/`SystemClock` split so tests can
//! inject a deterministic clock instead of `SystemTime::now()`.

use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over the system clock for dependency injection.
///
/// Every millisecond timestamp used by the block-chain engine and lock
/// manager (entry expiry, lease expiry) goes through this trait so tests
/// can hold time fixed or advance it explicitly.
pub trait Clock: Send + Sync {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Default clock backed by `std::time::SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Test clock with an explicit, advanceable value.
///
/// Exposed behind `test-util` so downstream crates can hold time fixed in
/// their own tests without depending on wall-clock timing.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug)]
pub struct FixedClock(std::sync::atomic::AtomicI64);

#[cfg(any(test, feature = "test-util"))]
impl FixedClock {
    #[must_use]
    pub fn new(millis: i64) -> Self {
        Self(std::sync::atomic::AtomicI64::new(millis))
    }

    pub fn advance(&self, delta_millis: i64) {
        self.0
            .fetch_add(delta_millis, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_positive_and_increases() {
        let clock = SystemClock;
        let a = clock.now_millis();
        assert!(a > 0);
        let b = clock.now_millis();
        assert!(b >= a);
    }

    #[test]
    fn fixed_clock_advances_deterministically() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);
    }
}
