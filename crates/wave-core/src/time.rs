// crates/wave-core/src/time.rs
// ============================================================================
// Module: Time Model
// Description: Canonical timestamp representation and an injectable clock.
// Purpose: Keep replay deterministic: every timestamp in the control plane
//          comes from a `Clock`, never from a direct wall-clock read, so
//          checkpoint replay (§8 testable property 5) can substitute a fixed
//          clock.
// Dependencies: serde, time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

/// A UTC timestamp, recorded in milliseconds since the Unix epoch.
///
/// # Invariants
/// - Always produced by a [`Clock`] implementation, never read directly from
///   the OS inside core logic; this keeps decision-making replayable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Builds a timestamp from raw Unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Elapsed milliseconds from `self` to `other`; negative if `other` precedes `self`.
    #[must_use]
    pub const fn millis_until(self, other: Self) -> i64 {
        other.0 - self.0
    }
}

/// Source of timestamps for a running system.
///
/// Implementations must be cheap to call repeatedly; the dispatcher and
/// signal bus call `now()` on every state transition.
pub trait Clock: Send + Sync {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;
}

/// A [`Clock`] backed by the OS wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = OffsetDateTime::now_utc();
        Timestamp::from_unix_millis((now.unix_timestamp_nanos() / 1_000_000) as i64)
    }
}

/// A [`Clock`] that advances only when told to; used by tests and by replay.
#[derive(Debug, Clone)]
pub struct FixedClock {
    millis: std::sync::atomic::AtomicI64,
}

impl FixedClock {
    /// Builds a clock starting at the given Unix-millis value.
    #[must_use]
    pub const fn new(start_millis: i64) -> Self {
        Self { millis: std::sync::atomic::AtomicI64::new(start_millis) }
    }

    /// Advances the clock by `delta_millis` and returns the new timestamp.
    pub fn advance(&self, delta_millis: i64) -> Timestamp {
        let value = self.millis.fetch_add(delta_millis, std::sync::atomic::Ordering::SeqCst) + delta_millis;
        Timestamp::from_unix_millis(value)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(std::sync::atomic::Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::Clock;
    use super::FixedClock;

    #[test]
    fn fixed_clock_advances_deterministically() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now().as_unix_millis(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now().as_unix_millis(), 1_500);
    }

    #[test]
    fn millis_until_is_signed() {
        let earlier = super::Timestamp::from_unix_millis(100);
        let later = super::Timestamp::from_unix_millis(150);
        assert_eq!(earlier.millis_until(later), 50);
        assert_eq!(later.millis_until(earlier), -50);
    }
}
