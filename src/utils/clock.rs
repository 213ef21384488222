//! Time provider abstraction
//!
//! Session liveness, token expiry and the concurrency window all compare
//! against "now". Routing every read of the current time through [`Clock`]
//! lets tests move time forward (for example past the 24 hour token lifetime)
//! without sleeping.
//!
//! # Example
//!
//! ```
//! use histmap::utils::clock::{Clock, ManualClock};
//!
//! let clock = ManualClock::starting_now();
//! let before = clock.now_secs();
//! clock.advance(chrono::Duration::hours(25));
//! assert_eq!(clock.now_secs() - before, 25 * 3600);
//! ```

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::fmt::Debug;

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as seconds since the Unix epoch.
    fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// Used by the integration tests to simulate token expiry and the trailing
/// activity window.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at the given instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to a specific instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_frozen_until_advanced() {
        let clock = ManualClock::starting_now();
        let a = clock.now();
        let b = clock.now();
        assert_eq!(a, b);

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now() - a, Duration::minutes(5));
    }

    #[test]
    fn test_manual_clock_set() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp");
        let clock = ManualClock::new(Utc::now());
        clock.set(start);
        assert_eq!(clock.now_secs(), 1_700_000_000);
    }

    #[test]
    fn test_system_clock_tracks_utc_now() {
        let drift = (SystemClock.now() - Utc::now()).num_seconds().abs();
        assert!(drift <= 1);
    }
}
