//! Wall-clock abstraction.
//!
//! Cache expiry, history retention and the pollen dedupe window all depend
//! on "now". Reading it through [`Clock`] lets tests move time forward
//! without sleeping.

use std::sync::Mutex;

use time::OffsetDateTime;

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> OffsetDateTime;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(datetime!(2026-06-01 08:00 UTC));
        clock.advance(time::Duration::hours(3));
        assert_eq!(clock.now(), datetime!(2026-06-01 11:00 UTC));

        clock.set(datetime!(2026-01-01 00:00 UTC));
        assert_eq!(clock.now(), datetime!(2026-01-01 00:00 UTC));
    }

    #[test]
    fn test_system_clock_is_utc() {
        assert!(SystemClock.now().offset().is_utc());
    }
}
