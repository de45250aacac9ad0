// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.

use std::time::{Duration, Instant};

/// A clock that provides the current time.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    /// Fake clock for testing with controllable time, used by the
    /// reconciler's periodic-sweep tests where real sleeps would be slow
    /// and flaky.
    #[derive(Clone)]
    pub struct FakeClock {
        current: Arc<Mutex<Instant>>,
    }

    impl FakeClock {
        pub fn new() -> Self {
            Self { current: Arc::new(Mutex::new(Instant::now())) }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, duration: Duration) {
            *self.current.lock() += duration;
        }
    }

    impl Default for FakeClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.current.lock()
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeClock;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_monotonically() {
        let clock = FakeClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(5));
        assert!(clock.now() > t0);
        assert_eq!(clock.now() - t0, Duration::from_secs(5));
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let t0 = clock.now();
        let t1 = clock.now();
        assert!(t1 >= t0);
    }
}
