//! # Fairqueue Testing
//!
//! Testing utilities and helpers for the Fairqueue reducer architecture.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `MockClock`)
//! - A Given-When-Then harness for reducers (`ReducerTest`)
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use fairqueue_testing::{MockClock, ReducerTest};
//!
//! let clock = MockClock::starting_at(test_clock().now());
//! clock.advance(chrono::Duration::minutes(31));
//! ```

use chrono::{DateTime, Utc};
use fairqueue_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, PoisonError, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use fairqueue_testing::mocks::FixedClock;
    /// use fairqueue_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Manually driven clock for lease and expiry tests
    ///
    /// Clones share the same instant, so a test can hand one clone to the
    /// environment and keep another to move time forward.
    ///
    /// ```
    /// use fairqueue_testing::mocks::MockClock;
    /// use fairqueue_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = MockClock::starting_at(Utc::now());
    /// let start = clock.now();
    /// clock.advance(Duration::minutes(30));
    /// assert_eq!(clock.now() - start, Duration::minutes(30));
    /// ```
    #[derive(Debug, Clone)]
    pub struct MockClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl MockClock {
        /// Create a clock frozen at `time` until advanced
        #[must_use]
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute instant
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// The instant every test clock starts from (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// Create an advanceable clock starting at the test epoch
    #[must_use]
    pub fn mock_clock() -> MockClock {
        MockClock::starting_at(test_epoch())
    }
}


// Re-export commonly used items
pub use mocks::{mock_clock, test_clock, test_epoch, FixedClock, MockClock};
pub use reducer_test::{assertions, ReducerTest};
