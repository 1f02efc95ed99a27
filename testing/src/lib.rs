//! # Transaction Validation Testing
//!
//! Testing utilities for the transaction validation pipeline.
//!
//! This crate provides:
//! - [`FixedClock`] for deterministic timestamps
//! - In-memory [`repositories`] for transactions, blotters, and heartbeats
//! - A recording [`alerts::RecordingAlertService`]
//! - An in-memory [`dead_letter::InMemoryDeadLetterSink`]
//! - [`fixtures`] for building CDC payloads and transactions
//!
//! Every fake can be told to fail, so error paths are as easy to exercise as the
//! happy path.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use txn_validation_testing::repositories::InMemoryHeartbeatRepository;
//! use txn_validation_core::repository::RepositoryError;
//!
//! let heartbeats = Arc::new(InMemoryHeartbeatRepository::new());
//! heartbeats.fail_with(RepositoryError::Database("connection refused".into()));
//! assert!(heartbeats.all().is_empty());
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens if a test already panicked

use chrono::{DateTime, Utc};
use txn_validation_core::environment::Clock;

pub mod alerts;
pub mod dead_letter;
pub mod fixtures;
pub mod repositories;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use txn_validation_testing::mocks::FixedClock;
    /// use txn_validation_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
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

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_new_year_2025() {
        let clock = test_clock();
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
