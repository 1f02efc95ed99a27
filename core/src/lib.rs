//! # Transaction Validation Core
//!
//! Domain model and collaborator traits for the transaction CDC validation pipeline.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - **Models**: [`Transaction`](models::Transaction), [`TransactionComment`](models::TransactionComment),
//!   [`Blotter`](models::Blotter), [`Heartbeat`](models::Heartbeat), [`Alert`](models::Alert)
//! - **Events**: the closed [`DomainEvent`](event::DomainEvent) sum type produced by the CDC deserializer
//! - **Collaborators**: repository, alert, dead-letter, and event-handler traits that the
//!   runtime, broker, and storage crates implement or consume
//! - **Environment**: the [`Clock`](environment::Clock) abstraction for deterministic tests
//!
//! ## Data Flow
//!
//! ```text
//! broker ─► deserialize ─► DomainEvent ─► EventHandler ─► Validator ─► [AlertService]
//!                                              │
//!                                              ▼
//!                                    commit / withhold offset
//! ```
//!
//! ## Async Traits
//!
//! Collaborator traits return `Pin<Box<dyn Future<...> + Send + '_>>` so implementations
//! can be shared as `Arc<dyn Trait>` across the pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod alert;
pub mod dead_letter;
pub mod event;
pub mod handler;
pub mod models;
pub mod repository;

/// Environment traits for dependency injection.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock;
    /// let heartbeat_time = clock.now();
    ///
    /// // Test - fixed time for deterministic tests
    /// let clock = FixedClock::new(time);
    /// assert_eq!(clock.now(), time);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock implementation of [`Clock`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
