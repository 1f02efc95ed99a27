//! # Transaction Validation Runtime
//!
//! Application layer of the transaction validation pipeline:
//!
//! - [`rules`]: the [`ValidationRule`](rules::ValidationRule) trait and its variants
//! - [`validator`]: ordered, fail-fast evaluation of a rule set
//! - [`handler`]: the [`TransactionEventHandler`](handler::TransactionEventHandler) that turns
//!   domain events into commit decisions
//! - [`alerting`]: best-effort alert fan-out with retry
//! - [`comparator`]: batch reconciliation of transaction counts across repositories
//! - [`retry`], [`metrics`]: shared backoff policy and Prometheus instrumentation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use txn_validation_runtime::handler::TransactionEventHandler;
//! use txn_validation_runtime::rules::{PostedAfterBlotterSent, QuantityCeiling};
//! use txn_validation_runtime::validator::Validator;
//!
//! let validator = Validator::builder()
//!     .rule(Arc::new(QuantityCeiling::new(100.into())))
//!     .rule(Arc::new(PostedAfterBlotterSent::new(blotters).with_alert_service(teams)))
//!     .build();
//! let handler = TransactionEventHandler::new(validator);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod alerting;
pub mod comparator;
pub mod handler;
pub mod metrics;
pub mod retry;
pub mod rules;
pub mod validator;
