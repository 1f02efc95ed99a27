//! Alert delivery transports for the transaction validation pipeline.
//!
//! [`WebhookAlertService`] posts alerts to a Teams-style incoming webhook and
//! implements [`AlertService`](txn_validation_core::alert::AlertService), so it
//! can be attached to any validation rule.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use txn_validation_alerts::WebhookAlertService;
//! use txn_validation_core::alert::AlertService;
//! use txn_validation_core::models::Alert;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let alerts = WebhookAlertService::new("https://hooks.example.com/abc", Duration::from_secs(10))?;
//! alerts.send_alert(&Alert::new("Rule broken", "details")).await?;
//! # Ok(())
//! # }
//! ```

mod webhook;

pub use webhook::{WebhookAlertService, WebhookMessage};
