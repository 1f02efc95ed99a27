//! Alert delivery abstraction.
//!
//! Any transport (webhook, email, chat) that can deliver a title/body pair
//! implements [`AlertService`].

use crate::models::Alert;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur while delivering an alert.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    /// The alert never reached the receiving service
    #[error("Alert transport error: {0}")]
    Transport(String),

    /// The receiving service answered with a non-success status
    #[error("Alert rejected with status {status}: {message}")]
    Rejected {
        /// HTTP (or transport-specific) status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The service cannot send alerts as configured
    #[error("Alert service misconfigured: {0}")]
    Configuration(String),
}

impl AlertError {
    /// Whether retrying the same alert might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::Configuration(_) => false,
        }
    }
}

/// A destination for alerts.
pub trait AlertService: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Deliver an alert, returning the number of alerts accepted.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError`] if the alert could not be delivered.
    fn send_alert(
        &self,
        alert: &Alert,
    ) -> Pin<Box<dyn Future<Output = Result<u64, AlertError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(AlertError::Transport("reset".into()).is_transient());
        assert!(AlertError::Rejected { status: 503, message: String::new() }.is_transient());
        assert!(AlertError::Rejected { status: 429, message: String::new() }.is_transient());
        assert!(!AlertError::Rejected { status: 400, message: String::new() }.is_transient());
        assert!(!AlertError::Configuration("no url".into()).is_transient());
    }
}
