//! Best-effort alert fan-out.
//!
//! A failed alert never fails the message that triggered it: transient failures are
//! retried with backoff, and whatever still fails is logged and counted.

use crate::metrics::AlertMetrics;
use crate::retry::{RetryPolicy, retry_transient};
use std::sync::Arc;
use txn_validation_core::alert::{AlertError, AlertService};
use txn_validation_core::models::Alert;

/// Result of sending one alert to a set of services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Services that accepted the alert
    pub delivered: usize,
    /// Services that could not deliver it
    pub failed: usize,
}

/// Send `alert` to every service in order.
///
/// Never returns an error; failures are reported in the outcome and the logs.
pub async fn dispatch_alert(
    services: &[Arc<dyn AlertService>],
    alert: &Alert,
    policy: &RetryPolicy,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for service in services {
        let result = retry_transient(
            policy,
            service.name(),
            || service.send_alert(alert),
            AlertError::is_transient,
        )
        .await;

        match result {
            Ok(accepted) => {
                tracing::info!(service = service.name(), title = %alert.title, accepted, "Alert sent");
                AlertMetrics::record_delivered(service.name());
                outcome.delivered += 1;
            }
            Err(e) => {
                tracing::error!(
                    service = service.name(),
                    title = %alert.title,
                    error = %e,
                    "Alert could not be delivered"
                );
                AlertMetrics::record_failed(service.name());
                outcome.failed += 1;
            }
        }
    }

    outcome
}
