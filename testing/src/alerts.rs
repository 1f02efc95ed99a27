//! Recording alert service.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use txn_validation_core::alert::{AlertError, AlertService};
use txn_validation_core::models::Alert;

/// Alert service that keeps every delivered alert in memory.
///
/// Counts every delivery attempt, successful or not, so retry behavior can be
/// asserted on.
///
/// # Example
///
/// ```
/// use txn_validation_testing::alerts::RecordingAlertService;
/// use txn_validation_core::alert::AlertService;
///
/// let service = RecordingAlertService::new("teams");
/// assert_eq!(service.name(), "teams");
/// assert_eq!(service.attempts(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct RecordingAlertService {
    name: String,
    sent: Arc<RwLock<Vec<Alert>>>,
    attempts: Arc<RwLock<usize>>,
    failure: Arc<RwLock<Option<AlertError>>>,
}

impl RecordingAlertService {
    /// Create a service that accepts every alert.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Arc::new(RwLock::new(Vec::new())),
            attempts: Arc::new(RwLock::new(0)),
            failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Make every subsequent delivery fail with `error`.
    pub fn fail_with(&self, error: AlertError) {
        *self.failure.write().unwrap() = Some(error);
    }

    /// Accept alerts again.
    pub fn recover(&self) {
        *self.failure.write().unwrap() = None;
    }

    /// Alerts delivered so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Alert> {
        self.sent.read().unwrap().clone()
    }

    /// Delivery attempts so far, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.read().unwrap()
    }
}

impl AlertService for RecordingAlertService {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_alert(
        &self,
        alert: &Alert,
    ) -> Pin<Box<dyn Future<Output = Result<u64, AlertError>> + Send + '_>> {
        let alert = alert.clone();
        Box::pin(async move {
            *self.attempts.write().unwrap() += 1;
            if let Some(error) = self.failure.read().unwrap().clone() {
                return Err(error);
            }
            self.sent.write().unwrap().push(alert);
            Ok(1)
        })
    }
}
