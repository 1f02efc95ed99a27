//! Incoming-webhook alert transport.

use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use txn_validation_core::alert::{AlertError, AlertService};
use txn_validation_core::models::Alert;

/// JSON body accepted by Teams-style incoming webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookMessage {
    /// Card title
    pub title: String,
    /// Card text
    pub text: String,
}

impl From<&Alert> for WebhookMessage {
    fn from(alert: &Alert) -> Self {
        // The receiving card renderer treats a single backslash as an escape.
        Self {
            title: alert.title.replace('\\', "\\\\"),
            text: alert.body.replace('\\', "\\\\"),
        }
    }
}

/// Posts alerts to an incoming webhook.
#[derive(Clone)]
pub struct WebhookAlertService {
    client: Client,
    url: String,
}

impl WebhookAlertService {
    /// Create a service posting to `url`, bounding each request by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Configuration`] if the URL is empty or the HTTP client
    /// cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(AlertError::Configuration("webhook URL is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertError::Configuration(e.to_string()))?;

        Ok(Self { client, url })
    }

    async fn post(&self, alert: &Alert) -> Result<u64, AlertError> {
        tracing::info!(title = %alert.title, body = %alert.body, "Sending webhook alert");

        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage::from(alert))
            .send()
            .await
            .map_err(|e| AlertError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(1);
        }

        let message = response.text().await.unwrap_or_default();
        Err(AlertError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

impl std::fmt::Debug for WebhookAlertService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL embeds the webhook credential.
        f.debug_struct("WebhookAlertService")
            .field("url", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl AlertService for WebhookAlertService {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn send_alert(
        &self,
        alert: &Alert,
    ) -> Pin<Box<dyn Future<Output = Result<u64, AlertError>> + Send + '_>> {
        let alert = alert.clone();
        Box::pin(async move { self.post(&alert).await })
    }
}
