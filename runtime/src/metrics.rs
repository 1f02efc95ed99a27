//! Prometheus metrics for the validation pipeline.
//!
//! Counters are recorded at the consumer loop and handler boundaries:
//! - Consumer polls, commits, withheld offsets, broker errors
//! - Heartbeat writes
//! - Rule violations and validation latency
//! - Alert delivery
//! - Dead-lettered messages
//!
//! Recording is a no-op until [`MetricsServer::start`] installs the exporter, so
//! library code and tests can record unconditionally.
//!
//! # Example
//!
//! ```rust,no_run
//! use txn_validation_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and start serving `/metrics`.
    ///
    /// Must be called from within a Tokio runtime; the HTTP listener runs as a
    /// background task.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built or bound, and
    /// [`MetricsError::Install`] if another recorder is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Consumer
    describe_counter!(
        "consumer_polls_idle_total",
        "Total number of polls that returned no message"
    );
    describe_counter!(
        "consumer_messages_committed_total",
        "Total number of messages whose offsets were committed"
    );
    describe_counter!(
        "consumer_messages_withheld_total",
        "Total number of messages whose offsets were withheld for redelivery"
    );
    describe_counter!(
        "consumer_broker_errors_total",
        "Total number of broker-reported record errors"
    );
    describe_counter!(
        "consumer_heartbeats_written_total",
        "Total number of heartbeats written on idle polls"
    );
    describe_counter!(
        "consumer_heartbeat_failures_total",
        "Total number of heartbeat writes that failed"
    );
    describe_counter!(
        "consumer_dead_lettered_total",
        "Total number of messages recorded in the dead-letter store"
    );
    describe_histogram!(
        "consumer_message_duration_seconds",
        "Time taken to deserialize and handle one message"
    );

    // Validation
    describe_counter!(
        "validation_transactions_total",
        "Total number of transactions run through the validator"
    );
    describe_counter!(
        "validation_violations_total",
        "Total number of business rule violations"
    );

    // Alerts
    describe_counter!(
        "alerts_delivered_total",
        "Total number of alerts accepted by an alert service"
    );
    describe_counter!(
        "alerts_failed_total",
        "Total number of alerts that could not be delivered"
    );
}

/// Consumer loop metrics recorder.
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    /// Record a poll that returned no message.
    pub fn record_idle_poll() {
        counter!("consumer_polls_idle_total").increment(1);
    }

    /// Record a committed offset.
    pub fn record_commit() {
        counter!("consumer_messages_committed_total").increment(1);
    }

    /// Record a withheld offset.
    pub fn record_withheld(reason: &'static str) {
        counter!("consumer_messages_withheld_total", "reason" => reason).increment(1);
    }

    /// Record a broker-reported record error.
    pub fn record_broker_error() {
        counter!("consumer_broker_errors_total").increment(1);
    }

    /// Record a heartbeat write.
    pub fn record_heartbeat(success: bool) {
        if success {
            counter!("consumer_heartbeats_written_total").increment(1);
        } else {
            counter!("consumer_heartbeat_failures_total").increment(1);
        }
    }

    /// Record a message moved to the dead-letter store.
    pub fn record_dead_lettered() {
        counter!("consumer_dead_lettered_total").increment(1);
    }

    /// Record how long one message took end to end.
    pub fn record_message_duration(duration: Duration) {
        histogram!("consumer_message_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Validation metrics recorder.
pub struct ValidationMetrics;

impl ValidationMetrics {
    /// Record a transaction entering the validator.
    pub fn record_validated() {
        counter!("validation_transactions_total").increment(1);
    }

    /// Record a broken rule.
    pub fn record_violation(rule: &str) {
        counter!("validation_violations_total", "rule" => rule.to_string()).increment(1);
    }
}

/// Alert delivery metrics recorder.
pub struct AlertMetrics;

impl AlertMetrics {
    /// Record an alert accepted by `service`.
    pub fn record_delivered(service: &str) {
        counter!("alerts_delivered_total", "service" => service.to_string()).increment(1);
    }

    /// Record an alert `service` could not deliver.
    pub fn record_failed(service: &str) {
        counter!("alerts_failed_total", "service" => service.to_string()).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unstarted_server_renders_nothing() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn recording_without_exporter_is_a_no_op() {
        ConsumerMetrics::record_idle_poll();
        ConsumerMetrics::record_withheld("handler");
        ValidationMetrics::record_violation("QuantityCeiling");
        AlertMetrics::record_failed("teams");
    }

    #[tokio::test]
    async fn started_server_renders_recorded_counters() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        ConsumerMetrics::record_commit();

        let rendered = server.render().unwrap();
        assert!(rendered.contains("consumer_messages_committed_total"));
    }
}
