//! Transaction event handler.
//!
//! Routes each [`DomainEvent`] variant explicitly:
//!
//! | Event | Action |
//! |-------|--------|
//! | `TransactionCreated` / `TransactionDeleted` | validate the transaction |
//! | `TransactionUpdated` | validate the **after** state |
//! | comment events | pass through |
//!
//! A broken rule is a business alert, not a poison message: the handler logs it,
//! notifies the rule's alert services, and still answers "commit". Anything else the
//! validator reports (an indeterminate rule, a failed lookup, a timeout) is returned
//! as [`HandlerError::Failed`] so the consumer withholds the offset.

use crate::alerting::dispatch_alert;
use crate::retry::RetryPolicy;
use crate::validator::{ValidationError, Validator};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use txn_validation_core::event::{DeserializationError, DomainEvent};
use txn_validation_core::handler::{EventHandler, HandlerError};
use txn_validation_core::models::Transaction;

/// Validates transaction events and alerts on broken rules.
#[derive(Debug, Clone)]
pub struct TransactionEventHandler {
    validator: Option<Validator>,
    alert_retry: RetryPolicy,
    commit_on_deserialization_error: bool,
}

impl TransactionEventHandler {
    /// Create a handler that validates with `validator`.
    #[must_use]
    pub fn new(validator: Validator) -> Self {
        Self {
            validator: Some(validator),
            alert_retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(500))
                .max_delay(Duration::from_secs(5))
                .build(),
            commit_on_deserialization_error: false,
        }
    }

    /// Create a handler that only logs events.
    #[must_use]
    pub fn without_validation() -> Self {
        Self {
            validator: None,
            ..Self::new(Validator::default())
        }
    }

    /// Backoff used when an alert service fails transiently.
    #[must_use]
    pub fn alert_retry(mut self, policy: RetryPolicy) -> Self {
        self.alert_retry = policy;
        self
    }

    /// Commit messages that fail to deserialize instead of withholding them.
    #[must_use]
    pub const fn commit_on_deserialization_error(mut self, commit: bool) -> Self {
        self.commit_on_deserialization_error = commit;
        self
    }

    async fn validate(&self, event: &'static str, transaction: &Transaction) -> Result<bool, HandlerError> {
        tracing::info!(event, transaction = %transaction, "Consuming transaction event");

        let Some(validator) = &self.validator else {
            return Ok(true);
        };

        match validator.validate(transaction).await {
            Ok(()) => {
                tracing::info!(transaction = %transaction, "Passed all validations");
                Ok(true)
            }
            Err(ValidationError::Violation(violation)) => {
                tracing::warn!(
                    rule = violation.rule.name(),
                    transaction = %violation.transaction,
                    "{violation}"
                );
                let outcome = dispatch_alert(
                    violation.rule.alert_services(),
                    &violation.alert(),
                    &self.alert_retry,
                )
                .await;
                if outcome.failed > 0 {
                    tracing::warn!(
                        rule = violation.rule.name(),
                        delivered = outcome.delivered,
                        failed = outcome.failed,
                        "Some alerts for rule violation were not delivered"
                    );
                }
                Ok(true)
            }
            Err(other) => Err(HandlerError::failed(other)),
        }
    }
}

impl Default for TransactionEventHandler {
    fn default() -> Self {
        Self::without_validation()
    }
}

impl EventHandler for TransactionEventHandler {
    fn handle<'a>(
        &'a self,
        event: &'a DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<bool, HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            match event {
                DomainEvent::TransactionCreated(transaction)
                | DomainEvent::TransactionDeleted(transaction) => {
                    self.validate(event.name(), transaction).await
                }
                DomainEvent::TransactionUpdated { before, after } => {
                    if let Some(before) = before {
                        tracing::debug!(before = %before, after = %after, "Transaction updated");
                    }
                    self.validate(event.name(), after).await
                }
                DomainEvent::TransactionCommentCreated(comment)
                | DomainEvent::TransactionCommentDeleted(comment)
                | DomainEvent::TransactionCommentUpdated { after: comment, .. } => {
                    tracing::debug!(event = event.name(), comment = %comment, "Ignoring comment event");
                    Ok(true)
                }
            }
        })
    }

    fn handle_deserialization_error(&self, error: &DeserializationError) -> bool {
        tracing::error!(
            error = %error,
            commit = self.commit_on_deserialization_error,
            "Message could not be deserialized"
        );
        self.commit_on_deserialization_error
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rules::{MissingBlotterPolicy, PostedAfterBlotterSent, QuantityCeiling};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use txn_validation_core::alert::AlertError;
    use txn_validation_core::models::TransactionComment;
    use txn_validation_core::repository::RepositoryError;
    use txn_validation_testing::alerts::RecordingAlertService;
    use txn_validation_testing::repositories::InMemoryBlotterRepository;

    fn txn(quantity: i64) -> Transaction {
        let day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        Transaction::new("by", Decimal::from(quantity), "SEC", "PORT", day, day)
    }

    fn no_retries() -> RetryPolicy {
        RetryPolicy::none()
    }

    fn ceiling_handler(alerts: Arc<RecordingAlertService>) -> TransactionEventHandler {
        let rule = QuantityCeiling::new(Decimal::from(100)).with_alert_service(alerts);
        TransactionEventHandler::new(Validator::builder().rule(Arc::new(rule)).build())
            .alert_retry(no_retries())
    }

    #[tokio::test]
    async fn compliant_transaction_commits_without_alert() {
        let alerts = Arc::new(RecordingAlertService::new("teams"));
        let handler = ceiling_handler(alerts.clone());

        let commit = handler.handle(&DomainEvent::TransactionCreated(txn(5))).await.unwrap();

        assert!(commit);
        assert!(alerts.sent().is_empty());
    }

    #[tokio::test]
    async fn rule_violation_alerts_and_still_commits() {
        let alerts = Arc::new(RecordingAlertService::new("teams"));
        let handler = ceiling_handler(alerts.clone());

        let commit = handler.handle(&DomainEvent::TransactionCreated(txn(500))).await.unwrap();

        assert!(commit);
        let sent = alerts.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("failed rule QuantityCeiling"));
    }

    #[tokio::test]
    async fn update_validates_after_state() {
        let alerts = Arc::new(RecordingAlertService::new("teams"));
        let handler = ceiling_handler(alerts.clone());

        let event = DomainEvent::TransactionUpdated { before: Some(txn(500)), after: txn(5) };
        assert!(handler.handle(&event).await.unwrap());
        assert!(alerts.sent().is_empty());

        let event = DomainEvent::TransactionUpdated { before: None, after: txn(500) };
        assert!(handler.handle(&event).await.unwrap());
        assert_eq!(alerts.sent().len(), 1);
    }

    #[tokio::test]
    async fn deleted_transaction_is_validated() {
        let alerts = Arc::new(RecordingAlertService::new("teams"));
        let handler = ceiling_handler(alerts.clone());

        assert!(handler.handle(&DomainEvent::TransactionDeleted(txn(101))).await.unwrap());
        assert_eq!(alerts.sent().len(), 1);
    }

    #[tokio::test]
    async fn failed_alert_still_commits() {
        let alerts = Arc::new(RecordingAlertService::new("teams"));
        alerts.fail_with(AlertError::Transport("webhook down".into()));
        let handler = ceiling_handler(alerts.clone());

        let commit = handler.handle(&DomainEvent::TransactionCreated(txn(500))).await.unwrap();

        assert!(commit);
        assert_eq!(alerts.attempts(), 1);
    }

    #[tokio::test]
    async fn comment_events_pass_through() {
        let alerts = Arc::new(RecordingAlertService::new("teams"));
        let handler = ceiling_handler(alerts.clone());
        let comment = TransactionComment {
            portfolio_id: "PORT".into(),
            trade_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            comment: Some("note".into()),
            attributes: serde_json::Map::new(),
        };

        for event in [
            DomainEvent::TransactionCommentCreated(comment.clone()),
            DomainEvent::TransactionCommentUpdated { before: Some(comment.clone()), after: comment.clone() },
            DomainEvent::TransactionCommentDeleted(comment),
        ] {
            assert!(handler.handle(&event).await.unwrap());
        }
        assert!(alerts.sent().is_empty());
    }

    #[tokio::test]
    async fn repository_failure_escapes_to_the_consumer() {
        let blotters = Arc::new(InMemoryBlotterRepository::new());
        blotters.fail_with(RepositoryError::Database("timeout".into()));
        let rule = PostedAfterBlotterSent::new(blotters);
        let handler = TransactionEventHandler::new(Validator::builder().rule(Arc::new(rule)).build());

        let err = handler.handle(&DomainEvent::TransactionCreated(txn(1))).await.unwrap_err();
        assert!(matches!(err, HandlerError::Failed(_)));
    }

    #[tokio::test]
    async fn indeterminate_rule_escapes_to_the_consumer() {
        let blotters = Arc::new(InMemoryBlotterRepository::new());
        let rule = PostedAfterBlotterSent::new(blotters).missing_blotter(MissingBlotterPolicy::Indeterminate);
        let handler = TransactionEventHandler::new(Validator::builder().rule(Arc::new(rule)).build());

        let err = handler.handle(&DomainEvent::TransactionCreated(txn(1))).await.unwrap_err();
        assert!(err.to_string().contains("could not be evaluated"), "got: {err}");
    }

    #[tokio::test]
    async fn handler_without_validator_commits_everything() {
        let handler = TransactionEventHandler::without_validation();
        assert!(handler.handle(&DomainEvent::TransactionCreated(txn(10_000))).await.unwrap());
    }

    #[test]
    fn deserialization_errors_are_withheld_by_default() {
        let error = DeserializationError::MissingField("payload");
        assert!(!TransactionEventHandler::default().handle_deserialization_error(&error));
        assert!(
            TransactionEventHandler::default()
                .commit_on_deserialization_error(true)
                .handle_deserialization_error(&error)
        );
    }
}
