//! Business rules evaluated against individual transactions.
//!
//! A rule answers one question about one transaction with a [`Verdict`]. Rules that
//! need reference data (such as blotter send statuses) hold a repository handle;
//! rules that don't are plain values.
//!
//! Each rule also carries the alert services to notify when it is broken. Alert
//! dispatch itself happens in the event handler, after the validator has reported
//! the violation.

use rust_decimal::Decimal;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use txn_validation_core::alert::AlertService;
use txn_validation_core::models::{Alert, Transaction};
use txn_validation_core::repository::{BlotterRepository, RepositoryError};

/// Boxed future returned by [`ValidationRule::evaluate`].
pub type RuleFuture<'a> = Pin<Box<dyn Future<Output = Result<Verdict, RuleError>> + Send + 'a>>;

/// Outcome of evaluating one rule against one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The transaction satisfies the rule
    Compliant,
    /// The transaction breaks the rule
    Broken,
    /// The rule cannot be evaluated with the data available
    Indeterminate {
        /// What was missing
        reason: String,
    },
}

impl Verdict {
    /// Whether this verdict is [`Verdict::Broken`].
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        matches!(self, Self::Broken)
    }
}

/// A rule could not produce a verdict because a collaborator failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Reference data lookup failed
    #[error("Rule '{rule}' could not read {repository}: {source}")]
    Repository {
        /// Rule being evaluated
        rule: String,
        /// Repository that failed
        repository: String,
        /// Underlying failure
        #[source]
        source: RepositoryError,
    },
}

/// A predicate over a transaction.
pub trait ValidationRule: Send + Sync {
    /// Rule name, used in logs and alerts. Defaults to the rule's type name.
    fn name(&self) -> &str;

    /// Alert services to notify when this rule is broken.
    fn alert_services(&self) -> &[Arc<dyn AlertService>] {
        &[]
    }

    /// Evaluate the rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] if reference data needed for the verdict could not be read.
    fn evaluate<'a>(&'a self, transaction: &'a Transaction) -> RuleFuture<'a>;

    /// Alert describing a violation of this rule by `transaction`.
    fn violation_alert(&self, transaction: &Transaction) -> Alert {
        Alert::new(
            format!("Transaction failed rule {}", self.name()),
            format!("{transaction} failed rule {}", self.name()),
        )
    }
}

impl fmt::Debug for dyn ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("name", &self.name())
            .field("alert_services", &self.alert_services().len())
            .finish()
    }
}

/// Broken when the transaction quantity exceeds a ceiling.
pub struct QuantityCeiling {
    name: String,
    ceiling: Decimal,
    alert_services: Vec<Arc<dyn AlertService>>,
}

impl QuantityCeiling {
    /// Create the rule with the given ceiling. Quantities equal to the ceiling pass.
    #[must_use]
    pub fn new(ceiling: Decimal) -> Self {
        Self {
            name: "QuantityCeiling".to_string(),
            ceiling,
            alert_services: Vec::new(),
        }
    }

    /// Override the rule name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Notify `service` when the rule is broken.
    #[must_use]
    pub fn with_alert_service(mut self, service: Arc<dyn AlertService>) -> Self {
        self.alert_services.push(service);
        self
    }

    /// The configured ceiling.
    #[must_use]
    pub const fn ceiling(&self) -> Decimal {
        self.ceiling
    }
}

impl ValidationRule for QuantityCeiling {
    fn name(&self) -> &str {
        &self.name
    }

    fn alert_services(&self) -> &[Arc<dyn AlertService>] {
        &self.alert_services
    }

    fn evaluate<'a>(&'a self, transaction: &'a Transaction) -> RuleFuture<'a> {
        let verdict = if transaction.quantity > self.ceiling {
            Verdict::Broken
        } else {
            Verdict::Compliant
        };
        Box::pin(async move { Ok(verdict) })
    }

    fn violation_alert(&self, transaction: &Transaction) -> Alert {
        Alert::new(
            format!("Transaction quantity above {}", self.ceiling),
            format!("{transaction} failed rule {}", self.name),
        )
    }
}

/// What [`PostedAfterBlotterSent`] concludes when no blotter is known for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingBlotterPolicy {
    /// Treat the transaction as compliant
    #[default]
    AssumeCompliant,
    /// Report [`Verdict::Indeterminate`], which withholds the message's offset
    Indeterminate,
}

/// Broken when a transaction lands after its blotter has started sending.
///
/// The blotter is looked up by [`Transaction::blotter_key`]: same-day settlement maps
/// to the T+0 regular blotter, later settlement to the T+1 amendment blotter. The rule
/// is broken if that blotter is in progress or already sent.
pub struct PostedAfterBlotterSent {
    name: String,
    blotters: Arc<dyn BlotterRepository>,
    alert_services: Vec<Arc<dyn AlertService>>,
    missing_blotter: MissingBlotterPolicy,
}

impl PostedAfterBlotterSent {
    /// Create the rule over a blotter repository.
    #[must_use]
    pub fn new(blotters: Arc<dyn BlotterRepository>) -> Self {
        Self {
            name: "PostedAfterBlotterSent".to_string(),
            blotters,
            alert_services: Vec::new(),
            missing_blotter: MissingBlotterPolicy::default(),
        }
    }

    /// Override the rule name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Notify `service` when the rule is broken.
    #[must_use]
    pub fn with_alert_service(mut self, service: Arc<dyn AlertService>) -> Self {
        self.alert_services.push(service);
        self
    }

    /// Choose what a missing blotter means.
    #[must_use]
    pub const fn missing_blotter(mut self, policy: MissingBlotterPolicy) -> Self {
        self.missing_blotter = policy;
        self
    }
}

impl ValidationRule for PostedAfterBlotterSent {
    fn name(&self) -> &str {
        &self.name
    }

    fn alert_services(&self) -> &[Arc<dyn AlertService>] {
        &self.alert_services
    }

    fn evaluate<'a>(&'a self, transaction: &'a Transaction) -> RuleFuture<'a> {
        Box::pin(async move {
            let key = transaction.blotter_key();
            let blotters = self.blotters.get(&key).await.map_err(|source| {
                RuleError::Repository {
                    rule: self.name.clone(),
                    repository: self.blotters.name().to_string(),
                    source,
                }
            })?;

            let Some(blotter) = blotters.iter().find(|b| b.key() == key) else {
                tracing::debug!(rule = %self.name, blotter = %key, "No blotter found");
                return Ok(match self.missing_blotter {
                    MissingBlotterPolicy::AssumeCompliant => Verdict::Compliant,
                    MissingBlotterPolicy::Indeterminate => Verdict::Indeterminate {
                        reason: format!("no {key} blotter in {}", self.blotters.name()),
                    },
                });
            };

            tracing::debug!(rule = %self.name, blotter = %blotter, "Blotter found");
            if blotter.status.is_sent_or_sending() {
                Ok(Verdict::Broken)
            } else {
                Ok(Verdict::Compliant)
            }
        })
    }

    fn violation_alert(&self, transaction: &Transaction) -> Alert {
        let key = transaction.blotter_key();
        Alert::new(
            format!("Transaction posted after {key} blotter was sent"),
            format!(
                "{transaction} was posted after the {key} blotter was sent, \
                 so it will not be included in that blotter."
            ),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use txn_validation_core::models::{Blotter, BlotterStatus, BlotterType, SettlementCriteria};
    use txn_validation_testing::repositories::InMemoryBlotterRepository;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn txn(quantity: i64, trade: NaiveDate, settle: NaiveDate) -> Transaction {
        Transaction::new("by", Decimal::from(quantity), "SEC", "PORT", trade, settle)
    }

    fn blotter(criteria: SettlementCriteria, kind: BlotterType, status: BlotterStatus) -> Blotter {
        Blotter {
            settlement_criteria: criteria,
            blotter_type: kind,
            trade_date: day(3),
            status,
            modified_at: Utc.with_ymd_and_hms(2024, 6, 3, 16, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn quantity_ceiling_is_exclusive() {
        let rule = QuantityCeiling::new(Decimal::from(100));
        assert_eq!(rule.evaluate(&txn(100, day(3), day(3))).await.unwrap(), Verdict::Compliant);
        assert_eq!(rule.evaluate(&txn(101, day(3), day(3))).await.unwrap(), Verdict::Broken);
    }

    #[tokio::test]
    async fn quantity_ceiling_is_configurable() {
        let rule = QuantityCeiling::new(Decimal::from(5_000));
        assert_eq!(rule.evaluate(&txn(4_999, day(3), day(3))).await.unwrap(), Verdict::Compliant);
        assert_eq!(rule.ceiling(), Decimal::from(5_000));
    }

    #[test]
    fn rule_names_default_to_type_names() {
        let blotters = Arc::new(InMemoryBlotterRepository::new());
        assert_eq!(QuantityCeiling::new(Decimal::ONE).name(), "QuantityCeiling");
        assert_eq!(PostedAfterBlotterSent::new(blotters).name(), "PostedAfterBlotterSent");
        assert_eq!(QuantityCeiling::new(Decimal::ONE).with_name("Max100").name(), "Max100");
    }

    #[tokio::test]
    async fn sent_t0_regular_blotter_breaks_same_day_transaction() {
        let blotters = Arc::new(InMemoryBlotterRepository::new());
        blotters.insert(blotter(SettlementCriteria::TPlusZero, BlotterType::Regular, BlotterStatus::Success));
        let rule = PostedAfterBlotterSent::new(blotters);

        let verdict = rule.evaluate(&txn(1, day(3), day(3))).await.unwrap();
        assert_eq!(verdict, Verdict::Broken);
    }

    #[tokio::test]
    async fn in_progress_t1_amendment_breaks_next_day_transaction() {
        let blotters = Arc::new(InMemoryBlotterRepository::new());
        blotters.insert(blotter(SettlementCriteria::TPlusOne, BlotterType::Amendment, BlotterStatus::InProgress));
        let rule = PostedAfterBlotterSent::new(blotters);

        let verdict = rule.evaluate(&txn(1, day(3), day(4))).await.unwrap();
        assert_eq!(verdict, Verdict::Broken);
    }

    #[tokio::test]
    async fn unknown_status_is_compliant() {
        let blotters = Arc::new(InMemoryBlotterRepository::new());
        blotters.insert(blotter(SettlementCriteria::TPlusZero, BlotterType::Regular, BlotterStatus::Unknown));
        let rule = PostedAfterBlotterSent::new(blotters);

        let verdict = rule.evaluate(&txn(1, day(3), day(3))).await.unwrap();
        assert_eq!(verdict, Verdict::Compliant);
    }

    #[tokio::test]
    async fn blotter_for_other_key_is_ignored() {
        let blotters = Arc::new(InMemoryBlotterRepository::new());
        blotters.insert(blotter(SettlementCriteria::TPlusOne, BlotterType::Amendment, BlotterStatus::Success));
        let rule = PostedAfterBlotterSent::new(blotters);

        let verdict = rule.evaluate(&txn(1, day(3), day(3))).await.unwrap();
        assert_eq!(verdict, Verdict::Compliant);
    }

    #[tokio::test]
    async fn missing_blotter_policy_decides_outcome() {
        let blotters: Arc<dyn BlotterRepository> = Arc::new(InMemoryBlotterRepository::new());

        let lenient = PostedAfterBlotterSent::new(Arc::clone(&blotters));
        assert_eq!(lenient.evaluate(&txn(1, day(3), day(3))).await.unwrap(), Verdict::Compliant);

        let strict = PostedAfterBlotterSent::new(blotters).missing_blotter(MissingBlotterPolicy::Indeterminate);
        let verdict = strict.evaluate(&txn(1, day(3), day(3))).await.unwrap();
        assert!(matches!(verdict, Verdict::Indeterminate { .. }));
    }

    #[tokio::test]
    async fn repository_failure_is_a_rule_error() {
        let blotters = Arc::new(InMemoryBlotterRepository::new());
        blotters.fail_with(RepositoryError::Io("share unavailable".into()));
        let rule = PostedAfterBlotterSent::new(blotters);

        let err = rule.evaluate(&txn(1, day(3), day(3))).await.unwrap_err();
        assert!(matches!(err, RuleError::Repository { .. }));
    }

    proptest::proptest! {
        #[test]
        fn quantity_ceiling_matches_comparison(quantity in -10_000i64..10_000, ceiling in 0i64..5_000) {
            let rule = QuantityCeiling::new(Decimal::from(ceiling));
            let verdict = tokio_test::block_on(rule.evaluate(&txn(quantity, day(3), day(3)))).unwrap();
            proptest::prop_assert_eq!(verdict.is_broken(), quantity > ceiling);
        }
    }
}
