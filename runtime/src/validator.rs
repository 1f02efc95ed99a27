//! Ordered, fail-fast rule evaluation.
//!
//! [`Validator::validate`] runs rules in the order they were added and stops at the
//! first one that does not pass. A validator with no rules accepts everything.
//!
//! Each evaluation can be bounded by a per-rule timeout so a stuck reference-data
//! lookup cannot stall the consumer indefinitely.

use crate::metrics::ValidationMetrics;
use crate::rules::{RuleError, ValidationRule, Verdict};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use txn_validation_core::models::{Alert, Transaction};

/// A transaction broke a rule.
#[derive(Clone)]
pub struct RuleViolation {
    /// The rule that was broken
    pub rule: Arc<dyn ValidationRule>,
    /// The offending transaction
    pub transaction: Transaction,
}

impl RuleViolation {
    /// Alert to send for this violation.
    #[must_use]
    pub fn alert(&self) -> Alert {
        self.rule.violation_alert(&self.transaction)
    }
}

impl fmt::Debug for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleViolation")
            .field("rule", &self.rule.name())
            .field("transaction", &self.transaction)
            .finish()
    }
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed rule {}", self.transaction, self.rule.name())
    }
}

impl std::error::Error for RuleViolation {}

/// Why a transaction did not pass validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A rule was broken
    #[error(transparent)]
    Violation(RuleViolation),

    /// A rule could not reach a verdict
    #[error("Rule '{rule}' could not be evaluated: {reason}")]
    Indeterminate {
        /// Rule that could not be evaluated
        rule: String,
        /// What was missing
        reason: String,
    },

    /// A rule's collaborator failed
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// A rule took longer than the configured timeout
    #[error("Rule '{rule}' timed out after {timeout:?}")]
    TimedOut {
        /// Rule that timed out
        rule: String,
        /// Configured timeout
        timeout: Duration,
    },
}

/// An ordered collection of rules.
#[derive(Clone, Default)]
pub struct Validator {
    rules: Vec<Arc<dyn ValidationRule>>,
    rule_timeout: Option<Duration>,
}

impl Validator {
    /// Create a new validator builder.
    #[must_use]
    pub fn builder() -> ValidatorBuilder {
        ValidatorBuilder::default()
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Arc<dyn ValidationRule>] {
        &self.rules
    }

    /// Run every rule against `transaction`, stopping at the first that does not pass.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::Violation`] for the first broken rule
    /// - [`ValidationError::Indeterminate`] if a rule could not reach a verdict
    /// - [`ValidationError::Rule`] if a rule's repository failed
    /// - [`ValidationError::TimedOut`] if a rule exceeded the per-rule timeout
    pub async fn validate(&self, transaction: &Transaction) -> Result<(), ValidationError> {
        ValidationMetrics::record_validated();

        for rule in &self.rules {
            let evaluation = rule.evaluate(transaction);
            let verdict = match self.rule_timeout {
                Some(timeout) => tokio::time::timeout(timeout, evaluation).await.map_err(|_| {
                    ValidationError::TimedOut {
                        rule: rule.name().to_string(),
                        timeout,
                    }
                })??,
                None => evaluation.await?,
            };

            tracing::trace!(rule = rule.name(), verdict = ?verdict, "Rule evaluated");

            match verdict {
                Verdict::Compliant => {}
                Verdict::Broken => {
                    ValidationMetrics::record_violation(rule.name());
                    return Err(ValidationError::Violation(RuleViolation {
                        rule: Arc::clone(rule),
                        transaction: transaction.clone(),
                    }));
                }
                Verdict::Indeterminate { reason } => {
                    return Err(ValidationError::Indeterminate {
                        rule: rule.name().to_string(),
                        reason,
                    });
                }
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
            .field("rule_timeout", &self.rule_timeout)
            .finish()
    }
}

/// Builder for [`Validator`].
#[derive(Default)]
pub struct ValidatorBuilder {
    rules: Vec<Arc<dyn ValidationRule>>,
    rule_timeout: Option<Duration>,
}

impl ValidatorBuilder {
    /// Append a rule. Rules run in the order they are added.
    #[must_use]
    pub fn rule(mut self, rule: Arc<dyn ValidationRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Bound each rule evaluation. Unbounded by default.
    #[must_use]
    pub const fn rule_timeout(mut self, timeout: Duration) -> Self {
        self.rule_timeout = Some(timeout);
        self
    }

    /// Build the [`Validator`].
    #[must_use]
    pub fn build(self) -> Validator {
        Validator {
            rules: self.rules,
            rule_timeout: self.rule_timeout,
        }
    }
}
