//! Domain events produced from CDC envelopes.
//!
//! Every broker message maps to at most one [`DomainEvent`]. The set of variants is
//! closed: adding one forces every `match` in the handler and deserializer to be
//! revisited.

use crate::models::{Transaction, TransactionComment};
use thiserror::Error;

/// A change captured on the transaction stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A transaction row was inserted
    TransactionCreated(Transaction),
    /// A transaction row was updated
    TransactionUpdated {
        /// Row state before the update, when the source table publishes it
        before: Option<Transaction>,
        /// Row state after the update
        after: Transaction,
    },
    /// A transaction row was deleted
    TransactionDeleted(Transaction),
    /// A comment row was inserted
    TransactionCommentCreated(TransactionComment),
    /// A comment row was updated
    TransactionCommentUpdated {
        /// Row state before the update, when the source table publishes it
        before: Option<TransactionComment>,
        /// Row state after the update
        after: TransactionComment,
    },
    /// A comment row was deleted
    TransactionCommentDeleted(TransactionComment),
}

impl DomainEvent {
    /// Short name of the variant, used as a log and metric label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TransactionCreated(_) => "TransactionCreated",
            Self::TransactionUpdated { .. } => "TransactionUpdated",
            Self::TransactionDeleted(_) => "TransactionDeleted",
            Self::TransactionCommentCreated(_) => "TransactionCommentCreated",
            Self::TransactionCommentUpdated { .. } => "TransactionCommentUpdated",
            Self::TransactionCommentDeleted(_) => "TransactionCommentDeleted",
        }
    }

    /// The transaction snapshot that business rules apply to, if any.
    ///
    /// For updates this is the state **after** the change.
    #[must_use]
    pub const fn transaction(&self) -> Option<&Transaction> {
        match self {
            Self::TransactionCreated(txn)
            | Self::TransactionDeleted(txn)
            | Self::TransactionUpdated { after: txn, .. } => Some(txn),
            Self::TransactionCommentCreated(_)
            | Self::TransactionCommentUpdated { .. }
            | Self::TransactionCommentDeleted(_) => None,
        }
    }
}

/// A payload that does not have the expected CDC envelope shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeserializationError {
    /// Payload is not valid JSON
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(String),

    /// A required envelope field is absent
    #[error("CDC envelope is missing '{0}'")]
    MissingField(&'static str),

    /// A row snapshot required by the operation is absent or not an object
    #[error("CDC envelope for op '{op}' has no '{field}' row")]
    MissingRow {
        /// Operation code of the envelope
        op: String,
        /// Which snapshot was missing (`before` or `after`)
        field: &'static str,
    },

    /// A row snapshot does not have the columns of its record type
    #[error("Invalid {kind} record: {reason}")]
    InvalidRecord {
        /// Record type being built
        kind: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn txn(quantity: i64) -> Transaction {
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        Transaction::new("by", Decimal::from(quantity), "S", "P", day, day)
    }

    #[test]
    fn updated_event_exposes_after_state() {
        let event = DomainEvent::TransactionUpdated {
            before: Some(txn(1)),
            after: txn(2),
        };
        assert_eq!(event.transaction().unwrap().quantity, Decimal::from(2));
        assert_eq!(event.name(), "TransactionUpdated");
    }

    #[test]
    fn comment_events_carry_no_transaction() {
        let comment = TransactionComment {
            portfolio_id: "P".into(),
            trade_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            comment: None,
            attributes: serde_json::Map::new(),
        };
        assert!(DomainEvent::TransactionCommentDeleted(comment).transaction().is_none());
    }
}
