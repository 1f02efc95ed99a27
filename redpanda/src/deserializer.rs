//! CDC envelope deserializer.
//!
//! Turns a raw broker payload of the shape
//!
//! ```text
//! { "payload": { "before": {..} | null, "after": {..} | null, "op": "c" | "u" | "d" | .. } }
//! ```
//!
//! into at most one [`DomainEvent`]. Unknown operation codes are recognized but
//! irrelevant and produce `Ok(None)`.
//!
//! Rows whose transaction code equals the comment sentinel (after trimming the
//! fixed-width padding) become comment events; every other row is a transaction.

use serde_json::{Map, Value};
use txn_validation_core::event::{DeserializationError, DomainEvent};
use txn_validation_core::models::{
    DEFAULT_COMMENT_SENTINEL, TRANSACTION_CODE_FIELD, Transaction, TransactionComment,
    date_from_epoch_days,
};

/// Column names containing this marker hold dates.
const DATE_KEY_MARKER: &str = "Date";

/// Deserializes CDC envelopes into domain events.
///
/// # Example
///
/// ```
/// use txn_validation_redpanda::CdcDeserializer;
///
/// let deserializer = CdcDeserializer::new();
/// let event = deserializer
///     .deserialize(br#"{"payload": {"before": null, "after": null, "op": "r"}}"#)
///     .unwrap();
/// assert!(event.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct CdcDeserializer {
    comment_sentinel: String,
}

impl Default for CdcDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Which record type a row snapshot should be built as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Transaction,
    Comment,
}

impl CdcDeserializer {
    /// Create a deserializer using the default comment sentinel (`*`).
    #[must_use]
    pub fn new() -> Self {
        Self::with_comment_sentinel(DEFAULT_COMMENT_SENTINEL)
    }

    /// Create a deserializer with a custom comment sentinel.
    #[must_use]
    pub fn with_comment_sentinel(sentinel: impl Into<String>) -> Self {
        Self {
            comment_sentinel: sentinel.into().trim().to_string(),
        }
    }

    /// The trimmed comment sentinel.
    #[must_use]
    pub fn comment_sentinel(&self) -> &str {
        &self.comment_sentinel
    }

    /// Deserialize one broker payload.
    ///
    /// Returns `Ok(None)` for operation codes other than `c`, `u`, and `d`.
    ///
    /// # Errors
    ///
    /// - [`DeserializationError::InvalidJson`] if the payload is not JSON
    /// - [`DeserializationError::MissingField`] if `payload`, `before`, `after`, or
    ///   `op` is absent
    /// - [`DeserializationError::MissingRow`] if the snapshot the operation needs is null
    /// - [`DeserializationError::InvalidRecord`] if a snapshot lacks required columns
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Option<DomainEvent>, DeserializationError> {
        let mut envelope: Value = serde_json::from_slice(bytes)
            .map_err(|e| DeserializationError::InvalidJson(e.to_string()))?;

        let payload = envelope
            .get_mut("payload")
            .and_then(Value::as_object_mut)
            .ok_or(DeserializationError::MissingField("payload"))?;

        let before = payload
            .remove("before")
            .ok_or(DeserializationError::MissingField("before"))?;
        let after = payload
            .remove("after")
            .ok_or(DeserializationError::MissingField("after"))?;
        let op = payload
            .get("op")
            .ok_or(DeserializationError::MissingField("op"))?;

        let Some(op) = op.as_str() else {
            tracing::debug!(op = %op, "Ignoring CDC envelope with non-string op");
            return Ok(None);
        };

        let before = convert_epoch_dates(before);
        let after = convert_epoch_dates(after);

        let event = match op {
            "c" => {
                let after = require_row(op, "after", after)?;
                match self.classify(&after) {
                    RowKind::Comment => {
                        DomainEvent::TransactionCommentCreated(TransactionComment::from_record(after)?)
                    }
                    RowKind::Transaction => {
                        DomainEvent::TransactionCreated(Transaction::from_record(after)?)
                    }
                }
            }
            "u" => {
                // Tables without full replica identity publish updates with a null `before`.
                let before = optional_row(before);
                let after = require_row(op, "after", after)?;
                match self.classify(&after) {
                    RowKind::Comment => DomainEvent::TransactionCommentUpdated {
                        before: before.map(TransactionComment::from_record).transpose()?,
                        after: TransactionComment::from_record(after)?,
                    },
                    RowKind::Transaction => DomainEvent::TransactionUpdated {
                        before: before.map(Transaction::from_record).transpose()?,
                        after: Transaction::from_record(after)?,
                    },
                }
            }
            "d" => {
                let before = require_row(op, "before", before)?;
                match self.classify(&before) {
                    RowKind::Comment => {
                        DomainEvent::TransactionCommentDeleted(TransactionComment::from_record(before)?)
                    }
                    RowKind::Transaction => {
                        DomainEvent::TransactionDeleted(Transaction::from_record(before)?)
                    }
                }
            }
            other => {
                tracing::debug!(op = other, "Ignoring CDC envelope with unhandled op");
                return Ok(None);
            }
        };

        Ok(Some(event))
    }

    fn classify(&self, row: &Map<String, Value>) -> RowKind {
        let is_comment = row
            .get(TRANSACTION_CODE_FIELD)
            .and_then(Value::as_str)
            .is_some_and(|code| code.trim() == self.comment_sentinel);
        if is_comment {
            RowKind::Comment
        } else {
            RowKind::Transaction
        }
    }
}

fn require_row(
    op: &str,
    field: &'static str,
    row: Value,
) -> Result<Map<String, Value>, DeserializationError> {
    match row {
        Value::Object(map) => Ok(map),
        _ => Err(DeserializationError::MissingRow {
            op: op.to_string(),
            field,
        }),
    }
}

fn optional_row(row: Value) -> Option<Map<String, Value>> {
    match row {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Rewrite integer values under date-like keys as `YYYY-MM-DD` strings.
///
/// Non-object snapshots pass through untouched. Out-of-range day counts are left
/// as integers and rejected later by the record constructor.
fn convert_epoch_dates(row: Value) -> Value {
    let Value::Object(mut map) = row else {
        return row;
    };
    for (key, value) in &mut map {
        if !key.contains(DATE_KEY_MARKER) {
            continue;
        }
        if let Some(date) = value.as_i64().and_then(date_from_epoch_days) {
            *value = Value::String(date.format("%Y-%m-%d").to_string());
        }
    }
    Value::Object(map)
}
