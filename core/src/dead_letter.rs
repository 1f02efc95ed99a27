//! Dead-letter storage for messages the consumer gave up on.
//!
//! Only used when the consumer runs with the dead-letter policy for unclassified
//! failures. Recording a message lets the consumer commit past it without losing it.

use crate::repository::RepositoryFuture;
use chrono::{DateTime, Utc};

/// A broker message that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMessage {
    /// Topic the message was read from
    pub topic: String,
    /// Partition the message was read from
    pub partition: i32,
    /// Offset of the message
    pub offset: i64,
    /// Raw payload, if the message had one
    pub payload: Option<Vec<u8>>,
    /// Why processing failed
    pub error: String,
    /// When processing failed
    pub failed_at: DateTime<Utc>,
}

/// Persistent store for [`FailedMessage`]s.
pub trait DeadLetterSink: Send + Sync {
    /// Record a failed message, returning the id of the stored entry.
    ///
    /// # Errors
    ///
    /// Returns a [`RepositoryError`](crate::repository::RepositoryError) if the
    /// message could not be stored.
    fn record(&self, message: &FailedMessage) -> RepositoryFuture<'_, i64>;
}
