//! Dead Letter Queue (DLQ) for broker messages the consumer gave up on.
//!
//! Provides persistent storage and triage of messages that could not be processed,
//! so the consumer can commit past them without losing them.

use crate::database_error;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use txn_validation_core::dead_letter::{DeadLetterSink, FailedMessage};
use txn_validation_core::repository::{RepositoryError, RepositoryFuture};

/// Status of a failed message in the Dead Letter Queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DLQStatus {
    /// Message is pending investigation/reprocessing
    Pending,
    /// Message is currently being processed
    Processing,
    /// Message was successfully reprocessed
    Resolved,
    /// Message was permanently discarded
    Discarded,
}

impl DLQStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidRow`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, RepositoryError> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(RepositoryError::InvalidRow(format!("Invalid DLQ status: {s}"))),
        }
    }
}

/// An entry in the Dead Letter Queue.
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    /// Unique identifier for this DLQ entry
    pub id: i64,
    /// The message that failed, with its failure reason and time
    pub message: FailedMessage,
    /// Current processing status
    pub status: DLQStatus,
    /// When the entry was last touched
    pub updated_at: DateTime<Utc>,
    /// When the failure was resolved (if applicable)
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who/what resolved the failure
    pub resolved_by: Option<String>,
    /// Notes about the resolution
    pub resolution_notes: Option<String>,
}

/// `PostgreSQL`-based Dead Letter Queue.
///
/// # Example
///
/// ```no_run
/// use txn_validation_postgres::{DLQStatus, DeadLetterQueue};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
///
/// let pending = dlq.list_pending(100).await?;
/// println!("Pending failures: {}", pending.len());
///
/// if let Some(entry) = pending.first() {
///     dlq.update_status(entry.id, DLQStatus::Processing).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Create a new Dead Letter Queue with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add a failed message to the DLQ, returning the id of the new entry.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the insert fails.
    pub async fn add_entry(&self, message: &FailedMessage) -> Result<i64, RepositoryError> {
        let id: (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_messages (
                topic, partition_id, message_offset, payload, error_message, failed_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(&message.topic)
        .bind(message.partition)
        .bind(message.offset)
        .bind(message.payload.as_deref())
        .bind(&message.error)
        .bind(message.failed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| database_error(&e))?;

        tracing::warn!(
            dlq_id = id.0,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            error = %message.error,
            "Message added to Dead Letter Queue"
        );

        metrics::counter!("consumer.dlq.added", "topic" => message.topic.clone()).increment(1);

        Ok(id.0)
    }

    /// List pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the query fails.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, RepositoryError> {
        self.list_by_status(DLQStatus::Pending, limit).await
    }

    /// List entries by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the query fails.
    pub async fn list_by_status(
        &self,
        status: DLQStatus,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r"
            SELECT
                id, topic, partition_id, message_offset, payload, error_message,
                status, failed_at, updated_at, resolved_at, resolved_by, resolution_notes
            FROM failed_messages
            WHERE status = $1
            ORDER BY failed_at ASC, id ASC
            LIMIT $2
            ",
        )
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error(&e))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Get a specific entry by ID.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the query fails or the entry is not found.
    pub async fn get_by_id(&self, id: i64) -> Result<DeadLetterEntry, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT
                id, topic, partition_id, message_offset, payload, error_message,
                status, failed_at, updated_at, resolved_at, resolved_by, resolution_notes
            FROM failed_messages
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| database_error(&e))?;

        Self::row_to_entry(&row)
    }

    /// Update the status of an entry.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the update fails.
    pub async fn update_status(&self, id: i64, status: DLQStatus) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE failed_messages
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            ",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error(&e))?;

        tracing::info!(dlq_id = id, status = status.as_str(), "DLQ entry status updated");

        Ok(())
    }

    /// Mark an entry as resolved.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the update fails.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE failed_messages
            SET status = 'resolved',
                updated_at = NOW(),
                resolved_at = NOW(),
                resolved_by = $1,
                resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error(&e))?;

        tracing::info!(dlq_id = id, resolved_by = resolved_by, "DLQ entry marked as resolved");

        metrics::counter!("consumer.dlq.resolved").increment(1);

        Ok(())
    }

    /// Mark an entry as discarded.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE failed_messages
            SET status = 'discarded',
                updated_at = NOW(),
                resolved_at = NOW(),
                resolution_notes = $1
            WHERE id = $2
            ",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error(&e))?;

        tracing::warn!(dlq_id = id, reason = reason, "DLQ entry marked as discarded");

        metrics::counter!("consumer.dlq.discarded").increment(1);

        Ok(())
    }

    /// Count pending entries.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*)
            FROM failed_messages
            WHERE status = 'pending'
            ",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| database_error(&e))?;

        Ok(count)
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<DeadLetterEntry, RepositoryError> {
        let invalid = |e: sqlx::Error| RepositoryError::InvalidRow(e.to_string());
        let status: String = row.try_get("status").map_err(invalid)?;

        Ok(DeadLetterEntry {
            id: row.try_get("id").map_err(invalid)?,
            message: FailedMessage {
                topic: row.try_get("topic").map_err(invalid)?,
                partition: row.try_get("partition_id").map_err(invalid)?,
                offset: row.try_get("message_offset").map_err(invalid)?,
                payload: row.try_get("payload").map_err(invalid)?,
                error: row.try_get("error_message").map_err(invalid)?,
                failed_at: row.try_get("failed_at").map_err(invalid)?,
            },
            status: DLQStatus::parse(&status)?,
            updated_at: row.try_get("updated_at").map_err(invalid)?,
            resolved_at: row.try_get("resolved_at").map_err(invalid)?,
            resolved_by: row.try_get("resolved_by").map_err(invalid)?,
            resolution_notes: row.try_get("resolution_notes").map_err(invalid)?,
        })
    }
}

impl DeadLetterSink for DeadLetterQueue {
    fn record(&self, message: &FailedMessage) -> RepositoryFuture<'_, i64> {
        let message = message.clone();
        Box::pin(async move { self.add_entry(&message).await })
    }
}
