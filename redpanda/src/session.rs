//! Broker session seam and its rdkafka implementation.
//!
//! The consumer loop only needs four things from a broker: poll one record with a
//! bounded wait, commit a record, rewind to a record, and close. [`BrokerSession`]
//! captures exactly that, so the loop can be driven by a scripted session in tests
//! and by [`KafkaSession`] in production.
//!
//! # Delivery semantics
//!
//! `KafkaSession` runs with `enable.auto.commit = false`. A record is committed only
//! when the loop says so, by committing `offset + 1` for its partition. Rewinding
//! seeks the partition back to the record so it is redelivered on the next poll.

use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a broker session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session could not be created or subscribed
    #[error("Broker session could not be created: {0}")]
    Configuration(String),

    /// An offset commit failed
    #[error("Failed to commit {topic}[{partition}]@{offset}: {reason}")]
    Commit {
        /// Topic of the record
        topic: String,
        /// Partition of the record
        partition: i32,
        /// Offset of the record
        offset: i64,
        /// Broker-reported reason
        reason: String,
    },

    /// Seeking back to a record failed
    #[error("Failed to rewind {topic}[{partition}] to {offset}: {reason}")]
    Rewind {
        /// Topic of the record
        topic: String,
        /// Partition of the record
        partition: i32,
        /// Offset of the record
        offset: i64,
        /// Broker-reported reason
        reason: String,
    },

    /// Leaving the consumer group failed
    #[error("Failed to close broker session: {0}")]
    Close(String),
}

/// Where a record lives on the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessagePosition {
    /// Topic name
    pub topic: String,
    /// Partition number
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
}

impl std::fmt::Display for MessagePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// A record detached from the broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic name
    pub topic: String,
    /// Partition number
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Record value; `None` for tombstones
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    /// Position of this record.
    #[must_use]
    pub fn position(&self) -> MessagePosition {
        MessagePosition {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    /// Nothing arrived within the poll timeout
    Idle,
    /// The broker reported an error instead of a record
    BrokerError(String),
    /// A record arrived
    Message(InboundMessage),
}

/// The broker operations the consumer loop depends on.
///
/// One session is owned by exactly one consumer loop; nothing here needs to be
/// shared across tasks.
pub trait BrokerSession: Send {
    /// Wait up to `timeout` for the next record.
    fn poll(&mut self, timeout: Duration) -> impl Future<Output = Polled> + Send;

    /// Mark the record at `position` as processed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Commit`] if the broker rejects the commit.
    fn commit(&mut self, position: &MessagePosition) -> Result<(), SessionError>;

    /// Arrange for the record at `position` to be delivered again.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rewind`] if the partition cannot be repositioned.
    fn rewind(&mut self, position: &MessagePosition) -> Result<(), SessionError>;

    /// Leave the consumer group and release the client.
    ///
    /// Must be safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Close`] if the broker could not be notified.
    fn close(&mut self) -> Result<(), SessionError>;
}

/// Client context that forces the first assignment to start from the beginning.
///
/// Later assignments (after a rebalance) resume from committed offsets as usual.
pub struct ResetContext {
    reset_offsets: bool,
    assigned_once: AtomicBool,
}

impl ResetContext {
    /// Create a context; `reset_offsets` enables the replay on first assignment.
    #[must_use]
    pub const fn new(reset_offsets: bool) -> Self {
        Self {
            reset_offsets,
            assigned_once: AtomicBool::new(false),
        }
    }

    /// Whether the next assignment should be rewound to the beginning.
    ///
    /// Returns `true` at most once.
    fn take_reset(&self) -> bool {
        self.reset_offsets && !self.assigned_once.swap(true, Ordering::SeqCst)
    }
}

impl ClientContext for ResetContext {}

impl ConsumerContext for ResetContext {
    fn post_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(assignment) => {
                tracing::info!(partitions = assignment.count(), "Partitions assigned");
                if !self.take_reset() {
                    return;
                }
                let mut reset = (*assignment).clone();
                let result = reset
                    .set_all_offsets(Offset::Beginning)
                    .and_then(|()| base_consumer.assign(&reset));
                match result {
                    Ok(()) => tracing::warn!(
                        partitions = reset.count(),
                        "Reset assigned partitions to the earliest offset"
                    ),
                    Err(e) => tracing::error!(error = %e, "Failed to reset assigned partitions"),
                }
            }
            Rebalance::Revoke(revoked) => {
                tracing::info!(partitions = revoked.count(), "Partitions revoked");
            }
            Rebalance::Error(e) => {
                tracing::error!(error = %e, "Rebalance failed");
            }
        }
    }
}

/// Kafka-compatible broker session built on an rdkafka [`StreamConsumer`].
///
/// # Example
///
/// ```no_run
/// use txn_validation_redpanda::KafkaSession;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = KafkaSession::builder()
///     .brokers("localhost:9092")
///     .consumer_group("txn-validation")
///     .topic("ledger.dbo.transactions")
///     .reset_offsets(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct KafkaSession {
    consumer: StreamConsumer<ResetContext>,
    topics: Vec<String>,
    last_committed: BTreeMap<(String, i32), i64>,
    seek_timeout: Duration,
    closed: bool,
}

impl KafkaSession {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> KafkaSessionBuilder {
        KafkaSessionBuilder::default()
    }

    /// Subscribed topics.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

impl BrokerSession for KafkaSession {
    fn poll(&mut self, timeout: Duration) -> impl Future<Output = Polled> + Send {
        async move {
            match tokio::time::timeout(timeout, self.consumer.recv()).await {
                Err(_elapsed) => Polled::Idle,
                Ok(Err(e)) => Polled::BrokerError(e.to_string()),
                Ok(Ok(message)) => Polled::Message(InboundMessage {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                    payload: message.payload().map(<[u8]>::to_vec),
                }),
            }
        }
    }

    fn commit(&mut self, position: &MessagePosition) -> Result<(), SessionError> {
        let commit_error = |reason: String| SessionError::Commit {
            topic: position.topic.clone(),
            partition: position.partition,
            offset: position.offset,
            reason,
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&position.topic, position.partition, Offset::Offset(position.offset + 1))
            .map_err(|e| commit_error(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(|e| commit_error(e.to_string()))?;

        self.last_committed
            .insert((position.topic.clone(), position.partition), position.offset);
        tracing::debug!(position = %position, "Committed offset");
        Ok(())
    }

    fn rewind(&mut self, position: &MessagePosition) -> Result<(), SessionError> {
        self.consumer
            .seek(
                &position.topic,
                position.partition,
                Offset::Offset(position.offset),
                self.seek_timeout,
            )
            .map_err(|e| SessionError::Rewind {
                topic: position.topic.clone(),
                partition: position.partition,
                offset: position.offset,
                reason: e.to_string(),
            })?;
        tracing::debug!(position = %position, "Rewound partition");
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        for ((topic, partition), offset) in &self.last_committed {
            tracing::info!(topic = %topic, partition, offset, "Last committed offset");
        }
        self.consumer.unsubscribe();
        tracing::info!(topics = ?self.topics, "Left consumer group");
        Ok(())
    }
}

impl Drop for KafkaSession {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("Broker session dropped without close; leaving consumer group");
            self.consumer.unsubscribe();
        }
    }
}

/// Builder for a [`KafkaSession`].
#[derive(Debug, Clone, Default)]
pub struct KafkaSessionBuilder {
    brokers: Option<String>,
    consumer_group: Option<String>,
    topics: Vec<String>,
    session_timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
    security_protocol: Option<String>,
    sasl_mechanism: Option<String>,
    sasl_username: Option<String>,
    sasl_password: Option<String>,
    reset_offsets: bool,
}

impl KafkaSessionBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the consumer group ID.
    #[must_use]
    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = Some(group.into());
        self
    }

    /// Add a topic to subscribe to.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    /// Add several topics to subscribe to.
    #[must_use]
    pub fn topics<I, T>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    /// Set the group session timeout.
    ///
    /// Default: 45 seconds
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Where a group without committed offsets starts reading.
    ///
    /// Default: `"earliest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Set `security.protocol` (e.g. `SASL_SSL`).
    #[must_use]
    pub fn security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Set SASL credentials.
    #[must_use]
    pub fn sasl(
        mut self,
        mechanism: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.sasl_mechanism = Some(mechanism.into());
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self
    }

    /// Replay every assigned partition from the beginning on first assignment.
    #[must_use]
    pub const fn reset_offsets(mut self, reset: bool) -> Self {
        self.reset_offsets = reset;
        self
    }

    /// Create the consumer and subscribe.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if brokers, group, or topics are
    /// missing, or if the client cannot be created or subscribed.
    pub fn build(self) -> Result<KafkaSession, SessionError> {
        let brokers = self
            .brokers
            .ok_or_else(|| SessionError::Configuration("Brokers not configured".to_string()))?;
        let group = self
            .consumer_group
            .ok_or_else(|| SessionError::Configuration("Consumer group not configured".to_string()))?;
        if self.topics.is_empty() {
            return Err(SessionError::Configuration("No topics configured".to_string()));
        }

        let session_timeout = self.session_timeout.unwrap_or(Duration::from_secs(45));
        let auto_offset_reset = self.auto_offset_reset.unwrap_or_else(|| "earliest".to_string());

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &brokers)
            .set("group.id", &group)
            .set("enable.auto.commit", "false") // Commits are driven by the handler
            .set("auto.offset.reset", &auto_offset_reset)
            .set("session.timeout.ms", session_timeout.as_millis().to_string())
            .set("enable.partition.eof", "false");
        if let Some(protocol) = &self.security_protocol {
            config.set("security.protocol", protocol);
        }
        if let (Some(mechanism), Some(username), Some(password)) =
            (&self.sasl_mechanism, &self.sasl_username, &self.sasl_password)
        {
            config
                .set("sasl.mechanism", mechanism)
                .set("sasl.username", username)
                .set("sasl.password", password);
        }

        let consumer: StreamConsumer<ResetContext> = config
            .create_with_context(ResetContext::new(self.reset_offsets))
            .map_err(|e| SessionError::Configuration(format!("Failed to create consumer: {e}")))?;

        let topic_refs: Vec<&str> = self.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| SessionError::Configuration(format!("Failed to subscribe to topics: {e}")))?;

        tracing::info!(
            brokers = %brokers,
            consumer_group = %group,
            topics = ?self.topics,
            auto_offset_reset = %auto_offset_reset,
            reset_offsets = self.reset_offsets,
            manual_commit = true,
            "Subscribed to topics"
        );

        Ok(KafkaSession {
            consumer,
            topics: self.topics,
            last_committed: BTreeMap::new(),
            seek_timeout: Duration::from_secs(10),
            closed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_session_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<KafkaSession>();
    }

    #[test]
    fn reset_applies_to_first_assignment_only() {
        let context = ResetContext::new(true);
        assert!(context.take_reset());
        assert!(!context.take_reset());

        let context = ResetContext::new(false);
        assert!(!context.take_reset());
    }

    #[test]
    fn builder_requires_brokers_group_and_topics() {
        let err = KafkaSession::builder().build().err();
        assert_eq!(err, Some(SessionError::Configuration("Brokers not configured".into())));

        let err = KafkaSession::builder().brokers("localhost:9092").build().err();
        assert_eq!(err, Some(SessionError::Configuration("Consumer group not configured".into())));

        let err = KafkaSession::builder()
            .brokers("localhost:9092")
            .consumer_group("g")
            .build()
            .err();
        assert_eq!(err, Some(SessionError::Configuration("No topics configured".into())));
    }

    #[test]
    fn position_display() {
        let message = InboundMessage {
            topic: "txns".into(),
            partition: 2,
            offset: 41,
            payload: None,
        };
        assert_eq!(message.position().to_string(), "txns[2]@41");
    }
}
