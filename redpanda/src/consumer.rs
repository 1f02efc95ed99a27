//! The message consumer loop.
//!
//! ```text
//!            ┌───────────────────────────────┐
//!            ▼                               │
//!   ┌──────────────┐  idle      ┌──────────┐ │
//!   │   Polling    ├───────────►│heartbeat ├─┤
//!   └──────┬───────┘            └──────────┘ │
//!          │ broker error ───────────────────┤ (no commit)
//!          │ record                          │
//!          ▼                                 │
//!   ┌──────────────┐ commit / withhold+rewind│
//!   │ deserialize  ├────────────────────────►┘
//!   │   + handle   │
//!   └──────────────┘
//! ```
//!
//! One loop owns one [`BrokerSession`] and processes records strictly one at a time.
//! A record is committed only when it was irrelevant (unknown op, tombstone), the
//! handler approved it, the deserialization hook approved it, or it was stored in
//! the dead-letter sink. Otherwise its partition is rewound to it and the loop backs
//! off before polling again, so the record is retried rather than skipped.
//!
//! A rewind that fails stays pending: the seek is retried before every poll, and no
//! poll happens until it succeeds. Records of that partition past the withheld one
//! are never committed while it is pending.
//!
//! Heartbeats are written on idle polls only, which bounds their write volume under
//! load. The session is closed on every exit path.

use crate::deserializer::CdcDeserializer;
use crate::session::{BrokerSession, InboundMessage, MessagePosition, Polled, SessionError};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use txn_validation_core::dead_letter::{DeadLetterSink, FailedMessage};
use txn_validation_core::environment::{Clock, SystemClock};
use txn_validation_core::handler::{EventHandler, HandlerError};
use txn_validation_core::models::Heartbeat;
use txn_validation_core::repository::HeartbeatRepository;
use txn_validation_runtime::metrics::ConsumerMetrics;
use txn_validation_runtime::retry::RetryPolicy;

/// Log line stored with every heartbeat.
pub const HEARTBEAT_LOG: &str = "HEARTBEAT";

/// What to do with a record whose handling failed for an unclassified reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnhandledErrorPolicy {
    /// Rewind and retry the record until the cause is fixed
    #[default]
    Withhold,
    /// Store the record in the dead-letter sink, then commit past it
    DeadLetter,
}

impl FromStr for UnhandledErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "withhold" => Ok(Self::Withhold),
            "dead-letter" | "dead_letter" | "deadletter" => Ok(Self::DeadLetter),
            other => Err(format!("unknown unhandled error policy '{other}'")),
        }
    }
}

impl fmt::Display for UnhandledErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Withhold => "withhold",
            Self::DeadLetter => "dead-letter",
        })
    }
}

/// Errors building a [`MessageConsumer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// The dead-letter policy was chosen without a sink to write to
    #[error("Unhandled error policy is dead-letter but no dead-letter sink is configured")]
    MissingDeadLetterSink,
}

/// Identity under which heartbeats are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatIdentity {
    /// Logical group of the process
    pub group: String,
    /// Run name of the process
    pub name: String,
    /// Path of the process log file, if any
    pub log_file_path: Option<String>,
}

impl HeartbeatIdentity {
    /// Create an identity without a log file path.
    #[must_use]
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            log_file_path: None,
        }
    }

    /// Attach the path of the process log file.
    #[must_use]
    pub fn with_log_file_path(mut self, path: impl Into<String>) -> Self {
        self.log_file_path = Some(path.into());
        self
    }
}

/// Counters describing one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Polls that returned nothing
    pub idle_polls: u64,
    /// Heartbeats written
    pub heartbeats: u64,
    /// Heartbeats that failed to write
    pub heartbeat_failures: u64,
    /// Records committed
    pub committed: u64,
    /// Records withheld and rewound
    pub withheld: u64,
    /// Errors reported by the broker, including failed commits and rewinds
    pub broker_errors: u64,
    /// Records stored in the dead-letter sink
    pub dead_lettered: u64,
}

/// Decision reached for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Commit,
    DeadLettered,
    Withhold(&'static str),
}

/// A partition that must be read again from a withheld record.
#[derive(Debug, Clone)]
struct PendingRewind {
    position: MessagePosition,
    /// Whether the seek back to `position` has gone through
    seeked: bool,
}

fn partition_key(position: &MessagePosition) -> (String, i32) {
    (position.topic.clone(), position.partition)
}

/// Consumes CDC records, hands them to an [`EventHandler`], and commits what the
/// handler approves.
pub struct MessageConsumer<S: BrokerSession> {
    session: S,
    deserializer: CdcDeserializer,
    handler: Arc<dyn EventHandler>,
    poll_timeout: Duration,
    backoff: RetryPolicy,
    heartbeats: Option<(Arc<dyn HeartbeatRepository>, HeartbeatIdentity)>,
    clock: Arc<dyn Clock>,
    unhandled_error_policy: UnhandledErrorPolicy,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    stats: ConsumerStats,
    consecutive_withholds: usize,
    pending_rewinds: BTreeMap<(String, i32), PendingRewind>,
}

impl<S: BrokerSession> MessageConsumer<S> {
    /// Start building a consumer over `session` that delegates to `handler`.
    #[must_use]
    pub fn builder(session: S, handler: Arc<dyn EventHandler>) -> MessageConsumerBuilder<S> {
        MessageConsumerBuilder {
            session,
            handler,
            deserializer: CdcDeserializer::new(),
            poll_timeout: Duration::from_secs(5),
            backoff: RetryPolicy::builder()
                .initial_delay(Duration::from_secs(1))
                .max_delay(Duration::from_secs(60))
                .build(),
            heartbeats: None,
            clock: Arc::new(SystemClock),
            unhandled_error_policy: UnhandledErrorPolicy::default(),
            dead_letters: None,
        }
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Run until `shutdown` resolves.
    ///
    /// Processing errors never end the loop; they only decide whether a record is
    /// committed. The session is closed before returning, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Close`] if the session could not be closed cleanly.
    pub async fn run<F>(mut self, shutdown: F) -> Result<ConsumerStats, SessionError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            poll_timeout_ms = u64::try_from(self.poll_timeout.as_millis()).unwrap_or(u64::MAX),
            heartbeat = self.heartbeats.is_some(),
            unhandled_error_policy = %self.unhandled_error_policy,
            "Consumer started"
        );

        loop {
            if let Some(delay) = self.retry_pending_rewinds() {
                tokio::select! {
                    biased;
                    () = &mut shutdown => break,
                    () = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            let polled = tokio::select! {
                biased;
                () = &mut shutdown => break,
                polled = self.session.poll(self.poll_timeout) => polled,
            };

            let Some(delay) = self.step(polled).await else {
                continue;
            };

            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(stats = ?self.stats, "Shutting down consumer");
        self.session.close()?;
        Ok(self.stats)
    }

    /// Handle one poll outcome, returning how long to back off, if at all.
    async fn step(&mut self, polled: Polled) -> Option<Duration> {
        match polled {
            Polled::Idle => {
                self.stats.idle_polls += 1;
                ConsumerMetrics::record_idle_poll();
                self.write_heartbeat().await;
                None
            }
            Polled::BrokerError(error) => {
                tracing::warn!(error = %error, "Broker reported an error; nothing committed");
                self.stats.broker_errors += 1;
                ConsumerMetrics::record_broker_error();
                Some(self.backoff.delay_for_attempt(0))
            }
            Polled::Message(message) => {
                let position = message.position();
                if self.is_behind_pending_rewind(&position) {
                    tracing::debug!(position = %position, "Skipping record past a withheld one");
                    self.stats.withheld += 1;
                    ConsumerMetrics::record_withheld("pending_rewind");
                    return None;
                }
                let started = Instant::now();
                let disposition = self.process(message).await;
                ConsumerMetrics::record_message_duration(started.elapsed());
                self.settle(&position, disposition)
            }
        }
    }

    /// Retry seeks that failed earlier, returning how long to back off if any still fails.
    fn retry_pending_rewinds(&mut self) -> Option<Duration> {
        let mut failed = false;
        for pending in self.pending_rewinds.values_mut().filter(|p| !p.seeked) {
            match self.session.rewind(&pending.position) {
                Ok(()) => {
                    tracing::info!(position = %pending.position, "Rewound partition after earlier failure");
                    pending.seeked = true;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to rewind partition; polling paused");
                    self.stats.broker_errors += 1;
                    ConsumerMetrics::record_broker_error();
                    failed = true;
                }
            }
        }
        if !failed {
            return None;
        }
        let delay = self.backoff.delay_for_attempt(self.consecutive_withholds);
        self.consecutive_withholds = self.consecutive_withholds.saturating_add(1);
        Some(delay)
    }

    /// Whether `position` lies past a withheld record of its partition.
    ///
    /// Reaching the withheld record again clears the pending rewind.
    fn is_behind_pending_rewind(&mut self, position: &MessagePosition) -> bool {
        let key = partition_key(position);
        match self.pending_rewinds.get(&key) {
            Some(pending) if position.offset > pending.position.offset => true,
            Some(_) => {
                self.pending_rewinds.remove(&key);
                false
            }
            None => false,
        }
    }

    async fn write_heartbeat(&mut self) {
        let Some((repository, identity)) = &self.heartbeats else {
            return;
        };

        let mut heartbeat = Heartbeat::new(&identity.group, &identity.name, self.clock.now())
            .with_log(HEARTBEAT_LOG);
        if let Some(path) = &identity.log_file_path {
            heartbeat = heartbeat.with_log_file_path(path);
        }

        match repository.create(&heartbeat).await {
            Ok(_) => {
                tracing::debug!(heartbeat = %heartbeat, "Heartbeat written");
                self.stats.heartbeats += 1;
                ConsumerMetrics::record_heartbeat(true);
            }
            Err(e) => {
                tracing::warn!(error = %e, repository = repository.name(), "Failed to write heartbeat");
                self.stats.heartbeat_failures += 1;
                ConsumerMetrics::record_heartbeat(false);
            }
        }
    }

    async fn process(&self, message: InboundMessage) -> Disposition {
        let Some(payload) = message.payload.as_deref() else {
            tracing::debug!(position = %message.position(), "Committing tombstone");
            return Disposition::Commit;
        };

        let event = match self.deserializer.deserialize(payload) {
            Ok(Some(event)) => event,
            Ok(None) => return Disposition::Commit,
            Err(error) => {
                tracing::warn!(position = %message.position(), error = %error, "Failed to deserialize record");
                return if self.handler.handle_deserialization_error(&error) {
                    Disposition::Commit
                } else {
                    Disposition::Withhold("deserialization")
                };
            }
        };

        match self.handler.handle(&event).await {
            Ok(true) => Disposition::Commit,
            Ok(false) => {
                tracing::info!(position = %message.position(), event = event.name(), "Handler withheld record");
                Disposition::Withhold("handler")
            }
            Err(HandlerError::Deserialization(error)) => {
                if self.handler.handle_deserialization_error(&error) {
                    Disposition::Commit
                } else {
                    Disposition::Withhold("deserialization")
                }
            }
            Err(HandlerError::Failed(error)) => {
                tracing::error!(
                    position = %message.position(),
                    event = event.name(),
                    error = %error,
                    "Unhandled error while processing record"
                );
                self.unhandled(&message, &error.to_string()).await
            }
        }
    }

    async fn unhandled(&self, message: &InboundMessage, error: &str) -> Disposition {
        let (UnhandledErrorPolicy::DeadLetter, Some(sink)) =
            (self.unhandled_error_policy, &self.dead_letters)
        else {
            return Disposition::Withhold("unhandled");
        };

        let failed = FailedMessage {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            payload: message.payload.clone(),
            error: error.to_string(),
            failed_at: self.clock.now(),
        };
        match sink.record(&failed).await {
            Ok(id) => {
                tracing::warn!(position = %message.position(), dead_letter_id = id, "Record moved to dead-letter queue");
                Disposition::DeadLettered
            }
            Err(e) => {
                tracing::error!(position = %message.position(), error = %e, "Failed to dead-letter record");
                Disposition::Withhold("dead_letter_failed")
            }
        }
    }

    fn settle(&mut self, position: &MessagePosition, disposition: Disposition) -> Option<Duration> {
        match disposition {
            Disposition::Commit | Disposition::DeadLettered => {
                if disposition == Disposition::DeadLettered {
                    self.stats.dead_lettered += 1;
                    ConsumerMetrics::record_dead_lettered();
                }
                if self.consecutive_withholds > 0 {
                    tracing::info!(
                        position = %position,
                        withholds = self.consecutive_withholds,
                        "Record committed after earlier withholds"
                    );
                }
                self.consecutive_withholds = 0;
                match self.session.commit(position) {
                    Ok(()) => {
                        self.stats.committed += 1;
                        ConsumerMetrics::record_commit();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Commit failed (record may be redelivered)");
                        self.stats.broker_errors += 1;
                        ConsumerMetrics::record_broker_error();
                    }
                }
                None
            }
            Disposition::Withhold(reason) => {
                let delay = self.backoff.delay_for_attempt(self.consecutive_withholds);
                self.consecutive_withholds = self.consecutive_withholds.saturating_add(1);
                self.stats.withheld += 1;
                ConsumerMetrics::record_withheld(reason);
                tracing::warn!(
                    position = %position,
                    reason,
                    attempt = self.consecutive_withholds,
                    backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Offset withheld; record will be retried"
                );
                let seeked = match self.session.rewind(position) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to rewind partition; will retry before polling");
                        self.stats.broker_errors += 1;
                        ConsumerMetrics::record_broker_error();
                        false
                    }
                };
                self.pending_rewinds.insert(
                    partition_key(position),
                    PendingRewind {
                        position: position.clone(),
                        seeked,
                    },
                );
                Some(delay)
            }
        }
    }
}

/// Builder for a [`MessageConsumer`].
pub struct MessageConsumerBuilder<S: BrokerSession> {
    session: S,
    handler: Arc<dyn EventHandler>,
    deserializer: CdcDeserializer,
    poll_timeout: Duration,
    backoff: RetryPolicy,
    heartbeats: Option<(Arc<dyn HeartbeatRepository>, HeartbeatIdentity)>,
    clock: Arc<dyn Clock>,
    unhandled_error_policy: UnhandledErrorPolicy,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl<S: BrokerSession> MessageConsumerBuilder<S> {
    /// Use a custom deserializer (e.g. a different comment sentinel).
    #[must_use]
    pub fn deserializer(mut self, deserializer: CdcDeserializer) -> Self {
        self.deserializer = deserializer;
        self
    }

    /// Upper bound on each poll.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Backoff between retries of a withheld record.
    ///
    /// The n-th consecutive withhold waits `backoff.delay_for_attempt(n)`.
    #[must_use]
    pub fn backoff(mut self, policy: RetryPolicy) -> Self {
        self.backoff = policy;
        self
    }

    /// Write heartbeats to `repository` on idle polls.
    #[must_use]
    pub fn heartbeats(mut self, repository: Arc<dyn HeartbeatRepository>, identity: HeartbeatIdentity) -> Self {
        self.heartbeats = Some((repository, identity));
        self
    }

    /// Clock used for heartbeat and dead-letter timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// What to do with records whose handling fails for an unclassified reason.
    #[must_use]
    pub const fn unhandled_error_policy(mut self, policy: UnhandledErrorPolicy) -> Self {
        self.unhandled_error_policy = policy;
        self
    }

    /// Sink used by [`UnhandledErrorPolicy::DeadLetter`].
    #[must_use]
    pub fn dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Build the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::MissingDeadLetterSink`] if the dead-letter policy
    /// was chosen without a sink.
    pub fn build(self) -> Result<MessageConsumer<S>, ConsumerError> {
        if self.unhandled_error_policy == UnhandledErrorPolicy::DeadLetter && self.dead_letters.is_none() {
            return Err(ConsumerError::MissingDeadLetterSink);
        }
        Ok(MessageConsumer {
            session: self.session,
            deserializer: self.deserializer,
            handler: self.handler,
            poll_timeout: self.poll_timeout,
            backoff: self.backoff,
            heartbeats: self.heartbeats,
            clock: self.clock,
            unhandled_error_policy: self.unhandled_error_policy,
            dead_letters: self.dead_letters,
            stats: ConsumerStats::default(),
            consecutive_withholds: 0,
            pending_rewinds: BTreeMap::new(),
        })
    }
}
