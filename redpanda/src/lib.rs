//! Kafka-compatible CDC consumer for the transaction validation pipeline.
//!
//! This crate turns change-data-capture records from a Kafka-compatible broker
//! (Redpanda, Apache Kafka, MSK, ...) into domain events and drives them through an
//! [`EventHandler`](txn_validation_core::handler::EventHandler).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  KafkaSession   │  poll / commit / rewind / close
//! └────────┬────────┘
//!          │ InboundMessage
//!          ▼
//! ┌─────────────────┐
//! │ CdcDeserializer │  bytes → DomainEvent | no event
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  EventHandler   │  → commit?
//! └─────────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - A record is committed only after the handler approves it
//! - A withheld record is rewound and retried with backoff, never skipped
//! - Ordering is preserved within a partition; records are handled one at a time
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use txn_validation_redpanda::{KafkaSession, MessageConsumer};
//! use txn_validation_runtime::handler::TransactionEventHandler;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = KafkaSession::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("txn-validation")
//!     .topic("ledger.dbo.transactions")
//!     .build()?;
//!
//! let consumer = MessageConsumer::builder(session, Arc::new(TransactionEventHandler::default()))
//!     .build()?;
//! let stats = consumer.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! println!("committed {} records", stats.committed);
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod deserializer;
pub mod session;

pub use consumer::{
    ConsumerError, ConsumerStats, HeartbeatIdentity, MessageConsumer, MessageConsumerBuilder,
    UnhandledErrorPolicy,
};
pub use deserializer::CdcDeserializer;
pub use session::{BrokerSession, InboundMessage, KafkaSession, MessagePosition, Polled, SessionError};
