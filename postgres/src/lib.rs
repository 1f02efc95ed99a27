//! `PostgreSQL` repositories for the transaction validation pipeline.
//!
//! This crate provides sqlx-backed implementations of the repository traits from
//! `txn-validation-core`:
//!
//! - [`PostgresHeartbeatRepository`]: upserts liveness heartbeats into `monitor`
//! - [`PostgresPostedTransactionRepository`]: read-only view of transactions posted
//!   to the ledger
//! - [`PostgresSentTransactionRepository`]: read-only view of transactions sent
//!   through the notification gateway
//! - [`DeadLetterQueue`]: storage and triage of records the consumer gave up on
//!
//! The `monitor` and `failed_messages` tables are owned by this crate and created
//! by [`run_migrations`]. The ledger view and the notification table belong to
//! upstream systems and are never written.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use txn_validation_postgres::{PostgresHeartbeatRepository, connect, run_migrations};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/monitor", 10, Duration::from_secs(30)).await?;
//! run_migrations(&pool).await?;
//! let heartbeats = PostgresHeartbeatRepository::new(pool).host("APP01").user("svc_txn-consumer");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dead_letter_queue;
mod heartbeat;
mod transactions;

pub use dead_letter_queue::{DLQStatus, DeadLetterEntry, DeadLetterQueue};
pub use heartbeat::PostgresHeartbeatRepository;
pub use transactions::{PostgresPostedTransactionRepository, PostgresSentTransactionRepository};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use txn_validation_core::repository::RepositoryError;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`RepositoryError::Database`] if no connection can be established
/// within `connect_timeout`.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    connect_timeout: Duration,
) -> Result<PgPool, RepositoryError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(connect_timeout)
        .connect(database_url)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to connect: {e}")))
}

/// Create or upgrade the tables owned by this crate.
///
/// # Errors
///
/// Returns [`RepositoryError::Database`] if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), RepositoryError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations complete");
    Ok(())
}

/// Map a sqlx failure to a repository error.
fn database_error(error: &sqlx::Error) -> RepositoryError {
    RepositoryError::Database(error.to_string())
}
