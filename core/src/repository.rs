//! Repository traits consumed by validation rules, the comparator, and the consumer loop.
//!
//! All repositories share one shape: `create(entity) -> row_count` and
//! `get(filter) -> Vec<entity>`. Read-only sources return
//! [`RepositoryError::ReadOnly`] from `create`.

use crate::models::{Blotter, BlotterKey, Heartbeat, Transaction};
use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by repository operations.
pub type RepositoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Errors that can occur during repository operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The repository does not accept writes
    #[error("{repository} is read-only")]
    ReadOnly {
        /// Name of the repository
        repository: String,
    },

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// A write affected a different number of rows than expected
    #[error("Expected {expected} row(s) to be saved, but there were {actual}")]
    UnexpectedRowCount {
        /// Rows the write should have affected
        expected: u64,
        /// Rows it actually affected
        actual: u64,
    },

    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(String),

    /// A stored row could not be mapped back to a domain model
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// Filter for [`TransactionRepository::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Only transactions traded on this date
    pub trade_date: Option<NaiveDate>,
    /// Only transactions in this portfolio
    pub portfolio_code: Option<String>,
}

impl TransactionQuery {
    /// Query all transactions traded on `trade_date`.
    #[must_use]
    pub const fn for_trade_date(trade_date: NaiveDate) -> Self {
        Self {
            trade_date: Some(trade_date),
            portfolio_code: None,
        }
    }

    /// Narrow the query to one portfolio.
    #[must_use]
    pub fn portfolio_code(mut self, portfolio_code: impl Into<String>) -> Self {
        self.portfolio_code = Some(portfolio_code.into());
        self
    }
}

/// Filter for [`HeartbeatRepository::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatQuery {
    /// Only heartbeats filed under this date
    pub data_date: Option<NaiveDate>,
    /// Only heartbeats of this group
    pub group: Option<String>,
    /// Only heartbeats of this run name
    pub name: Option<String>,
}

/// A source of transactions.
pub trait TransactionRepository: Send + Sync {
    /// Human-readable name, used as the key in comparison reports.
    fn name(&self) -> &str;

    /// Store a transaction, returning the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::ReadOnly`] for sources that cannot be written to,
    /// or a storage error if the write fails.
    fn create(&self, transaction: &Transaction) -> RepositoryFuture<'_, u64>;

    /// Fetch the transactions matching `query`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn get(&self, query: &TransactionQuery) -> RepositoryFuture<'_, Vec<Transaction>>;
}

/// A source of blotter send statuses.
pub trait BlotterRepository: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Store a blotter, returning the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::ReadOnly`] for sources that cannot be written to.
    fn create(&self, blotter: &Blotter) -> RepositoryFuture<'_, u64>;

    /// Fetch the blotters stored under `key`.
    ///
    /// An empty result means no blotter is known for the key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    fn get(&self, key: &BlotterKey) -> RepositoryFuture<'_, Vec<Blotter>>;
}

/// Storage for liveness heartbeats.
///
/// `create` is an upsert: writing the same heartbeat identity twice updates
/// the existing record.
pub trait HeartbeatRepository: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Upsert a heartbeat, returning the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::UnexpectedRowCount`] if the upsert did not touch
    /// exactly one row, or a storage error if the write fails.
    fn create(&self, heartbeat: &Heartbeat) -> RepositoryFuture<'_, u64>;

    /// Fetch heartbeats matching `query`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn get(&self, query: &HeartbeatQuery) -> RepositoryFuture<'_, Vec<Heartbeat>>;
}
