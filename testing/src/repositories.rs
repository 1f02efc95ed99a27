//! In-memory repositories.
//!
//! Each repository stores its rows behind an `Arc<RwLock<..>>` and can be primed
//! with a [`RepositoryError`] that every subsequent call returns, until
//! [`recover`](InMemoryTransactionRepository::recover) is called.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use txn_validation_core::models::{Blotter, BlotterKey, Heartbeat, Transaction};
use txn_validation_core::repository::{
    BlotterRepository, HeartbeatQuery, HeartbeatRepository, RepositoryError, RepositoryFuture,
    TransactionQuery, TransactionRepository,
};

/// Shared "fail every call" switch.
#[derive(Debug, Clone, Default)]
struct Failure {
    error: Arc<RwLock<Option<RepositoryError>>>,
}

impl Failure {
    fn set(&self, error: RepositoryError) {
        *self.error.write().unwrap() = Some(error);
    }

    fn clear(&self) {
        *self.error.write().unwrap() = None;
    }

    fn check(&self) -> Result<(), RepositoryError> {
        self.error.read().unwrap().clone().map_or(Ok(()), Err)
    }
}

/// In-memory transaction source.
///
/// # Example
///
/// ```
/// use txn_validation_testing::repositories::InMemoryTransactionRepository;
/// use txn_validation_core::repository::TransactionRepository;
///
/// let repo = InMemoryTransactionRepository::new("ledger");
/// assert_eq!(repo.name(), "ledger");
/// assert!(repo.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryTransactionRepository {
    name: String,
    read_only: bool,
    data: Arc<RwLock<Vec<Transaction>>>,
    failure: Failure,
}

impl InMemoryTransactionRepository {
    /// Create an empty, writable repository.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_only: false,
            data: Arc::new(RwLock::new(Vec::new())),
            failure: Failure::default(),
        }
    }

    /// Reject writes through the trait, like a view over another system.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Seed a transaction, bypassing the read-only flag.
    pub fn insert(&self, transaction: Transaction) {
        self.data.write().unwrap().push(transaction);
    }

    /// Make every subsequent call fail with `error`.
    pub fn fail_with(&self, error: RepositoryError) {
        self.failure.set(error);
    }

    /// Stop failing.
    pub fn recover(&self) {
        self.failure.clear();
    }

    /// All stored transactions in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<Transaction> {
        self.data.read().unwrap().clone()
    }

    /// Number of stored transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Whether no transactions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransactionRepository for InMemoryTransactionRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, transaction: &Transaction) -> RepositoryFuture<'_, u64> {
        let transaction = transaction.clone();
        Box::pin(async move {
            self.failure.check()?;
            if self.read_only {
                return Err(RepositoryError::ReadOnly {
                    repository: self.name.clone(),
                });
            }
            self.insert(transaction);
            Ok(1)
        })
    }

    fn get(&self, query: &TransactionQuery) -> RepositoryFuture<'_, Vec<Transaction>> {
        let query = query.clone();
        Box::pin(async move {
            self.failure.check()?;
            let data = self.data.read().unwrap();
            Ok(data
                .iter()
                .filter(|t| query.trade_date.is_none_or(|d| t.trade_date == d))
                .filter(|t| {
                    query
                        .portfolio_code
                        .as_deref()
                        .is_none_or(|p| t.portfolio_id == p)
                })
                .cloned()
                .collect())
        })
    }
}

/// In-memory blotter status source keyed by [`BlotterKey`].
///
/// Inserting a blotter with an existing key replaces it, which mirrors how a
/// status file is overwritten in place.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlotterRepository {
    data: Arc<RwLock<HashMap<BlotterKey, Blotter>>>,
    failure: Failure,
}

impl InMemoryBlotterRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a blotter.
    pub fn insert(&self, blotter: Blotter) {
        self.data.write().unwrap().insert(blotter.key(), blotter);
    }

    /// Make every subsequent call fail with `error`.
    pub fn fail_with(&self, error: RepositoryError) {
        self.failure.set(error);
    }

    /// Stop failing.
    pub fn recover(&self) {
        self.failure.clear();
    }

    /// Clear all blotters.
    pub fn clear(&self) {
        self.data.write().unwrap().clear();
    }

    /// Number of stored blotters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Whether no blotters are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlotterRepository for InMemoryBlotterRepository {
    fn name(&self) -> &'static str {
        "InMemoryBlotterRepository"
    }

    fn create(&self, blotter: &Blotter) -> RepositoryFuture<'_, u64> {
        let blotter = blotter.clone();
        Box::pin(async move {
            self.failure.check()?;
            self.insert(blotter);
            Ok(1)
        })
    }

    fn get(&self, key: &BlotterKey) -> RepositoryFuture<'_, Vec<Blotter>> {
        let key = *key;
        Box::pin(async move {
            self.failure.check()?;
            Ok(self.data.read().unwrap().get(&key).cloned().into_iter().collect())
        })
    }
}

/// In-memory heartbeat store with upsert semantics.
///
/// The identity of a heartbeat is its group, name, and data date.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHeartbeatRepository {
    data: Arc<RwLock<Vec<Heartbeat>>>,
    writes: Arc<RwLock<usize>>,
    failure: Failure,
}

impl InMemoryHeartbeatRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `error`.
    pub fn fail_with(&self, error: RepositoryError) {
        self.failure.set(error);
    }

    /// Stop failing.
    pub fn recover(&self) {
        self.failure.clear();
    }

    /// Current heartbeat records.
    #[must_use]
    pub fn all(&self) -> Vec<Heartbeat> {
        self.data.read().unwrap().clone()
    }

    /// Number of successful `create` calls, including updates.
    #[must_use]
    pub fn writes(&self) -> usize {
        *self.writes.read().unwrap()
    }
}

impl HeartbeatRepository for InMemoryHeartbeatRepository {
    fn name(&self) -> &'static str {
        "InMemoryHeartbeatRepository"
    }

    fn create(&self, heartbeat: &Heartbeat) -> RepositoryFuture<'_, u64> {
        let heartbeat = heartbeat.clone();
        Box::pin(async move {
            self.failure.check()?;
            let mut data = self.data.write().unwrap();
            let existing = data.iter_mut().find(|h| {
                h.group == heartbeat.group
                    && h.name == heartbeat.name
                    && h.data_date == heartbeat.data_date
            });
            match existing {
                Some(slot) => *slot = heartbeat,
                None => data.push(heartbeat),
            }
            *self.writes.write().unwrap() += 1;
            Ok(1)
        })
    }

    fn get(&self, query: &HeartbeatQuery) -> RepositoryFuture<'_, Vec<Heartbeat>> {
        let query = query.clone();
        Box::pin(async move {
            self.failure.check()?;
            let data = self.data.read().unwrap();
            Ok(data
                .iter()
                .filter(|h| query.data_date.is_none_or(|d| h.data_date == d))
                .filter(|h| query.group.as_deref().is_none_or(|g| h.group == g))
                .filter(|h| query.name.as_deref().is_none_or(|n| h.name == n))
                .cloned()
                .collect())
        })
    }
}
