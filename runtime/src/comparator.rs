//! Point-in-time reconciliation of transaction counts.
//!
//! The comparator asks each registered repository for the transactions of one
//! trade date, keeps the T+0 (same-day settlement) or T+1 subset, and checks that
//! every repository reports the same count. It runs out of band from the consumer
//! and does not retry.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use txn_validation_core::models::SettlementCriteria;
use txn_validation_core::repository::{RepositoryError, TransactionQuery, TransactionRepository};

/// Why a comparison did not pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompareError {
    /// Repositories disagree on the count
    #[error("Transaction counts differ between repositories: {counts:?}")]
    CountMismatch {
        /// Count reported by each repository, keyed by repository name
        counts: BTreeMap<String, usize>,
    },

    /// A repository could not be read
    #[error("Could not read {repository}: {source}")]
    Repository {
        /// Repository that failed
        repository: String,
        /// Underlying failure
        #[source]
        source: RepositoryError,
    },
}

/// Compares transaction counts across repositories.
#[derive(Clone, Default)]
pub struct TransactionCountComparator {
    repositories: Vec<Arc<dyn TransactionRepository>>,
}

impl TransactionCountComparator {
    /// Create a comparator over `repositories`.
    ///
    /// Repository names are used as report keys. A repeated name is reported as
    /// `"{name} (2)"`, `"{name} (3)"` and so on, in registration order.
    #[must_use]
    pub fn new(repositories: Vec<Arc<dyn TransactionRepository>>) -> Self {
        Self { repositories }
    }

    /// Register another repository.
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn TransactionRepository>) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Names of the registered repositories, in registration order.
    #[must_use]
    pub fn repository_names(&self) -> Vec<&str> {
        self.repositories.iter().map(|r| r.name()).collect()
    }

    /// Count `settlement_criteria` transactions traded on `trade_date` in every repository.
    ///
    /// Returns the per-repository counts when they all agree.
    ///
    /// # Errors
    ///
    /// - [`CompareError::CountMismatch`] if more than one distinct count was seen
    /// - [`CompareError::Repository`] if any repository could not be read
    pub async fn compare(
        &self,
        trade_date: NaiveDate,
        settlement_criteria: SettlementCriteria,
    ) -> Result<BTreeMap<String, usize>, CompareError> {
        let query = TransactionQuery::for_trade_date(trade_date);
        let mut counts = BTreeMap::new();

        for repository in &self.repositories {
            let transactions = repository.get(&query).await.map_err(|source| {
                CompareError::Repository {
                    repository: repository.name().to_string(),
                    source,
                }
            })?;

            let relevant = transactions
                .iter()
                .filter(|t| settlement_criteria.matches(t.trade_date, t.settle_date))
                .count();

            tracing::debug!(
                repository = repository.name(),
                total = transactions.len(),
                relevant,
                settlement_criteria = %settlement_criteria,
                "Counted transactions"
            );
            counts.insert(report_key(&counts, repository.name()), relevant);
        }

        let mut distinct: Vec<usize> = counts.values().copied().collect();
        distinct.sort_unstable();
        distinct.dedup();

        if distinct.len() > 1 {
            return Err(CompareError::CountMismatch { counts });
        }
        Ok(counts)
    }
}

/// Key under which a repository's count is reported, unique within `counts`.
fn report_key(counts: &BTreeMap<String, usize>, name: &str) -> String {
    if !counts.contains_key(name) {
        return name.to_string();
    }
    (2..)
        .map(|n: usize| format!("{name} ({n})"))
        .find(|key| !counts.contains_key(key))
        .unwrap_or_else(|| name.to_string())
}
