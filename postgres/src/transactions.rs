//! Read-only transaction sources.
//!
//! Both sources select whole rows as JSON and map them through
//! [`Transaction::from_record`], so upstream columns the pipeline does not name
//! survive in `attributes`.

use crate::database_error;
use serde_json::Value;
use sqlx::{PgPool, Row};
use txn_validation_core::models::Transaction;
use txn_validation_core::repository::{
    RepositoryError, RepositoryFuture, TransactionQuery, TransactionRepository,
};

/// Notification scenarios searched by default.
pub const DEFAULT_SENT_SCENARIOS: [&str; 2] = ["CUSTODIAN.PRIMARY", "SSCNET.PRIMARY"];

/// Notification status of a transaction that left through the gateway.
const SENT_STATUS: &str = "Sent";

/// Transactions posted to the ledger, read from the `portfolio_transactions` view.
#[derive(Debug, Clone)]
pub struct PostgresPostedTransactionRepository {
    pool: PgPool,
}

impl PostgresPostedTransactionRepository {
    /// Create a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TransactionRepository for PostgresPostedTransactionRepository {
    fn name(&self) -> &'static str {
        "Transactions posted to the ledger"
    }

    fn create(&self, _transaction: &Transaction) -> RepositoryFuture<'_, u64> {
        Box::pin(async move { Err(read_only(self.name())) })
    }

    fn get(&self, query: &TransactionQuery) -> RepositoryFuture<'_, Vec<Transaction>> {
        let query = query.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                r#"
                SELECT to_jsonb(t) AS record
                FROM portfolio_transactions t
                WHERE ($1::date IS NULL OR t."TradeDate" = $1)
                  AND ($2::text IS NULL OR t."PortfolioID"::text = $2)
                "#,
            )
            .bind(query.trade_date)
            .bind(query.portfolio_code.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;

            let transactions = rows.iter().map(row_to_transaction).collect::<Result<Vec<_>, _>>()?;
            tracing::debug!(
                repository = self.name(),
                count = transactions.len(),
                "Fetched posted transactions"
            );
            Ok(transactions)
        })
    }
}

/// Transactions sent through the notification gateway.
///
/// Reads `notification` rows with status `Sent` across every configured scenario.
#[derive(Debug, Clone)]
pub struct PostgresSentTransactionRepository {
    pool: PgPool,
    scenarios: Vec<String>,
}

impl PostgresSentTransactionRepository {
    /// Create a repository searching [`DEFAULT_SENT_SCENARIOS`].
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            scenarios: DEFAULT_SENT_SCENARIOS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Replace the scenarios searched.
    #[must_use]
    pub fn scenarios<I, S>(mut self, scenarios: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scenarios = scenarios.into_iter().map(Into::into).collect();
        self
    }
}

impl TransactionRepository for PostgresSentTransactionRepository {
    fn name(&self) -> &'static str {
        "Transactions sent via the gateway"
    }

    fn create(&self, _transaction: &Transaction) -> RepositoryFuture<'_, u64> {
        Box::pin(async move { Err(read_only(self.name())) })
    }

    fn get(&self, query: &TransactionQuery) -> RepositoryFuture<'_, Vec<Transaction>> {
        let query = query.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                r#"
                SELECT to_jsonb(n) - 'scenario' - 'status' AS record
                FROM notification n
                WHERE n.status = $1
                  AND n.scenario = ANY($2)
                  AND ($3::date IS NULL OR n."TradeDate" = $3)
                  AND ($4::text IS NULL OR n."PortfolioID"::text = $4)
                "#,
            )
            .bind(SENT_STATUS)
            .bind(&self.scenarios)
            .bind(query.trade_date)
            .bind(query.portfolio_code.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;

            let transactions = rows.iter().map(row_to_transaction).collect::<Result<Vec<_>, _>>()?;
            tracing::debug!(
                repository = self.name(),
                scenarios = ?self.scenarios,
                count = transactions.len(),
                "Fetched sent transactions"
            );
            Ok(transactions)
        })
    }
}

fn read_only(name: &str) -> RepositoryError {
    RepositoryError::ReadOnly {
        repository: name.to_string(),
    }
}

fn row_to_transaction(row: &sqlx::postgres::PgRow) -> Result<Transaction, RepositoryError> {
    let record: Value = row
        .try_get("record")
        .map_err(|e| RepositoryError::InvalidRow(e.to_string()))?;
    record_to_transaction(record)
}

fn record_to_transaction(record: Value) -> Result<Transaction, RepositoryError> {
    match record {
        Value::Object(map) => {
            Transaction::from_record(map).map_err(|e| RepositoryError::InvalidRow(e.to_string()))
        }
        other => Err(RepositoryError::InvalidRow(format!(
            "expected a JSON object, found {other}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn json_rows_map_to_transactions() {
        let txn = record_to_transaction(json!({
            "TransactionCode": "by",
            "Quantity": 12,
            "SecurityID1": "SEC-1",
            "PortfolioID": "PORT-1",
            "TradeDate": "2024-06-03",
            "SettleDate": "2024-06-04",
            "TranID": 9
        }))
        .unwrap();

        assert_eq!(txn.quantity, Decimal::from(12));
        assert_eq!(txn.trade_date, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        assert_eq!(txn.attributes.get("TranID"), Some(&json!(9)));
    }

    #[test]
    fn incomplete_rows_are_invalid() {
        let err = record_to_transaction(json!({ "TransactionCode": "by" })).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidRow(_)));
    }

    #[test]
    fn non_object_rows_are_invalid() {
        let err = record_to_transaction(json!([1, 2])).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidRow(_)));
    }

    #[test]
    fn sent_scenarios_default_to_both_gateways() {
        assert_eq!(DEFAULT_SENT_SCENARIOS, ["CUSTODIAN.PRIMARY", "SSCNET.PRIMARY"]);
    }
}
