//! Heartbeat upserts into the `monitor` table.

use crate::database_error;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use txn_validation_core::models::Heartbeat;
use txn_validation_core::repository::{
    HeartbeatQuery, HeartbeatRepository, RepositoryError, RepositoryFuture,
};

/// Run type recorded for heartbeats.
const RUN_TYPE: &str = "INFO";
/// Run status code recorded for heartbeats.
const RUN_STATUS: i32 = 9000;
/// Run status text recorded for heartbeats.
const RUN_STATUS_TEXT: &str = "HEARTBEAT";
/// Width of the `asofuser` column.
const MAX_USER_LEN: usize = 32;

/// `monitor`-table heartbeat store.
///
/// One row per `(data_dt, scenario, run_group, run_name, run_type, run_host,
/// run_status_text)`; writing a heartbeat with the same identity refreshes that row.
#[derive(Debug, Clone)]
pub struct PostgresHeartbeatRepository {
    pool: PgPool,
    scenario: String,
    host: String,
    user: String,
}

impl PostgresHeartbeatRepository {
    /// Create a repository for the `BASE` scenario.
    ///
    /// Host and user default to empty strings; set them with [`host`](Self::host)
    /// and [`user`](Self::user).
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            scenario: "BASE".to_string(),
            host: String::new(),
            user: String::new(),
        }
    }

    /// Scenario rows are filed under.
    #[must_use]
    pub fn scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    /// Host name recorded in `run_host`.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// User recorded in `asofuser`, truncated to the column width.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = truncate_user(&user.into());
        self
    }
}

fn truncate_user(user: &str) -> String {
    user.chars().take(MAX_USER_LEN).collect()
}

impl HeartbeatRepository for PostgresHeartbeatRepository {
    fn name(&self) -> &'static str {
        "monitor table"
    }

    fn create(&self, heartbeat: &Heartbeat) -> RepositoryFuture<'_, u64> {
        let heartbeat = heartbeat.clone();
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO monitor (
                    data_dt, scenario, run_group, run_name, run_type, run_host,
                    run_status, run_status_text, is_complete, is_success,
                    log, log_file_path, asofdate, asofuser
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, $9, $10, $11, $12)
                ON CONFLICT (data_dt, scenario, run_group, run_name, run_type, run_host, run_status_text)
                DO UPDATE SET
                    log = EXCLUDED.log,
                    log_file_path = EXCLUDED.log_file_path,
                    asofdate = EXCLUDED.asofdate,
                    asofuser = EXCLUDED.asofuser
                ",
            )
            .bind(heartbeat.data_date)
            .bind(&self.scenario)
            .bind(&heartbeat.group)
            .bind(&heartbeat.name)
            .bind(RUN_TYPE)
            .bind(&self.host)
            .bind(RUN_STATUS)
            .bind(RUN_STATUS_TEXT)
            .bind(heartbeat.log.as_deref().unwrap_or(RUN_STATUS_TEXT))
            .bind(heartbeat.log_file_path.as_deref())
            .bind(heartbeat.modified_at)
            .bind(&self.user)
            .execute(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;

            let rows = result.rows_affected();
            if rows != 1 {
                return Err(RepositoryError::UnexpectedRowCount {
                    expected: 1,
                    actual: rows,
                });
            }

            tracing::debug!(heartbeat = %heartbeat, scenario = %self.scenario, "Heartbeat upserted");
            Ok(rows)
        })
    }

    fn get(&self, query: &HeartbeatQuery) -> RepositoryFuture<'_, Vec<Heartbeat>> {
        let query = query.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT run_group, run_name, data_dt, asofdate, log, log_file_path
                FROM monitor
                WHERE scenario = $1
                  AND run_type = $2
                  AND run_status_text = $3
                  AND ($4::date IS NULL OR data_dt = $4)
                  AND ($5::text IS NULL OR run_group = $5)
                  AND ($6::text IS NULL OR run_name = $6)
                ORDER BY asofdate DESC
                ",
            )
            .bind(&self.scenario)
            .bind(RUN_TYPE)
            .bind(RUN_STATUS_TEXT)
            .bind(query.data_date)
            .bind(query.group.as_deref())
            .bind(query.name.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;

            rows.iter()
                .map(|row| {
                    let data_date: NaiveDate = row.try_get("data_dt").map_err(|e| invalid_row(&e))?;
                    let modified_at: DateTime<Utc> = row.try_get("asofdate").map_err(|e| invalid_row(&e))?;
                    Ok(Heartbeat {
                        group: row.try_get("run_group").map_err(|e| invalid_row(&e))?,
                        name: row.try_get("run_name").map_err(|e| invalid_row(&e))?,
                        data_date,
                        modified_at,
                        log: row.try_get("log").map_err(|e| invalid_row(&e))?,
                        log_file_path: row.try_get("log_file_path").map_err(|e| invalid_row(&e))?,
                    })
                })
                .collect()
        })
    }
}

fn invalid_row(error: &sqlx::Error) -> RepositoryError {
    RepositoryError::InvalidRow(error.to_string())
}
