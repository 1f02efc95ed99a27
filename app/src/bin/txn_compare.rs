//! Transaction count comparator.
//!
//! Compares the number of T+0 or T+1 transactions posted to the ledger with the
//! number sent through the gateway for one trade date. Exits with a non-zero
//! status when the counts differ.
//!
//! # Usage
//!
//! ```bash
//! txn-compare --trade_date 20240603 --settlement_criteria 0
//! ```

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use txn_validation_app::cli::{LogLevel, parse_settlement_criteria, parse_trade_date};
use txn_validation_app::{Config, local_host, logging};
use txn_validation_core::models::SettlementCriteria;
use txn_validation_postgres::{
    PostgresPostedTransactionRepository, PostgresSentTransactionRepository, connect,
};
use txn_validation_runtime::comparator::{CompareError, TransactionCountComparator};

/// Transaction count comparator.
#[derive(Parser, Debug)]
#[command(name = "txn-compare", version, about)]
struct Cli {
    /// Trade date, YYYYMMDD format
    #[arg(short = 't', long = "trade_date", value_parser = parse_trade_date)]
    trade_date: NaiveDate,

    /// 0 for T+0, 1 for T+1
    #[arg(short = 's', long = "settlement_criteria", value_parser = parse_settlement_criteria)]
    settlement_criteria: SettlementCriteria,

    /// Log level (overrides RUST_LOG and LOG_LEVEL)
    #[arg(short = 'l', long = "log_level", value_enum, ignore_case = true)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::from_env("txn-compare").context("Invalid configuration")?;
    logging::init(&config.logging, &config.app_name, cli.log_level, Utc::now().date_naive())
        .context("Failed to initialize logging")?;

    tracing::info!(
        host = %local_host(),
        command_line = %std::env::args().collect::<Vec<_>>().join(" "),
        "Starting transaction count comparator"
    );
    tracing::info!("Configuration:\n{config}");

    let db = &config.databases;
    let ledger = connect(db.ledger_url()?, db.max_connections, db.connect_timeout)
        .await
        .context("Failed to connect to the ledger database")?;
    let notifications = connect(db.notification_url()?, db.max_connections, db.connect_timeout)
        .await
        .context("Failed to connect to the notification database")?;

    let comparator = TransactionCountComparator::default()
        .with_repository(Arc::new(PostgresPostedTransactionRepository::new(ledger)))
        .with_repository(Arc::new(
            PostgresSentTransactionRepository::new(notifications).scenarios(db.sent_scenarios.clone()),
        ));

    tracing::info!(
        "Comparing transaction counts for {} {} between the following repositories: {}",
        cli.trade_date,
        cli.settlement_criteria,
        comparator.repository_names().join(", ")
    );

    match comparator.compare(cli.trade_date, cli.settlement_criteria).await {
        Ok(counts) => {
            tracing::info!(counts = ?counts, "Comparison passed");
            Ok(ExitCode::SUCCESS)
        }
        Err(CompareError::CountMismatch { counts }) => {
            let readable = serde_json::to_string_pretty(&counts)?;
            tracing::error!("Comparison failed due to differences in counts: {readable}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("Comparison could not be completed"),
    }
}
