//! Transaction CDC consumer.
//!
//! Validates every transaction change captured from the ledger, alerts on broken
//! rules, and writes liveness heartbeats while idle.
//!
//! # Usage
//!
//! ```bash
//! txn-consumer                 # resume from committed offsets
//! txn-consumer --reset_offset  # replay every partition from the beginning
//! ```

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use txn_validation_alerts::WebhookAlertService;
use txn_validation_app::cli::LogLevel;
use txn_validation_app::shutdown::shutdown_signal;
use txn_validation_app::{Config, FileBlotterRepository, local_host, logging, login_user};
use txn_validation_core::alert::AlertService;
use txn_validation_core::dead_letter::DeadLetterSink;
use txn_validation_postgres::{DeadLetterQueue, PostgresHeartbeatRepository, connect, run_migrations};
use txn_validation_redpanda::{
    CdcDeserializer, HeartbeatIdentity, KafkaSession, MessageConsumer, UnhandledErrorPolicy,
};
use txn_validation_runtime::handler::TransactionEventHandler;
use txn_validation_runtime::metrics::MetricsServer;
use txn_validation_runtime::retry::RetryPolicy;
use txn_validation_runtime::rules::{PostedAfterBlotterSent, QuantityCeiling};
use txn_validation_runtime::validator::Validator;

/// Kafka consumer validating ledger transactions.
#[derive(Parser, Debug)]
#[command(name = "txn-consumer", version, about)]
struct Cli {
    /// Reset consumer offsets to the beginning on first assignment
    #[arg(short = 'r', long = "reset_offset")]
    reset_offset: bool,

    /// Log level (overrides RUST_LOG and LOG_LEVEL)
    #[arg(short = 'l', long = "log_level", value_enum, ignore_case = true)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env("txn-consumer").context("Invalid configuration")?;
    let log_file = logging::init(&config.logging, &config.app_name, cli.log_level, Utc::now().date_naive())
        .context("Failed to initialize logging")?;

    let host = config.heartbeat.host.clone().unwrap_or_else(local_host);
    tracing::info!(
        host = %host,
        command_line = %std::env::args().collect::<Vec<_>>().join(" "),
        "Starting transaction consumer"
    );
    tracing::info!("Configuration:\n{config}");

    let mut metrics = config.metrics_addr.map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.start().context("Failed to start metrics server")?;
    }

    // Validation
    let blotters = Arc::new(FileBlotterRepository::new(
        config.files.require_blotter_dir()?,
        config.files.blotter_file_prefix.clone(),
    ));
    let mut posted_after_sent =
        PostedAfterBlotterSent::new(blotters).missing_blotter(config.validation.missing_blotter_policy);
    if let Some(url) = &config.alerts.webhook_url {
        let webhook: Arc<dyn AlertService> = Arc::new(
            WebhookAlertService::new(url.clone(), config.alerts.timeout)
                .context("Failed to create webhook alert service")?,
        );
        posted_after_sent = posted_after_sent.with_alert_service(webhook);
    } else {
        tracing::warn!("ALERT_WEBHOOK_URL not set; rule violations will only be logged");
    }

    let validator = Validator::builder()
        .rule(Arc::new(QuantityCeiling::new(config.validation.quantity_ceiling)))
        .rule(Arc::new(posted_after_sent))
        .rule_timeout(config.validation.rule_timeout)
        .build();

    let handler = TransactionEventHandler::new(validator)
        .alert_retry(
            RetryPolicy::builder()
                .max_retries(config.alerts.max_retries)
                .initial_delay(Duration::from_millis(500))
                .max_delay(Duration::from_secs(5))
                .build(),
        )
        .commit_on_deserialization_error(config.consumer.commit_on_deserialization_error);

    // Broker
    let kafka = &config.kafka;
    let mut session = KafkaSession::builder()
        .brokers(kafka.brokers.clone())
        .consumer_group(kafka.consumer_group.clone())
        .topics(kafka.require_topics()?.iter().cloned())
        .session_timeout(kafka.session_timeout)
        .auto_offset_reset(kafka.auto_offset_reset.clone())
        .reset_offsets(cli.reset_offset);
    if let Some(protocol) = &kafka.security_protocol {
        session = session.security_protocol(protocol.clone());
    }
    if let Some(sasl) = &kafka.sasl {
        session = session.sasl(sasl.mechanism.clone(), sasl.username.clone(), sasl.password.clone());
    }
    let session = session.build().context("Failed to create Kafka session")?;

    let mut consumer = MessageConsumer::builder(session, Arc::new(handler))
        .deserializer(CdcDeserializer::with_comment_sentinel(
            config.validation.comment_sentinel.clone(),
        ))
        .poll_timeout(kafka.poll_timeout)
        .backoff(
            RetryPolicy::builder()
                .initial_delay(kafka.retry_backoff)
                .max_delay(Duration::from_secs(60))
                .build(),
        )
        .unhandled_error_policy(config.consumer.unhandled_error_policy);

    // Monitor database
    let needs_monitor_db = config.heartbeat.enabled
        || config.consumer.unhandled_error_policy == UnhandledErrorPolicy::DeadLetter;
    if needs_monitor_db {
        let pool = connect(
            config.databases.monitor_url()?,
            config.databases.max_connections,
            config.databases.connect_timeout,
        )
        .await
        .context("Failed to connect to the monitor database")?;
        run_migrations(&pool).await.context("Failed to migrate the monitor database")?;

        if config.heartbeat.enabled {
            let heartbeats = PostgresHeartbeatRepository::new(pool.clone())
                .scenario(config.heartbeat.scenario.clone())
                .host(host.clone())
                .user(format!("{}_{}", login_user(), config.app_name));
            let mut identity = HeartbeatIdentity::new(config.heartbeat.group.clone(), config.heartbeat.name.clone());
            if let Some(path) = &log_file {
                identity = identity.with_log_file_path(path.display().to_string());
            }
            consumer = consumer.heartbeats(Arc::new(heartbeats), identity);
        }

        if config.consumer.unhandled_error_policy == UnhandledErrorPolicy::DeadLetter {
            let dlq: Arc<dyn DeadLetterSink> = Arc::new(DeadLetterQueue::new(pool));
            consumer = consumer.dead_letters(dlq);
        }
    }

    let consumer = consumer.build().context("Failed to build consumer")?;

    tracing::info!("Consuming transactions...");
    let stats = consumer.run(shutdown_signal()).await.context("Consumer stopped with an error")?;

    tracing::info!(
        committed = stats.committed,
        withheld = stats.withheld,
        dead_lettered = stats.dead_lettered,
        broker_errors = stats.broker_errors,
        heartbeats = stats.heartbeats,
        heartbeat_failures = stats.heartbeat_failures,
        "Consumer stopped"
    );
    Ok(())
}
