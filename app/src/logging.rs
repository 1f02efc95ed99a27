//! Tracing subscriber setup for the binaries.
//!
//! Console output always; when a log directory is configured, a second plain-text
//! layer appends to `{dir}/{YYYYMM}/{DD}/{app_name}.log`.

use crate::cli::LogLevel;
use crate::config::LoggingConfig;
use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Path of the log file for `date`.
#[must_use]
pub fn dated_log_path(dir: &Path, date: NaiveDate, app_name: &str) -> PathBuf {
    dir.join(date.format("%Y%m").to_string())
        .join(date.format("%d").to_string())
        .join(format!("{app_name}.log"))
}

/// Filter directive in effect: the command-line level, then `RUST_LOG`, then the
/// configured level.
fn filter(config: &LoggingConfig, level_override: Option<LogLevel>) -> EnvFilter {
    let directive = level_override
        .map(|level| level.as_directive().to_string())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| config.level.clone());
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Returns the path of the log file, if one was opened.
///
/// # Errors
///
/// Returns an I/O error if the log directory or file cannot be created, or if a
/// global subscriber is already installed.
pub fn init(
    config: &LoggingConfig,
    app_name: &str,
    level_override: Option<LogLevel>,
    today: NaiveDate,
) -> io::Result<Option<PathBuf>> {
    let log_file = match &config.dir {
        Some(dir) => {
            let path = dated_log_path(dir, today, app_name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some((path, file))
        }
        None => None,
    };

    let (path, file_layer) = match log_file {
        Some((path, file)) => (
            Some(path),
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter(config, level_override))
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(path)
}
