//! # Transaction Validation App
//!
//! Process-level wiring for the transaction validation pipeline:
//!
//! - [`cli`]: argument types shared by the binaries
//! - [`config`]: explicit configuration loaded once from the environment
//! - [`logging`]: console and dated log file output
//! - [`blotter_files`]: blotter send status read from the shared drive
//! - [`shutdown`]: Ctrl+C / SIGTERM handling
//!
//! Two binaries are built on top:
//!
//! - `txn-consumer` validates transactions as they arrive on the CDC topic
//! - `txn-compare` reconciles posted and sent transaction counts for a trade date

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod blotter_files;
pub mod cli;
pub mod config;
pub mod logging;
pub mod shutdown;

pub use blotter_files::{BlotterFileError, FileBlotterRepository};
pub use config::{Config, ConfigError};

/// OS hostname, upper-cased, or `UNKNOWN` if it cannot be read.
#[must_use]
pub fn local_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map_or_else(|| "UNKNOWN".to_string(), |h| h.to_uppercase())
}

/// Login of the process owner, taken from `USER` or `USERNAME`.
#[must_use]
pub fn login_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
