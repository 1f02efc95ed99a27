//! Command-line argument types shared by the binaries.

use chrono::NaiveDate;
use clap::ValueEnum;
use txn_validation_core::models::SettlementCriteria;

/// Log level accepted by `--log_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    /// Everything
    Trace,
    /// Diagnostic detail
    Debug,
    /// Normal operation
    Info,
    /// Something unexpected
    Warn,
    /// Failures
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    #[must_use]
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Parse a `YYYYMMDD` trade date.
///
/// # Errors
///
/// Returns a message naming the expected format if `value` is not a valid date.
pub fn parse_trade_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|e| format!("expected a YYYYMMDD date, got '{value}': {e}"))
}

/// Parse `0` (T+0) or `1` (T+1).
///
/// # Errors
///
/// Returns a message if `value` is anything else.
pub fn parse_settlement_criteria(value: &str) -> Result<SettlementCriteria, String> {
    match value.trim() {
        "0" => Ok(SettlementCriteria::TPlusZero),
        "1" => Ok(SettlementCriteria::TPlusOne),
        other => Err(format!("expected 0 (T+0) or 1 (T+1), got '{other}'")),
    }
}
