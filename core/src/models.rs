//! Domain models for transactions, comments, blotters, heartbeats, and alerts.
//!
//! Upstream ledger rows arrive as open JSON records. [`Transaction`] and
//! [`TransactionComment`] name the columns the pipeline relies on and keep every
//! other column in an `attributes` map, so nothing the upstream system sends is lost.
//! Construction goes through [`Transaction::from_record`] /
//! [`TransactionComment::from_record`], which fail with a descriptive error when a
//! required column is missing instead of deferring the failure to first use.

use crate::event::DeserializationError;
use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Transaction code that marks a row on the transaction stream as a comment.
pub const DEFAULT_COMMENT_SENTINEL: &str = "*";

/// Upstream column holding the transaction code.
pub const TRANSACTION_CODE_FIELD: &str = "TransactionCode";

/// A ledger transaction as captured from the upstream system.
///
/// Each CDC snapshot (before or after) becomes its own immutable instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Kind of transaction (buy, sell, ...)
    #[serde(rename = "TransactionCode", deserialize_with = "trimmed_string")]
    pub transaction_code: String,
    /// Number of units
    #[serde(rename = "Quantity")]
    pub quantity: Decimal,
    /// Security identifier
    #[serde(rename = "SecurityID1", deserialize_with = "string_or_number")]
    pub security_id: String,
    /// Portfolio identifier
    #[serde(rename = "PortfolioID", deserialize_with = "string_or_number")]
    pub portfolio_id: String,
    /// Trade date
    #[serde(rename = "TradeDate", deserialize_with = "flexible_date")]
    pub trade_date: NaiveDate,
    /// Settlement date
    #[serde(rename = "SettleDate", deserialize_with = "flexible_date")]
    pub settle_date: NaiveDate,
    /// Every other upstream column, preserved verbatim
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Transaction {
    /// Create a transaction with no extra attributes.
    #[must_use]
    pub fn new(
        transaction_code: impl Into<String>,
        quantity: Decimal,
        security_id: impl Into<String>,
        portfolio_id: impl Into<String>,
        trade_date: NaiveDate,
        settle_date: NaiveDate,
    ) -> Self {
        Self {
            transaction_code: transaction_code.into(),
            quantity,
            security_id: security_id.into(),
            portfolio_id: portfolio_id.into(),
            trade_date,
            settle_date,
            attributes: Map::new(),
        }
    }

    /// Build a transaction from an upstream row.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializationError::InvalidRecord`] if a required column is missing
    /// or has the wrong shape.
    pub fn from_record(record: Map<String, Value>) -> Result<Self, DeserializationError> {
        serde_json::from_value(Value::Object(record)).map_err(|e| {
            DeserializationError::InvalidRecord {
                kind: "transaction",
                reason: e.to_string(),
            }
        })
    }

    /// Settlement criteria implied by the trade and settle dates.
    #[must_use]
    pub fn settlement_criteria(&self) -> SettlementCriteria {
        SettlementCriteria::for_dates(self.trade_date, self.settle_date)
    }

    /// Key of the blotter this transaction is expected to travel on.
    ///
    /// Same-day settlement maps to the T+0 regular blotter; anything else maps to
    /// the T+1 amendment blotter.
    #[must_use]
    pub fn blotter_key(&self) -> BlotterKey {
        let settlement_criteria = self.settlement_criteria();
        let blotter_type = match settlement_criteria {
            SettlementCriteria::TPlusZero => BlotterType::Regular,
            SettlementCriteria::TPlusOne => BlotterType::Amendment,
        };
        BlotterKey {
            settlement_criteria,
            blotter_type,
            trade_date: self.trade_date,
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} units of {} in {} on {}",
            self.transaction_code, self.quantity, self.security_id, self.portfolio_id, self.trade_date
        )
    }
}

/// A free-text comment row sharing the transaction stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionComment {
    /// Portfolio the comment belongs to
    #[serde(rename = "PortfolioID", deserialize_with = "string_or_number")]
    pub portfolio_id: String,
    /// Date the comment applies to
    #[serde(rename = "TradeDate", deserialize_with = "flexible_date")]
    pub trade_date: NaiveDate,
    /// Comment text
    #[serde(rename = "Comment", default)]
    pub comment: Option<String>,
    /// Every other upstream column, preserved verbatim
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl TransactionComment {
    /// Build a comment from an upstream row.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializationError::InvalidRecord`] if a required column is missing
    /// or has the wrong shape.
    pub fn from_record(record: Map<String, Value>) -> Result<Self, DeserializationError> {
        serde_json::from_value(Value::Object(record)).map_err(|e| {
            DeserializationError::InvalidRecord {
                kind: "transaction comment",
                reason: e.to_string(),
            }
        })
    }
}

impl fmt::Display for TransactionComment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Comment in {} on {}: {}",
            self.portfolio_id,
            self.trade_date,
            self.comment.as_deref().unwrap_or_default()
        )
    }
}

/// Trade settlement criteria of a blotter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SettlementCriteria {
    /// Same-day settlement
    TPlusZero,
    /// Next-day settlement
    TPlusOne,
}

impl SettlementCriteria {
    /// Criteria implied by a trade/settle date pair.
    #[must_use]
    pub fn for_dates(trade_date: NaiveDate, settle_date: NaiveDate) -> Self {
        if trade_date == settle_date {
            Self::TPlusZero
        } else {
            Self::TPlusOne
        }
    }

    /// Whether a trade/settle date pair falls under these criteria.
    #[must_use]
    pub fn matches(self, trade_date: NaiveDate, settle_date: NaiveDate) -> bool {
        Self::for_dates(trade_date, settle_date) == self
    }
}

impl fmt::Display for SettlementCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TPlusZero => "T+0",
            Self::TPlusOne => "T+1",
        })
    }
}

/// Kind of blotter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlotterType {
    /// The scheduled daily blotter
    Regular,
    /// A follow-up blotter correcting a regular one
    Amendment,
    /// An unscheduled blotter
    Adhoc,
}

impl fmt::Display for BlotterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Regular => "regular",
            Self::Amendment => "amendment",
            Self::Adhoc => "adhoc",
        })
    }
}

/// Send status of a blotter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlotterStatus {
    /// Currently being sent
    InProgress,
    /// Sent successfully
    Success,
    /// Send failed
    Fail,
    /// Status could not be determined
    Unknown,
}

impl BlotterStatus {
    /// Whether the blotter has left, or is leaving, the building.
    #[must_use]
    pub const fn is_sent_or_sending(self) -> bool {
        matches!(self, Self::InProgress | Self::Success)
    }
}

impl fmt::Display for BlotterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Lookup key of a blotter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlotterKey {
    /// Settlement criteria
    pub settlement_criteria: SettlementCriteria,
    /// Blotter type
    pub blotter_type: BlotterType,
    /// Trade date
    pub trade_date: NaiveDate,
}

impl fmt::Display for BlotterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.trade_date, self.settlement_criteria, self.blotter_type
        )
    }
}

/// Operational record of a batch trade submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blotter {
    /// Settlement criteria
    pub settlement_criteria: SettlementCriteria,
    /// Blotter type
    pub blotter_type: BlotterType,
    /// Trade date
    pub trade_date: NaiveDate,
    /// Send status
    pub status: BlotterStatus,
    /// When the status was last observed to change
    pub modified_at: DateTime<Utc>,
}

impl Blotter {
    /// Key this blotter is stored under.
    #[must_use]
    pub const fn key(&self) -> BlotterKey {
        BlotterKey {
            settlement_criteria: self.settlement_criteria,
            blotter_type: self.blotter_type,
            trade_date: self.trade_date,
        }
    }
}

impl fmt::Display for Blotter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} blotter: {} as of {}",
            self.trade_date,
            self.settlement_criteria,
            self.blotter_type,
            self.status,
            self.modified_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Liveness record written while the consumer is idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Logical group of the process
    pub group: String,
    /// Run name of the process
    pub name: String,
    /// Business date the heartbeat is filed under
    pub data_date: NaiveDate,
    /// When the heartbeat was emitted
    pub modified_at: DateTime<Utc>,
    /// Optional free-text log line
    pub log: Option<String>,
    /// Optional path of the process log file
    pub log_file_path: Option<String>,
}

impl Heartbeat {
    /// Create a heartbeat stamped at `now`, filed under `now`'s date.
    #[must_use]
    pub fn new(group: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            data_date: now.date_naive(),
            modified_at: now,
            log: None,
            log_file_path: None,
        }
    }

    /// Attach a free-text log line.
    #[must_use]
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }

    /// Attach the path of the process log file.
    #[must_use]
    pub fn with_log_file_path(mut self, path: impl Into<String>) -> Self {
        self.log_file_path = Some(path.into());
        self
    }
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} heartbeat for {} at {}",
            self.group,
            self.name,
            self.data_date,
            self.modified_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Notification sent when a business rule is broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Short headline
    pub title: String,
    /// Body text
    pub body: String,
}

impl Alert {
    /// Create an alert.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Convert a days-since-1970-01-01 count to a calendar date.
///
/// Returns `None` when the result falls outside the representable date range.
#[must_use]
pub fn date_from_epoch_days(days: i64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    if days >= 0 {
        epoch.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        epoch.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

fn trimmed_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|s| s.trim().to_string())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}

fn flexible_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        // Accepts both `2024-03-01` and `2024-03-01T00:00:00`.
        Value::String(s) => {
            let date_part = s.get(..10).unwrap_or(s.as_str());
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                .map_err(|e| D::Error::custom(format!("invalid date '{s}': {e}")))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(date_from_epoch_days)
            .ok_or_else(|| D::Error::custom(format!("invalid epoch day count {n}"))),
        other => Err(D::Error::custom(format!("expected a date, found {other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test records are objects"),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn transaction_from_record_keeps_extra_columns() {
        let txn = Transaction::from_record(record(json!({
            "TransactionCode": "by  ",
            "Quantity": 150.5,
            "SecurityID1": 4412,
            "PortfolioID": "P-01",
            "TradeDate": "2024-03-01",
            "SettleDate": "2024-03-02T00:00:00",
            "TranID": 77
        })))
        .unwrap();

        assert_eq!(txn.transaction_code, "by");
        assert_eq!(txn.quantity, Decimal::new(1505, 1));
        assert_eq!(txn.security_id, "4412");
        assert_eq!(txn.trade_date, date(2024, 3, 1));
        assert_eq!(txn.settle_date, date(2024, 3, 2));
        assert_eq!(txn.attributes.get("TranID"), Some(&json!(77)));
    }

    #[test]
    fn transaction_from_record_names_missing_column() {
        let err = Transaction::from_record(record(json!({
            "TransactionCode": "by",
            "SecurityID1": "X",
            "PortfolioID": "P",
            "TradeDate": "2024-03-01",
            "SettleDate": "2024-03-01"
        })))
        .unwrap_err();

        assert!(err.to_string().contains("Quantity"), "got: {err}");
    }

    #[test]
    fn transaction_display_reads_like_a_sentence() {
        let txn = Transaction::new("by", Decimal::from(5), "SEC", "PORT", date(2024, 1, 2), date(2024, 1, 2));
        assert_eq!(txn.to_string(), "by of 5 units of SEC in PORT on 2024-01-02");
    }

    #[test]
    fn same_day_settlement_maps_to_regular_t0_blotter() {
        let txn = Transaction::new("by", Decimal::ONE, "S", "P", date(2024, 1, 2), date(2024, 1, 2));
        let key = txn.blotter_key();
        assert_eq!(key.settlement_criteria, SettlementCriteria::TPlusZero);
        assert_eq!(key.blotter_type, BlotterType::Regular);
        assert_eq!(key.trade_date, date(2024, 1, 2));
    }

    #[test]
    fn later_settlement_maps_to_t1_amendment_blotter() {
        let txn = Transaction::new("sl", Decimal::ONE, "S", "P", date(2024, 1, 2), date(2024, 1, 3));
        let key = txn.blotter_key();
        assert_eq!(key.settlement_criteria, SettlementCriteria::TPlusOne);
        assert_eq!(key.blotter_type, BlotterType::Amendment);
    }

    #[test]
    fn comment_from_record() {
        let comment = TransactionComment::from_record(record(json!({
            "TransactionCode": "*",
            "PortfolioID": 12,
            "TradeDate": 19_723,
            "Comment": "late fill"
        })))
        .unwrap();

        assert_eq!(comment.portfolio_id, "12");
        assert_eq!(comment.trade_date, date(2024, 1, 1));
        assert_eq!(comment.to_string(), "Comment in 12 on 2024-01-01: late fill");
    }

    #[test]
    fn epoch_day_conversion() {
        assert_eq!(date_from_epoch_days(0), Some(date(1970, 1, 1)));
        assert_eq!(date_from_epoch_days(1), Some(date(1970, 1, 2)));
        assert_eq!(date_from_epoch_days(-1), Some(date(1969, 12, 31)));
        assert_eq!(date_from_epoch_days(i64::MAX), None);
    }

    proptest::proptest! {
        #[test]
        fn epoch_day_conversion_is_a_plain_offset(days in -200_000i64..200_000) {
            let epoch = date(1970, 1, 1);
            let converted = date_from_epoch_days(days).unwrap();
            proptest::prop_assert_eq!((converted - epoch).num_days(), days);
        }
    }

    #[test]
    fn blotter_display() {
        let blotter = Blotter {
            settlement_criteria: SettlementCriteria::TPlusOne,
            blotter_type: BlotterType::Amendment,
            trade_date: date(2024, 5, 6),
            status: BlotterStatus::InProgress,
            modified_at: DateTime::parse_from_rfc3339("2024-05-06T17:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        assert_eq!(
            blotter.to_string(),
            "2024-05-06 T+1 amendment blotter: IN_PROGRESS as of 2024-05-06 17:30:00"
        );
    }

    #[test]
    fn only_in_progress_and_success_count_as_sent() {
        assert!(BlotterStatus::InProgress.is_sent_or_sending());
        assert!(BlotterStatus::Success.is_sent_or_sending());
        assert!(!BlotterStatus::Fail.is_sent_or_sending());
        assert!(!BlotterStatus::Unknown.is_sent_or_sending());
    }
}
