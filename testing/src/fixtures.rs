//! Builders for transactions and CDC payloads.
//!
//! Upstream rows use the ledger's column names and encode dates as day counts
//! since 1970-01-01, exactly as the change-data-capture connector does.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value, json};
use txn_validation_core::models::Transaction;

/// Trade date used by [`transaction`]: Monday 2024-06-03.
#[must_use]
pub fn trade_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

/// A same-day-settled buy of `quantity` units.
#[must_use]
pub fn transaction(quantity: i64) -> Transaction {
    Transaction::new(
        "by",
        Decimal::from(quantity),
        "SEC-1",
        "PORT-1",
        trade_date(),
        trade_date(),
    )
}

/// Days since 1970-01-01, as the connector encodes dates.
#[must_use]
pub fn epoch_days(date: NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    (date - epoch).num_days()
}

/// An upstream transaction row with integer-encoded dates.
#[must_use]
pub fn transaction_row(code: &str, quantity: i64, trade: NaiveDate, settle: NaiveDate) -> Value {
    json!({
        "TransactionCode": code,
        "Quantity": quantity,
        "SecurityID1": "SEC-1",
        "PortfolioID": "PORT-1",
        "TradeDate": epoch_days(trade),
        "SettleDate": epoch_days(settle),
    })
}

/// An upstream comment row. Comment rows are padded like the fixed-width source.
#[must_use]
pub fn comment_row(text: &str, trade: NaiveDate) -> Value {
    json!({
        "TransactionCode": "*   ",
        "PortfolioID": "PORT-1",
        "TradeDate": epoch_days(trade),
        "Comment": text,
    })
}

/// Wrap row snapshots in a CDC envelope and encode it.
#[must_use]
pub fn cdc_message(op: &str, before: Option<Value>, after: Option<Value>) -> Vec<u8> {
    let mut payload = Map::new();
    payload.insert("before".into(), before.unwrap_or(Value::Null));
    payload.insert("after".into(), after.unwrap_or(Value::Null));
    payload.insert("op".into(), Value::String(op.to_string()));
    serde_json::to_vec(&json!({ "payload": payload })).unwrap()
}
