//! Tests for `FileBlotterRepository` against a real directory tree.

#![allow(clippy::unwrap_used)]

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use txn_validation_app::FileBlotterRepository;
use txn_validation_core::models::{
    Blotter, BlotterKey, BlotterStatus, BlotterType, SettlementCriteria, Transaction,
};
use txn_validation_core::repository::{BlotterRepository, RepositoryError};
use txn_validation_runtime::rules::{PostedAfterBlotterSent, ValidationRule, Verdict};

fn trade_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

fn same_day_key() -> BlotterKey {
    BlotterKey {
        settlement_criteria: SettlementCriteria::TPlusZero,
        blotter_type: BlotterType::Regular,
        trade_date: trade_date(),
    }
}

/// Drop an empty blotter file where the repository expects it.
fn write_blotter(dir: &TempDir, file_name: &str) {
    let blotter_dir = dir.path().join("202406").join("03").join("BLOTTER");
    fs::create_dir_all(&blotter_dir).unwrap();
    fs::write(blotter_dir.join(file_name), b"").unwrap();
}

#[tokio::test]
async fn test_present_file_means_blotter_was_sent() {
    let dir = TempDir::new().unwrap();
    write_blotter(&dir, "MutualFundAcctSameDaySettlement_20240603.xlsx");
    let repo = FileBlotterRepository::new(dir.path(), "MutualFundAcct");

    let blotters = repo.get(&same_day_key()).await.unwrap();

    assert_eq!(blotters.len(), 1);
    assert_eq!(blotters[0].status, BlotterStatus::Success);
    assert_eq!(blotters[0].key(), same_day_key());
}

#[tokio::test]
async fn test_absent_file_means_status_unknown() {
    let dir = TempDir::new().unwrap();
    let repo = FileBlotterRepository::new(dir.path(), "MutualFundAcct");

    let blotters = repo.get(&same_day_key()).await.unwrap();

    assert_eq!(blotters.len(), 1);
    assert_eq!(blotters[0].status, BlotterStatus::Unknown);
}

#[tokio::test]
async fn test_unfiled_blotter_kind_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let repo = FileBlotterRepository::new(dir.path(), "MutualFundAcct");
    let key = BlotterKey {
        blotter_type: BlotterType::Adhoc,
        ..same_day_key()
    };

    assert!(repo.get(&key).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_repository_is_read_only() {
    let dir = TempDir::new().unwrap();
    let repo = FileBlotterRepository::new(dir.path(), "MutualFundAcct");
    let blotter = Blotter {
        settlement_criteria: SettlementCriteria::TPlusZero,
        blotter_type: BlotterType::Regular,
        trade_date: trade_date(),
        status: BlotterStatus::Success,
        modified_at: Utc.with_ymd_and_hms(2024, 6, 3, 16, 0, 0).unwrap(),
    };

    let err = repo.create(&blotter).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ReadOnly { .. }));
}

#[tokio::test]
async fn test_rule_breaks_once_same_day_blotter_file_lands() {
    let dir = TempDir::new().unwrap();
    let rule = PostedAfterBlotterSent::new(Arc::new(FileBlotterRepository::new(dir.path(), "MutualFundAcct")));
    let txn = Transaction::new("by", Decimal::ONE, "SEC-1", "PORT-1", trade_date(), trade_date());

    assert_eq!(rule.evaluate(&txn).await.unwrap(), Verdict::Compliant);

    write_blotter(&dir, "MutualFundAcctSameDaySettlement_20240603.xlsx");
    assert_eq!(rule.evaluate(&txn).await.unwrap(), Verdict::Broken);
}

#[tokio::test]
async fn test_next_day_transaction_checks_the_regular_file() {
    let dir = TempDir::new().unwrap();
    write_blotter(&dir, "MutualFundAcct_20240603.xlsx");
    let rule = PostedAfterBlotterSent::new(Arc::new(FileBlotterRepository::new(dir.path(), "MutualFundAcct")));
    let settle = NaiveDate::from_ymd_opt(2024, 6, 4).unwrap();
    let txn = Transaction::new("by", Decimal::ONE, "SEC-1", "PORT-1", trade_date(), settle);

    assert_eq!(rule.evaluate(&txn).await.unwrap(), Verdict::Broken);
}
