//! Blotters observed as files on a shared drive.
//!
//! A blotter counts as sent once its spreadsheet appears under
//! `{base}/{YYYYMM}/{DD}/BLOTTER/`. The file's modification time is taken as the
//! time it was sent.

use chrono::{DateTime, NaiveDate, Utc};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use txn_validation_core::models::{Blotter, BlotterKey, BlotterStatus, BlotterType, SettlementCriteria};
use txn_validation_core::repository::{BlotterRepository, RepositoryError, RepositoryFuture};

/// Errors reading blotter files.
#[derive(Error, Debug)]
pub enum BlotterFileError {
    /// The file exists but its metadata could not be read
    #[error("Could not read metadata of {path}: {source}")]
    Metadata {
        /// File being inspected
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: io::Error,
    },
}

impl From<BlotterFileError> for RepositoryError {
    fn from(error: BlotterFileError) -> Self {
        Self::Io(error.to_string())
    }
}

/// Read-only blotter repository backed by files.
#[derive(Debug, Clone)]
pub struct FileBlotterRepository {
    base_dir: PathBuf,
    file_prefix: String,
}

impl FileBlotterRepository {
    /// Create a repository rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            file_prefix: file_prefix.into(),
        }
    }

    /// File holding the blotter for `key`, if that kind of blotter is filed at all.
    ///
    /// T+1 amendments share the T+1 regular file. T+0 amendments and ad hoc
    /// blotters have no file.
    #[must_use]
    pub fn blotter_path(&self, key: &BlotterKey) -> Option<PathBuf> {
        let suffix = match (key.settlement_criteria, key.blotter_type) {
            (SettlementCriteria::TPlusZero, BlotterType::Regular) => "SameDaySettlement",
            (SettlementCriteria::TPlusOne, BlotterType::Regular | BlotterType::Amendment) => "",
            (SettlementCriteria::TPlusZero, BlotterType::Amendment) | (_, BlotterType::Adhoc) => {
                return None;
            }
        };
        Some(self.blotter_dir(key.trade_date).join(format!(
            "{}{suffix}_{}.xlsx",
            self.file_prefix,
            key.trade_date.format("%Y%m%d")
        )))
    }

    fn blotter_dir(&self, trade_date: NaiveDate) -> PathBuf {
        self.base_dir
            .join(trade_date.format("%Y%m").to_string())
            .join(trade_date.format("%d").to_string())
            .join("BLOTTER")
    }

    async fn lookup(&self, key: BlotterKey) -> Result<Vec<Blotter>, BlotterFileError> {
        let Some(path) = self.blotter_path(&key) else {
            tracing::debug!(blotter = %key, "Blotter kind has no file");
            return Ok(Vec::new());
        };

        let blotter = match modified_at(&path).await? {
            Some(modified_at) => Blotter {
                settlement_criteria: key.settlement_criteria,
                blotter_type: key.blotter_type,
                trade_date: key.trade_date,
                status: BlotterStatus::Success,
                modified_at,
            },
            None => Blotter {
                settlement_criteria: key.settlement_criteria,
                blotter_type: key.blotter_type,
                trade_date: key.trade_date,
                status: BlotterStatus::Unknown,
                modified_at: Utc::now(),
            },
        };

        tracing::debug!(path = %path.display(), blotter = %blotter, "Looked up blotter file");
        Ok(vec![blotter])
    }
}

/// Modification time of `path`, or `None` if it does not exist.
async fn modified_at(path: &Path) -> Result<Option<DateTime<Utc>>, BlotterFileError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(BlotterFileError::Metadata {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let modified = metadata.modified().map_err(|source| BlotterFileError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(DateTime::<Utc>::from(modified)))
}

impl BlotterRepository for FileBlotterRepository {
    fn name(&self) -> &'static str {
        "Blotter files"
    }

    fn create(&self, _blotter: &Blotter) -> RepositoryFuture<'_, u64> {
        Box::pin(async move {
            Err(RepositoryError::ReadOnly {
                repository: self.name().to_string(),
            })
        })
    }

    fn get(&self, key: &BlotterKey) -> RepositoryFuture<'_, Vec<Blotter>> {
        let key = *key;
        Box::pin(async move { Ok(self.lookup(key).await?) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key(settlement_criteria: SettlementCriteria, blotter_type: BlotterType) -> BlotterKey {
        BlotterKey {
            settlement_criteria,
            blotter_type,
            trade_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        }
    }

    #[test]
    fn same_day_regular_blotter_has_its_own_file() {
        let repo = FileBlotterRepository::new("/blotters", "MutualFundAcct");
        let path = repo
            .blotter_path(&key(SettlementCriteria::TPlusZero, BlotterType::Regular))
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/blotters/202406/03/BLOTTER/MutualFundAcctSameDaySettlement_20240603.xlsx")
        );
    }

    #[test]
    fn next_day_amendment_shares_the_regular_file() {
        let repo = FileBlotterRepository::new("/blotters", "MutualFundAcct");
        let regular = repo.blotter_path(&key(SettlementCriteria::TPlusOne, BlotterType::Regular));
        let amendment = repo.blotter_path(&key(SettlementCriteria::TPlusOne, BlotterType::Amendment));
        assert_eq!(regular, amendment);
        assert_eq!(
            regular.unwrap(),
            PathBuf::from("/blotters/202406/03/BLOTTER/MutualFundAcct_20240603.xlsx")
        );
    }

    #[test]
    fn unfiled_blotter_kinds_have_no_path() {
        let repo = FileBlotterRepository::new("/blotters", "MutualFundAcct");
        assert!(repo.blotter_path(&key(SettlementCriteria::TPlusZero, BlotterType::Amendment)).is_none());
        assert!(repo.blotter_path(&key(SettlementCriteria::TPlusZero, BlotterType::Adhoc)).is_none());
        assert!(repo.blotter_path(&key(SettlementCriteria::TPlusOne, BlotterType::Adhoc)).is_none());
    }
}
