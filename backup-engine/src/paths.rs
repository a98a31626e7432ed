//! On-disk layout of backup artifacts.
//!
//! ```text
//! <backup_dir>/backup_history.db
//! <backup_dir>/backups/<YYYYMMDD>/<timestamp>/backup_<timestamp>_toc.json
//! <backup_dir>/backups/<YYYYMMDD>/<timestamp>/backup_<timestamp>_metadata.sql
//! <backup_dir>/backups/<YYYYMMDD>/<timestamp>/backup_<content>_<timestamp>_toc.json
//! <backup_dir>/backups/<YYYYMMDD>/<timestamp>/backup_<content>_<timestamp>_data
//! ```

use crate::utils::{EngineError, Result};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
pub const HISTORY_FILE_NAME: &str = "backup_history.db";

/// Timestamp for a backup starting now, in local time
pub fn new_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Check that `timestamp` is a real `YYYYMMDDHHMMSS` date
pub fn validate_timestamp(timestamp: &str) -> Result<()> {
    let well_formed = timestamp.len() == 14
        && timestamp.bytes().all(|b| b.is_ascii_digit())
        && NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).is_ok();
    if well_formed {
        Ok(())
    } else {
        Err(EngineError::InvalidTimestamp(timestamp.to_string()))
    }
}

pub fn history_file_path(backup_dir: &Path) -> PathBuf {
    backup_dir.join(HISTORY_FILE_NAME)
}

/// Artifact paths of one backup
#[derive(Debug, Clone)]
pub struct BackupPaths {
    backup_dir: PathBuf,
    timestamp: String,
}

impl BackupPaths {
    pub fn new(backup_dir: impl Into<PathBuf>, timestamp: &str) -> Result<Self> {
        validate_timestamp(timestamp)?;
        Ok(Self {
            backup_dir: backup_dir.into(),
            timestamp: timestamp.to_string(),
        })
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn timestamp_dir(&self) -> PathBuf {
        self.backup_dir
            .join("backups")
            .join(&self.timestamp[..8])
            .join(&self.timestamp)
    }

    pub fn toc_path(&self) -> PathBuf {
        self.timestamp_dir()
            .join(format!("backup_{}_toc.json", self.timestamp))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.timestamp_dir()
            .join(format!("backup_{}_metadata.sql", self.timestamp))
    }

    pub fn segment_toc_path(&self, content_id: i32) -> PathBuf {
        self.timestamp_dir()
            .join(format!("backup_{}_{}_toc.json", content_id, self.timestamp))
    }

    pub fn segment_data_path(&self, content_id: i32) -> PathBuf {
        self.timestamp_dir()
            .join(format!("backup_{}_{}_data", content_id, self.timestamp))
    }

    pub fn history_path(&self) -> PathBuf {
        history_file_path(&self.backup_dir)
    }

    pub fn create_timestamp_dir(&self) -> Result<PathBuf> {
        let dir = self.timestamp_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_timestamp() {
        assert!(validate_timestamp("20240115093000").is_ok());
        assert!(validate_timestamp("2024011509300").is_err());
        assert!(validate_timestamp("20241315093000").is_err());
        assert!(validate_timestamp("2024-01-15 09:3").is_err());
        assert!(validate_timestamp("").is_err());
    }

    #[test]
    fn test_new_timestamp_is_valid() {
        assert!(validate_timestamp(&new_timestamp()).is_ok());
    }

    #[test]
    fn test_artifact_paths() {
        let paths = BackupPaths::new("/data/backups", "20240115093000").unwrap();

        assert_eq!(
            paths.toc_path(),
            PathBuf::from("/data/backups/backups/20240115/20240115093000/backup_20240115093000_toc.json")
        );
        assert_eq!(
            paths.segment_toc_path(2),
            PathBuf::from("/data/backups/backups/20240115/20240115093000/backup_2_20240115093000_toc.json")
        );
        assert_eq!(
            paths.segment_data_path(-1).file_name().unwrap(),
            "backup_-1_20240115093000_data"
        );
        assert_eq!(paths.history_path(), PathBuf::from("/data/backups/backup_history.db"));
    }

    #[test]
    fn test_rejects_bad_timestamp() {
        assert!(matches!(
            BackupPaths::new("/data", "latest"),
            Err(EngineError::InvalidTimestamp(_))
        ));
    }
}
