//! Backup history: the configuration each past backup ran with, and the
//! restore plan chain recorded alongside it.
//!
//! Incremental backups anchor on the most recent history entry whose
//! configuration matches the current run.

pub mod store;

use crate::filter::same_set;
use crate::paths::validate_timestamp;
use crate::utils::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

pub use store::HistoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStatus {
    #[serde(rename = "In Progress")]
    InProgress,
    Success,
    Failure,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::InProgress => "In Progress",
            BackupStatus::Success => "Success",
            BackupStatus::Failure => "Failure",
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "In Progress" => Ok(BackupStatus::InProgress),
            "Success" => Ok(BackupStatus::Success),
            "Failure" => Ok(BackupStatus::Failure),
            other => Err(EngineError::Config(format!("unknown backup status '{}'", other))),
        }
    }
}

/// Tables whose authoritative data lives in the backup taken at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePlanEntry {
    pub timestamp: String,
    pub table_fqns: Vec<String>,
}

/// Snapshot of the options a backup was taken with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub timestamp: String,
    pub backup_dir: String,
    pub database_name: String,
    pub leaf_partition_data: bool,
    pub plugin: String,
    pub single_data_file: bool,
    pub compressed: bool,
    pub incremental: bool,
    pub include_relations: Vec<String>,
    pub exclude_relations: Vec<String>,
    pub include_schemas: Vec<String>,
    pub exclude_schemas: Vec<String>,
    pub status: BackupStatus,
    pub restore_plan: Vec<RestorePlanEntry>,
}

/// Backup history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    pub backup_configs: Vec<BackupConfig>,
}

impl History {
    pub fn new(backup_configs: Vec<BackupConfig>) -> Self {
        Self { backup_configs }
    }

    pub fn find(&self, timestamp: &str) -> Option<&BackupConfig> {
        self.backup_configs.iter().find(|c| c.timestamp == timestamp)
    }
}

/// Plugin identity is the executable name; install paths differ between hosts.
fn plugin_name(plugin: &str) -> &str {
    Path::new(plugin)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("")
}

/// Whether a previous backup can anchor an incremental run with `current`'s options.
pub fn matches_incremental_flags(previous: &BackupConfig, current: &BackupConfig) -> bool {
    previous.backup_dir == current.backup_dir
        && previous.database_name == current.database_name
        && previous.leaf_partition_data == current.leaf_partition_data
        && plugin_name(&previous.plugin) == plugin_name(&current.plugin)
        && previous.single_data_file == current.single_data_file
        && previous.compressed == current.compressed
        && same_set(&previous.include_relations, &current.include_relations)
        && same_set(&previous.include_schemas, &current.include_schemas)
        && same_set(&previous.exclude_relations, &current.exclude_relations)
        && same_set(&previous.exclude_schemas, &current.exclude_schemas)
}

/// Most recent non-failed backup whose options match `current`.
pub fn latest_matching_backup<'a>(
    history: &'a History,
    current: &BackupConfig,
) -> Option<&'a BackupConfig> {
    history.backup_configs.iter().find(|config| {
        if config.status == BackupStatus::Failure {
            warn!("Skipping failed backup {} as incremental anchor", config.timestamp);
            return false;
        }
        let matches = matches_incremental_flags(config, current);
        debug!("Backup {} matches current flags: {}", config.timestamp, matches);
        matches
    })
}

/// Resolve the backup an incremental run builds on.
///
/// An explicit `from_timestamp` must exist in the history, must not have
/// failed, and must match the current flags; otherwise the latest matching backup is used. Having no
/// anchor at all is fatal: a full backup has to be taken first.
pub fn target_backup_timestamp<'a>(
    history: &'a History,
    current: &BackupConfig,
    from_timestamp: Option<&str>,
) -> Result<&'a BackupConfig> {
    match from_timestamp.filter(|ts| !ts.is_empty()) {
        Some(timestamp) => {
            validate_timestamp(timestamp)?;
            let config = history
                .find(timestamp)
                .ok_or_else(|| EngineError::BackupNotFound(timestamp.to_string()))?;
            if config.status == BackupStatus::Failure {
                return Err(EngineError::FailedBackup(timestamp.to_string()));
            }
            if !matches_incremental_flags(config, current) {
                return Err(EngineError::IncrementalFlagsMismatch(timestamp.to_string()));
            }
            Ok(config)
        }
        None => latest_matching_backup(history, current).ok_or(EngineError::NoMatchingBackup),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn config(timestamp: &str) -> BackupConfig {
        BackupConfig {
            timestamp: timestamp.to_string(),
            backup_dir: "/data/backups".to_string(),
            database_name: "warehouse".to_string(),
            leaf_partition_data: true,
            plugin: String::new(),
            single_data_file: false,
            compressed: true,
            incremental: false,
            include_relations: vec![],
            exclude_relations: vec![],
            include_schemas: vec![],
            exclude_schemas: vec![],
            status: BackupStatus::Success,
            restore_plan: vec![],
        }
    }

    #[test]
    fn test_plugin_compared_by_basename() {
        let mut previous = config("20240101000000");
        previous.plugin = "/usr/local/bin/gpbackup_plugin".to_string();
        let mut current = config("20240102000000");
        current.plugin = "gpbackup_plugin".to_string();

        assert!(matches_incremental_flags(&previous, &current));

        current.leaf_partition_data = false;
        assert!(!matches_incremental_flags(&previous, &current));
    }

    #[test]
    fn test_each_compared_field_breaks_match() {
        let previous = config("20240101000000");
        let mutations: Vec<fn(&mut BackupConfig)> = vec![
            |c: &mut BackupConfig| c.backup_dir = "/other".to_string(),
            |c: &mut BackupConfig| c.database_name = "other".to_string(),
            |c: &mut BackupConfig| c.leaf_partition_data = false,
            |c: &mut BackupConfig| c.plugin = "/opt/other_plugin".to_string(),
            |c: &mut BackupConfig| c.single_data_file = true,
            |c: &mut BackupConfig| c.compressed = false,
            |c: &mut BackupConfig| c.include_relations = vec!["public.t1".to_string()],
            |c: &mut BackupConfig| c.exclude_relations = vec!["public.t1".to_string()],
            |c: &mut BackupConfig| c.include_schemas = vec!["public".to_string()],
            |c: &mut BackupConfig| c.exclude_schemas = vec!["public".to_string()],
        ];

        for mutate in mutations {
            let mut current = config("20240102000000");
            mutate(&mut current);
            assert!(!matches_incremental_flags(&previous, &current));
        }
    }

    #[test]
    fn test_filter_sets_compared_unordered() {
        let mut previous = config("20240101000000");
        previous.include_relations = vec!["s.a".to_string(), "s.b".to_string()];
        let mut current = config("20240102000000");
        current.include_relations = vec!["s.b".to_string(), "s.a".to_string(), "s.b".to_string()];

        assert!(matches_incremental_flags(&previous, &current));
    }

    #[test]
    fn test_latest_matching_backup_prefers_newest_and_skips_failed() {
        let mut failed = config("20240103000000");
        failed.status = BackupStatus::Failure;
        let mut other_db = config("20240102120000");
        other_db.database_name = "other".to_string();
        let history = History::new(vec![
            failed,
            other_db,
            config("20240102000000"),
            config("20240101000000"),
        ]);
        let current = config("20240104000000");

        let matched = latest_matching_backup(&history, &current).unwrap();

        assert_eq!(matched.timestamp, "20240102000000");
    }

    #[test]
    fn test_no_match_is_fatal() {
        let mut other_db = config("20240101000000");
        other_db.database_name = "other".to_string();
        let history = History::new(vec![other_db]);

        let result = target_backup_timestamp(&history, &config("20240102000000"), None);
        assert!(matches!(result, Err(EngineError::NoMatchingBackup)));

        let empty = History::default();
        let result = target_backup_timestamp(&empty, &config("20240102000000"), None);
        assert!(matches!(result, Err(EngineError::NoMatchingBackup)));
    }

    #[test]
    fn test_from_timestamp_override() {
        let mut other_db = config("20240102000000");
        other_db.database_name = "other".to_string();
        let history = History::new(vec![other_db, config("20240101000000")]);
        let current = config("20240103000000");

        let anchored = target_backup_timestamp(&history, &current, Some("20240101000000")).unwrap();
        assert_eq!(anchored.timestamp, "20240101000000");

        assert!(matches!(
            target_backup_timestamp(&history, &current, Some("20240102000000")),
            Err(EngineError::IncrementalFlagsMismatch(_))
        ));
        assert!(matches!(
            target_backup_timestamp(&history, &current, Some("20231231000000")),
            Err(EngineError::BackupNotFound(_))
        ));
        assert!(matches!(
            target_backup_timestamp(&history, &current, Some("yesterday")),
            Err(EngineError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_from_timestamp_rejects_failed_backup() {
        let mut failed = config("20240102000000");
        failed.status = BackupStatus::Failure;
        let history = History::new(vec![failed, config("20240101000000")]);
        let current = config("20240103000000");

        let latest = latest_matching_backup(&history, &current).map(|c| c.timestamp.as_str());
        assert_eq!(latest, Some("20240101000000"));

        assert!(matches!(
            target_backup_timestamp(&history, &current, Some("20240102000000")),
            Err(EngineError::FailedBackup(ts)) if ts == "20240102000000"
        ));
    }

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in [BackupStatus::InProgress, BackupStatus::Success, BackupStatus::Failure] {
            assert_eq!(status.as_str().parse::<BackupStatus>().unwrap(), status);
        }
    }
}
