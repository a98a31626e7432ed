//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file. `BackupOptions` is the resolved set of
//! flags for one run; it is passed explicitly to every operation that needs it.

use crate::history::{BackupConfig, BackupStatus};
use crate::paths;
use crate::utils::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub backup: BackupOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// History database; defaults to `<backup_dir>/backup_history.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Resolved flags of one backup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOptions {
    /// Anchor an incremental backup on this timestamp instead of the latest match
    #[serde(default)]
    pub from_timestamp: Option<String>,

    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    #[serde(default)]
    pub database_name: String,

    /// Plugin executable, if artifacts are shipped through one
    #[serde(default)]
    pub plugin: String,

    #[serde(default)]
    pub leaf_partition_data: bool,

    #[serde(default)]
    pub single_data_file: bool,

    #[serde(default = "default_compressed")]
    pub compressed: bool,

    #[serde(default)]
    pub incremental: bool,

    #[serde(default)]
    pub include_schemas: Vec<String>,

    #[serde(default)]
    pub exclude_schemas: Vec<String>,

    #[serde(default)]
    pub include_relations: Vec<String>,

    #[serde(default)]
    pub exclude_relations: Vec<String>,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("/var/lib/backup-engine")
}

fn default_compressed() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            from_timestamp: None,
            backup_dir: default_backup_dir(),
            database_name: String::new(),
            plugin: String::new(),
            leaf_partition_data: false,
            single_data_file: false,
            compressed: default_compressed(),
            incremental: false,
            include_schemas: Vec::new(),
            exclude_schemas: Vec::new(),
            include_relations: Vec::new(),
            exclude_relations: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn history_path(&self) -> PathBuf {
        self.history
            .path
            .clone()
            .unwrap_or_else(|| paths::history_file_path(&self.backup.backup_dir))
    }
}

impl BackupOptions {
    /// History record for a run of these options starting at `timestamp`
    pub fn to_backup_config(&self, timestamp: &str) -> BackupConfig {
        BackupConfig {
            timestamp: timestamp.to_string(),
            backup_dir: self.backup_dir.display().to_string(),
            database_name: self.database_name.clone(),
            leaf_partition_data: self.leaf_partition_data,
            plugin: self.plugin.clone(),
            single_data_file: self.single_data_file,
            compressed: self.compressed,
            incremental: self.incremental,
            include_relations: self.include_relations.clone(),
            exclude_relations: self.exclude_relations.clone(),
            include_schemas: self.include_schemas.clone(),
            exclude_schemas: self.exclude_schemas.clone(),
            status: BackupStatus::InProgress,
            restore_plan: Vec::new(),
        }
    }
}
