//! Persisted backup history.
//!
//! One SQLite database per backup directory. Each backup row owns its filter
//! sets and a full copy of the restore plan chain that was current when it
//! finished. A backup is recorded in a single transaction, so a failed write
//! leaves the previous history untouched.

use super::{BackupConfig, BackupStatus, History, RestorePlanEntry};
use crate::utils::{EngineError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS backups (
  timestamp TEXT PRIMARY KEY,
  backup_dir TEXT NOT NULL,
  database_name TEXT NOT NULL,
  leaf_partition_data INTEGER NOT NULL DEFAULT 0,
  plugin TEXT NOT NULL DEFAULT '',
  single_data_file INTEGER NOT NULL DEFAULT 0,
  compressed INTEGER NOT NULL DEFAULT 0,
  incremental INTEGER NOT NULL DEFAULT 0,
  status TEXT NOT NULL DEFAULT 'In Progress' CHECK(status IN ('In Progress','Success','Failure')),
  created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS backup_filters (
  timestamp TEXT NOT NULL REFERENCES backups(timestamp) ON DELETE CASCADE,
  kind TEXT NOT NULL CHECK(kind IN ('include_relation','exclude_relation','include_schema','exclude_schema')),
  position INTEGER NOT NULL,
  name TEXT NOT NULL,
  PRIMARY KEY (timestamp, kind, position)
);

CREATE TABLE IF NOT EXISTS restore_plans (
  timestamp TEXT NOT NULL REFERENCES backups(timestamp) ON DELETE CASCADE,
  position INTEGER NOT NULL,
  restore_plan_timestamp TEXT NOT NULL,
  PRIMARY KEY (timestamp, position)
);

CREATE TABLE IF NOT EXISTS restore_plan_tables (
  timestamp TEXT NOT NULL,
  plan_position INTEGER NOT NULL,
  position INTEGER NOT NULL,
  table_fqn TEXT NOT NULL,
  PRIMARY KEY (timestamp, plan_position, position),
  FOREIGN KEY (timestamp, plan_position) REFERENCES restore_plans(timestamp, position) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_backups_timestamp ON backups(timestamp DESC);
"#;

const FILTER_KINDS: [&str; 4] = [
    "include_relation",
    "exclude_relation",
    "include_schema",
    "exclude_schema",
];

pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open (creating if needed) the history database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = DELETE;
             PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Every recorded backup, newest first
    pub fn load_history(&self) -> Result<History> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM backups ORDER BY timestamp DESC")?;
        let rows = stmt.query_map([], row_to_config)?;

        let mut configs = Vec::new();
        for row in rows {
            let mut config = row?;
            self.load_details(&mut config)?;
            configs.push(config);
        }
        Ok(History::new(configs))
    }

    pub fn find_backup(&self, timestamp: &str) -> Result<Option<BackupConfig>> {
        let config = self
            .conn
            .query_row(
                "SELECT * FROM backups WHERE timestamp = ?",
                params![timestamp],
                row_to_config,
            )
            .optional()?;

        match config {
            Some(mut config) => {
                self.load_details(&mut config)?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// Insert a backup with its filters and restore plan, all or nothing.
    pub fn record_backup(&mut self, config: &BackupConfig) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO backups (timestamp, backup_dir, database_name, leaf_partition_data, plugin,
                                  single_data_file, compressed, incremental, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                config.timestamp,
                config.backup_dir,
                config.database_name,
                config.leaf_partition_data,
                config.plugin,
                config.single_data_file,
                config.compressed,
                config.incremental,
                config.status.as_str(),
            ],
        )?;

        for (kind, names) in FILTER_KINDS.iter().zip(filter_lists(config)) {
            for (position, name) in names.iter().enumerate() {
                tx.execute(
                    "INSERT INTO backup_filters (timestamp, kind, position, name) VALUES (?1, ?2, ?3, ?4)",
                    params![config.timestamp, kind, position as i64, name],
                )?;
            }
        }

        for (plan_position, entry) in config.restore_plan.iter().enumerate() {
            tx.execute(
                "INSERT INTO restore_plans (timestamp, position, restore_plan_timestamp) VALUES (?1, ?2, ?3)",
                params![config.timestamp, plan_position as i64, entry.timestamp],
            )?;
            for (position, fqn) in entry.table_fqns.iter().enumerate() {
                tx.execute(
                    "INSERT INTO restore_plan_tables (timestamp, plan_position, position, table_fqn)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![config.timestamp, plan_position as i64, position as i64, fqn],
                )?;
            }
        }

        tx.commit()?;
        info!(
            "Recorded backup {} in history ({} restore plan entries, status {})",
            config.timestamp,
            config.restore_plan.len(),
            config.status
        );
        Ok(())
    }

    pub fn set_status(&self, timestamp: &str, status: BackupStatus) -> Result<()> {
        let changes = self.conn.execute(
            "UPDATE backups SET status = ? WHERE timestamp = ?",
            params![status.as_str(), timestamp],
        )?;
        if changes == 0 {
            return Err(EngineError::BackupNotFound(timestamp.to_string()));
        }
        Ok(())
    }

    fn load_details(&self, config: &mut BackupConfig) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, name FROM backup_filters WHERE timestamp = ? ORDER BY kind, position",
        )?;
        let rows = stmt.query_map(params![config.timestamp], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (kind, name) = row?;
            match kind.as_str() {
                "include_relation" => config.include_relations.push(name),
                "exclude_relation" => config.exclude_relations.push(name),
                "include_schema" => config.include_schemas.push(name),
                "exclude_schema" => config.exclude_schemas.push(name),
                other => {
                    return Err(EngineError::Config(format!(
                        "unknown filter kind '{}' for backup {}",
                        other, config.timestamp
                    )))
                }
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT position, restore_plan_timestamp FROM restore_plans WHERE timestamp = ? ORDER BY position",
        )?;
        let plans = stmt
            .query_map(params![config.timestamp], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT table_fqn FROM restore_plan_tables WHERE timestamp = ? AND plan_position = ? ORDER BY position",
        )?;
        for (plan_position, plan_timestamp) in plans {
            let table_fqns = stmt
                .query_map(params![config.timestamp, plan_position], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            config.restore_plan.push(RestorePlanEntry {
                timestamp: plan_timestamp,
                table_fqns,
            });
        }
        Ok(())
    }
}

fn filter_lists(config: &BackupConfig) -> [&Vec<String>; 4] {
    [
        &config.include_relations,
        &config.exclude_relations,
        &config.include_schemas,
        &config.exclude_schemas,
    ]
}

fn row_to_config(row: &Row) -> rusqlite::Result<BackupConfig> {
    let status: String = row.get("status")?;
    let status = status.parse::<BackupStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(BackupConfig {
        timestamp: row.get("timestamp")?,
        backup_dir: row.get("backup_dir")?,
        database_name: row.get("database_name")?,
        leaf_partition_data: row.get("leaf_partition_data")?,
        plugin: row.get("plugin")?,
        single_data_file: row.get("single_data_file")?,
        compressed: row.get("compressed")?,
        incremental: row.get("incremental")?,
        include_relations: Vec::new(),
        exclude_relations: Vec::new(),
        include_schemas: Vec::new(),
        exclude_schemas: Vec::new(),
        status,
        restore_plan: Vec::new(),
    })
}
