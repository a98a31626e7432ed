//! Backup-time control flow.
//!
//! A session resolves which tables a run must capture and, once the run has
//! finished writing its artifacts, records it in the history with its
//! updated restore plan.

use crate::config::BackupOptions;
use crate::history::{target_backup_timestamp, BackupConfig, BackupStatus, History, HistoryStore};
use crate::incremental::{filter_tables_for_incremental, Table};
use crate::paths::{self, BackupPaths};
use crate::restore_plan::{full_backup_restore_plan, populate_restore_plan};
use crate::toc::Toc;
use crate::utils::Result;
use tracing::info;

/// Tables a run captures, and the backup it builds on for incremental runs
#[derive(Debug, Clone)]
pub struct TableSelection {
    pub tables: Vec<Table>,
    pub anchor: Option<BackupConfig>,
}

#[derive(Debug, Clone)]
pub struct BackupSession {
    options: BackupOptions,
    paths: BackupPaths,
}

impl BackupSession {
    pub fn new(options: BackupOptions, timestamp: &str) -> Result<Self> {
        let paths = BackupPaths::new(options.backup_dir.clone(), timestamp)?;
        Ok(Self { options, paths })
    }

    /// Session for a backup starting now
    pub fn start(options: BackupOptions) -> Result<Self> {
        Self::new(options, &paths::new_timestamp())
    }

    pub fn timestamp(&self) -> &str {
        self.paths.timestamp()
    }

    pub fn paths(&self) -> &BackupPaths {
        &self.paths
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    pub fn backup_config(&self) -> BackupConfig {
        self.options.to_backup_config(self.timestamp())
    }

    /// Narrow `tables` to what this run must capture.
    ///
    /// A full run keeps everything. An incremental run anchors on a previous
    /// backup (fatal if none matches) and diffs against that backup's TOC.
    pub fn select_tables(
        &self,
        history: &History,
        current_toc: &Toc,
        tables: &[Table],
    ) -> Result<TableSelection> {
        if !self.options.incremental {
            return Ok(TableSelection {
                tables: tables.to_vec(),
                anchor: None,
            });
        }

        let current = self.backup_config();
        let anchor = target_backup_timestamp(
            history,
            &current,
            self.options.from_timestamp.as_deref(),
        )?;
        let reference_paths = BackupPaths::new(self.options.backup_dir.clone(), &anchor.timestamp)?;
        let reference_toc = Toc::from_file(&reference_paths.toc_path())?;

        let changed = filter_tables_for_incremental(&reference_toc, current_toc, tables);
        info!(
            "Incremental backup {} based on {}: {} of {} tables changed",
            self.timestamp(),
            anchor.timestamp,
            changed.len(),
            tables.len()
        );

        Ok(TableSelection {
            tables: changed,
            anchor: Some(anchor.clone()),
        })
    }

    /// Record the finished run and its restore plan in the history.
    pub fn commit(
        &self,
        store: &mut HistoryStore,
        selection: &TableSelection,
        all_tables: &[Table],
    ) -> Result<BackupConfig> {
        let mut config = self.backup_config();
        config.restore_plan = match &selection.anchor {
            Some(anchor) => populate_restore_plan(
                self.timestamp(),
                &selection.tables,
                anchor.restore_plan.clone(),
                all_tables,
            ),
            None => full_backup_restore_plan(self.timestamp(), all_tables),
        };
        config.status = BackupStatus::Success;

        store.record_backup(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::RestorePlanEntry;
    use crate::utils::EngineError;
    use std::path::Path;

    fn options(backup_dir: &Path, incremental: bool) -> BackupOptions {
        BackupOptions {
            backup_dir: backup_dir.to_path_buf(),
            database_name: "warehouse".to_string(),
            incremental,
            ..Default::default()
        }
    }

    fn all_tables() -> Vec<Table> {
        vec![
            Table::new(1, "public", "ao_hot"),
            Table::new(2, "public", "ao_cold"),
            Table::new(3, "public", "heap"),
        ]
    }

    fn toc_with(hot_modcount: i64) -> Toc {
        let mut toc = Toc::new();
        toc.add_ao_entry("public.ao_hot", hot_modcount, 100);
        toc.add_ao_entry("public.ao_cold", 7, 100);
        toc
    }

    fn write_toc(session: &BackupSession, toc: &Toc) -> Result<()> {
        session.paths().create_timestamp_dir()?;
        toc.write_to_file_and_make_read_only(&session.paths().toc_path())
    }

    #[test]
    fn test_full_then_incremental_chain() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = HistoryStore::open(&paths::history_file_path(dir.path()))?;
        let tables = all_tables();

        let full = BackupSession::new(options(dir.path(), false), "20240101000000")?;
        let selection = full.select_tables(&store.load_history()?, &toc_with(5), &tables)?;
        assert_eq!(selection.tables, tables);
        write_toc(&full, &toc_with(5))?;
        full.commit(&mut store, &selection, &tables)?;

        let incremental = BackupSession::new(options(dir.path(), true), "20240102000000")?;
        let current_toc = toc_with(6);
        let selection = incremental.select_tables(&store.load_history()?, &current_toc, &tables)?;
        assert_eq!(
            selection.tables.iter().map(Table::fqn).collect::<Vec<_>>(),
            vec!["public.ao_hot", "public.heap"]
        );
        assert_eq!(selection.anchor.as_ref().unwrap().timestamp, "20240101000000");
        write_toc(&incremental, &current_toc)?;
        let config = incremental.commit(&mut store, &selection, &tables)?;

        assert_eq!(
            config.restore_plan,
            vec![
                RestorePlanEntry {
                    timestamp: "20240101000000".to_string(),
                    table_fqns: vec!["public.ao_cold".to_string()],
                },
                RestorePlanEntry {
                    timestamp: "20240102000000".to_string(),
                    table_fqns: vec!["public.ao_hot".to_string(), "public.heap".to_string()],
                },
            ]
        );

        let history = store.load_history()?;
        assert_eq!(history.backup_configs.len(), 2);
        assert_eq!(history.backup_configs[0], config);
        // the anchor's own chain is not rewritten
        assert_eq!(history.backup_configs[1].restore_plan.len(), 1);
        Ok(())
    }

    #[test]
    fn test_incremental_without_history_is_fatal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let session = BackupSession::new(options(dir.path(), true), "20240102000000")?;

        let result = session.select_tables(&History::default(), &toc_with(1), &all_tables());

        assert!(matches!(result, Err(EngineError::NoMatchingBackup)));
        Ok(())
    }

    #[test]
    fn test_missing_reference_toc_is_fatal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = HistoryStore::open_in_memory()?;
        let tables = all_tables();

        let full = BackupSession::new(options(dir.path(), false), "20240101000000")?;
        let selection = full.select_tables(&History::default(), &toc_with(5), &tables)?;
        full.commit(&mut store, &selection, &tables)?;

        let incremental = BackupSession::new(options(dir.path(), true), "20240102000000")?;
        let result = incremental.select_tables(&store.load_history()?, &toc_with(6), &tables);

        assert!(matches!(result, Err(EngineError::Io(_))));
        Ok(())
    }
}
