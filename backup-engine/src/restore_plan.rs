//! Restore plan maintenance.
//!
//! The restore plan is the chain of `(timestamp, tables)` entries telling a
//! restore which backup holds the authoritative data of each table. After
//! every successful backup, each live table appears in at most one entry.

use crate::history::RestorePlanEntry;
use crate::incremental::{FqnIndex, Table};
use std::collections::BTreeMap;
use tracing::info;

/// Append the current backup's entry and prune the older ones.
///
/// Tables captured now are removed from earlier entries, and so are tables
/// that no longer exist. This is a one-shot transition per completed backup;
/// applying it twice appends a second entry for `timestamp`.
pub fn populate_restore_plan(
    timestamp: &str,
    changed_tables: &[Table],
    mut restore_plan: Vec<RestorePlanEntry>,
    all_tables: &[Table],
) -> Vec<RestorePlanEntry> {
    let current_entry = RestorePlanEntry {
        timestamp: timestamp.to_string(),
        table_fqns: changed_tables.iter().map(Table::fqn).collect(),
    };

    let changed = FqnIndex::from_tables(changed_tables);
    let live = FqnIndex::from_tables(all_tables);

    for entry in restore_plan.iter_mut() {
        let before = entry.table_fqns.len();
        entry
            .table_fqns
            .retain(|fqn| !changed.contains(fqn) && live.contains(fqn));
        let pruned = before - entry.table_fqns.len();
        if pruned > 0 {
            info!("Pruned {} tables from restore plan entry {}", pruned, entry.timestamp);
        }
    }
    restore_plan.push(current_entry);

    restore_plan
}

/// Restore plan of a full backup: one entry holding every table
pub fn full_backup_restore_plan(timestamp: &str, tables: &[Table]) -> Vec<RestorePlanEntry> {
    vec![RestorePlanEntry {
        timestamp: timestamp.to_string(),
        table_fqns: tables.iter().map(Table::fqn).collect(),
    }]
}

/// Backup holding the authoritative data for `fqn`, if any
pub fn timestamp_for_table<'a>(restore_plan: &'a [RestorePlanEntry], fqn: &str) -> Option<&'a str> {
    restore_plan
        .iter()
        .rev()
        .find(|entry| entry.table_fqns.iter().any(|t| t == fqn))
        .map(|entry| entry.timestamp.as_str())
}

/// Tables to restore from each backup, skipping entries with nothing left
pub fn tables_by_timestamp(restore_plan: &[RestorePlanEntry]) -> BTreeMap<&str, &[String]> {
    restore_plan
        .iter()
        .filter(|entry| !entry.table_fqns.is_empty())
        .map(|entry| (entry.timestamp.as_str(), entry.table_fqns.as_slice()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(names: &[&str]) -> Vec<Table> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Table::new(i as u32 + 1, "public", name))
            .collect()
    }

    fn entry(timestamp: &str, fqns: &[&str]) -> RestorePlanEntry {
        RestorePlanEntry {
            timestamp: timestamp.to_string(),
            table_fqns: fqns.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_changed_table_moves_to_new_entry() {
        let chain = vec![entry("T0", &["public.a", "public.b", "public.c"])];

        let result = populate_restore_plan("T1", &tables(&["b"]), chain, &tables(&["a", "b", "c"]));

        assert_eq!(
            result,
            vec![entry("T0", &["public.a", "public.c"]), entry("T1", &["public.b"])]
        );
    }

    #[test]
    fn test_dropped_table_is_pruned() {
        let chain = vec![entry("T0", &["public.a", "public.b"])];

        let result = populate_restore_plan("T1", &[], chain, &tables(&["a"]));

        assert_eq!(result, vec![entry("T0", &["public.a"]), entry("T1", &[])]);
    }

    #[test]
    fn test_each_entry_pruned_independently() {
        let chain = vec![
            entry("T0", &["public.a", "public.b"]),
            entry("T1", &["public.c"]),
        ];

        let result = populate_restore_plan(
            "T2",
            &tables(&["c", "a"]),
            chain,
            &tables(&["a", "b", "c"]),
        );

        assert_eq!(
            result,
            vec![
                entry("T0", &["public.b"]),
                entry("T1", &[]),
                entry("T2", &["public.c", "public.a"]),
            ]
        );
    }

    #[test]
    fn test_each_live_table_in_at_most_one_entry() {
        let all = tables(&["a", "b", "c", "d"]);
        let plan = full_backup_restore_plan("T0", &all);
        let plan = populate_restore_plan("T1", &tables(&["b"]), plan, &all);
        let plan = populate_restore_plan("T2", &tables(&["b", "d"]), plan, &all);

        for table in &all {
            let holders = plan
                .iter()
                .filter(|e| e.table_fqns.contains(&table.fqn()))
                .count();
            assert!(holders <= 1, "{} held by {} entries", table.fqn(), holders);
        }
        assert_eq!(timestamp_for_table(&plan, "public.a"), Some("T0"));
        assert_eq!(timestamp_for_table(&plan, "public.b"), Some("T2"));
        assert_eq!(timestamp_for_table(&plan, "public.z"), None);
    }

    #[test]
    fn test_reapplying_appends_duplicate_timestamp() {
        let all = tables(&["a"]);
        let plan = full_backup_restore_plan("T0", &all);
        let once = populate_restore_plan("T1", &[], plan, &all);
        let twice = populate_restore_plan("T1", &[], once.clone(), &all);

        assert_eq!(once.len(), 2);
        assert_eq!(twice.len(), 3);
    }

    #[test]
    fn test_tables_by_timestamp_skips_empty_entries() {
        let plan = vec![entry("T0", &["public.a"]), entry("T1", &[]), entry("T2", &["public.b"])];

        let grouped = tables_by_timestamp(&plan);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["T0"], ["public.a".to_string()]);
        assert!(!grouped.contains_key("T1"));
    }
}
