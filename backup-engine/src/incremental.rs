//! Incremental differencing: decide which tables must be captured again.
//!
//! Only append-optimized tables carry a cheap change signal (modification
//! count plus last storage-affecting DDL time). Every other table is always
//! recaptured.

use crate::toc::{make_fqn, Toc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Table {
    pub oid: u32,
    pub schema: String,
    pub name: String,
}

impl Table {
    pub fn new(oid: u32, schema: &str, name: &str) -> Self {
        Self {
            oid,
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }

    pub fn fqn(&self) -> String {
        make_fqn(&self.schema, &self.name)
    }
}

/// Set of table FQNs, built once per operation and shared by its lookups.
#[derive(Debug, Clone, Default)]
pub struct FqnIndex {
    fqns: HashSet<String>,
}

impl FqnIndex {
    pub fn from_tables(tables: &[Table]) -> Self {
        Self {
            fqns: tables.iter().map(Table::fqn).collect(),
        }
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.fqns.contains(fqn)
    }
}

/// Tables from `tables` that changed since the backup `reference` describes.
///
/// A table without an AO entry in `current` is always kept. An AO table is
/// kept when its reference entry is missing or either counter differs.
pub fn filter_tables_for_incremental(reference: &Toc, current: &Toc, tables: &[Table]) -> Vec<Table> {
    let reference_ao = &reference.incremental_metadata.ao;
    let current_ao = &current.incremental_metadata.ao;

    tables
        .iter()
        .filter(|table| {
            let fqn = table.fqn();
            let Some(current_entry) = current_ao.get(&fqn) else {
                debug!("{} is not append-optimized, recapturing", fqn);
                return true;
            };
            let changed = reference_ao.get(&fqn).map_or(true, |previous| {
                previous.modcount != current_entry.modcount
                    || previous.last_ddl_timestamp != current_entry.last_ddl_timestamp
            });
            debug!("{} changed since reference backup: {}", fqn, changed);
            changed
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tocs(reference: (i64, i64), current: (i64, i64)) -> (Toc, Toc) {
        let mut reference_toc = Toc::new();
        reference_toc.add_ao_entry("public.t1", reference.0, reference.1);
        let mut current_toc = Toc::new();
        current_toc.add_ao_entry("public.t1", current.0, current.1);
        (reference_toc, current_toc)
    }

    fn candidates() -> Vec<Table> {
        vec![Table::new(1, "public", "t1"), Table::new(2, "public", "t2")]
    }

    fn fqns(tables: &[Table]) -> Vec<String> {
        tables.iter().map(Table::fqn).collect()
    }

    #[test]
    fn test_unchanged_ao_table_is_skipped() {
        let (reference, current) = tocs((5, 100), (5, 100));

        let result = filter_tables_for_incremental(&reference, &current, &candidates());

        assert_eq!(fqns(&result), vec!["public.t2"]);
    }

    #[test]
    fn test_modcount_change_is_captured() {
        let (reference, current) = tocs((5, 100), (6, 100));

        let result = filter_tables_for_incremental(&reference, &current, &candidates());

        assert_eq!(fqns(&result), vec!["public.t1", "public.t2"]);
    }

    #[test]
    fn test_ddl_change_is_captured() {
        let (reference, current) = tocs((5, 100), (5, 200));

        let result = filter_tables_for_incremental(&reference, &current, &candidates());

        assert_eq!(fqns(&result), vec!["public.t1", "public.t2"]);
    }

    #[test]
    fn test_missing_reference_entry_is_captured() {
        let reference = Toc::new();
        let mut current = Toc::new();
        current.add_ao_entry("public.t1", 0, 0);

        let result = filter_tables_for_incremental(&reference, &current, &candidates());

        assert_eq!(fqns(&result), vec!["public.t1", "public.t2"]);
    }

    #[test]
    fn test_fqn_index() {
        let index = FqnIndex::from_tables(&candidates());

        assert!(index.contains("public.t1"));
        assert!(index.contains("public.t2"));
        assert!(!index.contains("public.t3"));
    }
}
