//! Read-side access to a TOC: select entries and pull their statement text
//! out of the dump file with ranged reads.

use super::{make_fqn, MasterDataEntry, MetadataEntry, Section, Toc};
use crate::filter::FilterSet;
use crate::utils::{EngineError, Result};
use regex::{Captures, Regex};
use std::fs::File;

/// Object types whose statements name the database being restored
const DATABASE_OBJECT_TYPES: [&str; 3] = ["DATABASE GUC", "DATABASE", "DATABASE METADATA"];

const ROLE_OBJECT_TYPE: &str = "ROLE";

/// Random-access source for statement and row data.
///
/// Dump files are immutable once a backup completes, so readers share them
/// freely; every read is positional.
pub trait ReadAt {
    /// Total readable length in bytes
    fn byte_len(&self) -> std::io::Result<u64>;

    /// Fill `buf` entirely from `offset`
    fn read_at_exact(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()>;
}

impl ReadAt for File {
    fn byte_len(&self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    #[cfg(unix)]
    fn read_at_exact(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at_exact(&self, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match self.seek_read(buf, offset) {
                Ok(0) => return Err(std::io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl ReadAt for [u8] {
    fn byte_len(&self) -> std::io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_at_exact(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        let source = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(source);
        Ok(())
    }
}

/// Read `[start, end)` from `file`, failing when the range runs past `len`.
pub(crate) fn read_range<R: ReadAt + ?Sized>(
    file: &R,
    start: u64,
    end: u64,
    len: u64,
) -> Result<Vec<u8>> {
    if end < start || end > len {
        return Err(EngineError::OutOfRange { start, end, len });
    }
    let mut contents = vec![0u8; (end - start) as usize];
    file.read_at_exact(&mut contents, start)?;
    Ok(contents)
}

/// A statement pulled out of a dump, with the identity of its TOC entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementWithType {
    pub schema: String,
    pub name: String,
    pub object_type: String,
    pub reference_object: String,
    pub statement: String,
}

/// Which entries `Toc::statements_for_types` returns. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct StatementFilter {
    pub include_types: Vec<String>,
    pub exclude_types: Vec<String>,
    pub include_schemas: Vec<String>,
    /// Table FQNs; an entry matches by its own FQN or by its reference object
    pub include_tables: Vec<String>,
}

impl Toc {
    /// Statements of `section` that pass `filter`, in emission order.
    pub fn statements_for_types<R: ReadAt + ?Sized>(
        &self,
        section: Section,
        file: &R,
        filter: &StatementFilter,
    ) -> Result<Vec<StatementWithType>> {
        let include_types = FilterSet::include(filter.include_types.iter().cloned());
        let exclude_types = FilterSet::exclude(filter.exclude_types.iter().cloned());
        let schemas = FilterSet::include(filter.include_schemas.iter().cloned());
        let tables = FilterSet::include(filter.include_tables.iter().cloned());

        let len = file.byte_len()?;
        let mut statements = Vec::new();
        for entry in self.entries(section) {
            let type_matches = include_types.matches_filter(&entry.object_type)
                && exclude_types.matches_filter(&entry.object_type);
            let schema_matches = schemas.matches_filter(&entry.schema);
            let table_matches = tables.is_empty()
                || tables.contains(&make_fqn(&entry.schema, &entry.name))
                || tables.contains(&entry.reference_object);

            if type_matches && schema_matches && table_matches {
                statements.push(read_statement(entry, file, len)?);
            }
        }
        Ok(statements)
    }

    /// Every statement of `section`, in emission order.
    pub fn all_statements<R: ReadAt + ?Sized>(
        &self,
        section: Section,
        file: &R,
    ) -> Result<Vec<StatementWithType>> {
        let len = file.byte_len()?;
        self.entries(section)
            .iter()
            .map(|entry| read_statement(entry, file, len))
            .collect()
    }

    pub fn data_entries_matching(
        &self,
        include_schemas: &[String],
        include_tables: &[String],
    ) -> Vec<MasterDataEntry> {
        let schemas = FilterSet::include(include_schemas.iter().cloned());
        let tables = FilterSet::include(include_tables.iter().cloned());

        self.data_entries
            .iter()
            .filter(|entry| {
                schemas.matches_filter(&entry.schema)
                    && tables.matches_filter(&make_fqn(&entry.schema, &entry.name))
            })
            .cloned()
            .collect()
    }
}

fn read_statement<R: ReadAt + ?Sized>(
    entry: &MetadataEntry,
    file: &R,
    len: u64,
) -> Result<StatementWithType> {
    let contents = read_range(file, entry.start_byte, entry.end_byte, len)?;
    let statement = String::from_utf8(contents).map_err(|_| {
        EngineError::InvalidStatement(format!(
            "{} {}",
            entry.object_type,
            make_fqn(&entry.schema, &entry.name)
        ))
    })?;
    Ok(StatementWithType {
        schema: entry.schema.clone(),
        name: entry.name.clone(),
        object_type: entry.object_type.clone(),
        reference_object: entry.reference_object.clone(),
        statement,
    })
}

/// Rename the database in database-scoped statements.
///
/// Only `DATABASE <old>` followed by `;` or one of the clause keywords is
/// rewritten, so identifiers that merely contain the old name are untouched.
pub fn substitute_redirect_database(
    mut statements: Vec<StatementWithType>,
    old_name: &str,
    new_name: &str,
) -> Result<Vec<StatementWithType>> {
    let pattern = Regex::new(&format!(
        "DATABASE {}(;| OWNER| SET| TO| FROM| IS| TEMPLATE)",
        regex::escape(old_name)
    ))
    .map_err(|e| EngineError::Config(format!("Cannot redirect database {}: {}", old_name, e)))?;

    for statement in statements.iter_mut() {
        if DATABASE_OBJECT_TYPES.contains(&statement.object_type.as_str()) {
            statement.statement = pattern
                .replace_all(&statement.statement, |caps: &Captures| {
                    format!("DATABASE {}{}", new_name, &caps[1])
                })
                .into_owned();
        }
    }
    Ok(statements)
}

/// Drop role statements for the role the restoring session is connected as.
pub fn remove_active_role(
    active_user: &str,
    statements: Vec<StatementWithType>,
) -> Vec<StatementWithType> {
    statements
        .into_iter()
        .filter(|s| !(s.object_type == ROLE_OBJECT_TYPE && s.name == active_user))
        .collect()
}
