//! Table of contents for a backup's dump streams.
//!
//! A TOC records, for every statement written to the metadata dump, the
//! `[start_byte, end_byte)` range it occupies, grouped into four ordered
//! sections. It also records per-table data placement and the append-optimized
//! table snapshot used for incremental backups. A TOC is built once while the
//! backup streams, written to disk, and treated as read-only afterwards.

pub mod extract;
pub mod segment;
pub mod writer;

use crate::utils::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tracing::info;
use writer::ByteCountWriter;

pub use extract::{ReadAt, StatementWithType};
pub use segment::{SegmentDataEntry, SegmentToc};

/// Metadata sections of a dump, in restore order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Global,
    Predata,
    Postdata,
    Statistics,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Global,
        Section::Predata,
        Section::Postdata,
        Section::Statistics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Global => "global",
            Section::Predata => "predata",
            Section::Postdata => "postdata",
            Section::Statistics => "statistics",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global" => Ok(Section::Global),
            "predata" => Ok(Section::Predata),
            "postdata" => Ok(Section::Postdata),
            "statistics" => Ok(Section::Statistics),
            other => Err(EngineError::UnknownSection(other.to_string())),
        }
    }
}

/// Location of one emitted statement inside a section's dump stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub schema: String,
    pub name: String,
    pub object_type: String,
    /// FQN of the object this one belongs to (e.g. the table of an index), or empty
    pub reference_object: String,
    pub start_byte: u64,
    pub end_byte: u64,
}

/// Per-table data placement recorded on the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterDataEntry {
    pub schema: String,
    pub name: String,
    pub oid: u32,
    pub attribute_string: String,
    pub rows_copied: i64,
}

/// Change-tracking snapshot of one append-optimized table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoEntry {
    pub modcount: i64,
    pub last_ddl_timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalMetadata {
    /// AO tables keyed by FQN
    #[serde(default)]
    pub ao: BTreeMap<String, AoEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toc {
    #[serde(default)]
    pub global_entries: Vec<MetadataEntry>,
    #[serde(default)]
    pub predata_entries: Vec<MetadataEntry>,
    #[serde(default)]
    pub postdata_entries: Vec<MetadataEntry>,
    #[serde(default)]
    pub statistics_entries: Vec<MetadataEntry>,
    #[serde(default)]
    pub data_entries: Vec<MasterDataEntry>,
    #[serde(default)]
    pub incremental_metadata: IncrementalMetadata,
}

/// Schema-qualified name used as the key for tables across every structure.
pub fn make_fqn(schema: &str, name: &str) -> String {
    format!("{}.{}", schema, name)
}

impl Toc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOC artifact from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read(path)?;
        let toc: Toc = serde_json::from_slice(&contents)?;
        Ok(toc)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_vec_pretty(self)?;
        let mut file = std::fs::File::create(path)?;
        file.write_all(&contents)?;
        file.sync_all()?;
        info!(
            "Wrote TOC {} ({} metadata entries, {} data entries)",
            path.display(),
            self.metadata_entry_count(),
            self.data_entries.len()
        );
        Ok(())
    }

    /// Write the TOC and mark the file read-only (0444 on unix)
    pub fn write_to_file_and_make_read_only(&self, path: &Path) -> Result<()> {
        self.write_to_file(path)?;
        make_read_only(path)
    }

    pub fn entries(&self, section: Section) -> &[MetadataEntry] {
        match section {
            Section::Global => &self.global_entries,
            Section::Predata => &self.predata_entries,
            Section::Postdata => &self.postdata_entries,
            Section::Statistics => &self.statistics_entries,
        }
    }

    fn entries_mut(&mut self, section: Section) -> &mut Vec<MetadataEntry> {
        match section {
            Section::Global => &mut self.global_entries,
            Section::Predata => &mut self.predata_entries,
            Section::Postdata => &mut self.postdata_entries,
            Section::Statistics => &mut self.statistics_entries,
        }
    }

    pub fn metadata_entry_count(&self) -> usize {
        Section::ALL.iter().map(|s| self.entries(*s).len()).sum()
    }

    /// Record a statement that was just written to `file`, starting at `start`.
    ///
    /// The end offset is the writer's current byte count. Entries must arrive in
    /// emission order: a statement that is empty or that starts before the
    /// previous entry in the same section ends is rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn add_metadata_entry<W: Write>(
        &mut self,
        section: Section,
        schema: &str,
        name: &str,
        object_type: &str,
        reference_object: &str,
        start: u64,
        file: &ByteCountWriter<W>,
    ) -> Result<()> {
        let end = file.byte_count();
        if end <= start {
            return Err(EngineError::InvalidEntry(format!(
                "{} {} in {} ends at {} but starts at {}",
                object_type,
                make_fqn(schema, name),
                section,
                end,
                start
            )));
        }

        let entries = self.entries_mut(section);
        if let Some(previous) = entries.last() {
            if start < previous.end_byte {
                return Err(EngineError::InvalidEntry(format!(
                    "{} {} in {} starts at {}, inside the previous entry ending at {}",
                    object_type,
                    make_fqn(schema, name),
                    section,
                    start,
                    previous.end_byte
                )));
            }
        }

        entries.push(MetadataEntry {
            schema: schema.to_string(),
            name: name.to_string(),
            object_type: object_type.to_string(),
            reference_object: reference_object.to_string(),
            start_byte: start,
            end_byte: end,
        });
        Ok(())
    }

    pub fn add_global_entry<W: Write>(
        &mut self,
        schema: &str,
        name: &str,
        object_type: &str,
        start: u64,
        file: &ByteCountWriter<W>,
    ) -> Result<()> {
        self.add_metadata_entry(Section::Global, schema, name, object_type, "", start, file)
    }

    pub fn add_predata_entry<W: Write>(
        &mut self,
        schema: &str,
        name: &str,
        object_type: &str,
        reference_object: &str,
        start: u64,
        file: &ByteCountWriter<W>,
    ) -> Result<()> {
        self.add_metadata_entry(
            Section::Predata,
            schema,
            name,
            object_type,
            reference_object,
            start,
            file,
        )
    }

    pub fn add_postdata_entry<W: Write>(
        &mut self,
        schema: &str,
        name: &str,
        object_type: &str,
        reference_object: &str,
        start: u64,
        file: &ByteCountWriter<W>,
    ) -> Result<()> {
        self.add_metadata_entry(
            Section::Postdata,
            schema,
            name,
            object_type,
            reference_object,
            start,
            file,
        )
    }

    pub fn add_statistics_entry<W: Write>(
        &mut self,
        schema: &str,
        name: &str,
        object_type: &str,
        start: u64,
        file: &ByteCountWriter<W>,
    ) -> Result<()> {
        self.add_metadata_entry(Section::Statistics, schema, name, object_type, "", start, file)
    }

    pub fn add_master_data_entry(
        &mut self,
        schema: &str,
        name: &str,
        oid: u32,
        attribute_string: &str,
        rows_copied: i64,
    ) {
        self.data_entries.push(MasterDataEntry {
            schema: schema.to_string(),
            name: name.to_string(),
            oid,
            attribute_string: attribute_string.to_string(),
            rows_copied,
        });
    }

    /// Record the AO change counters of a table for later incremental diffs
    pub fn add_ao_entry(&mut self, fqn: &str, modcount: i64, last_ddl_timestamp: i64) {
        self.incremental_metadata.ao.insert(
            fqn.to_string(),
            AoEntry {
                modcount,
                last_ddl_timestamp,
            },
        );
    }
}

#[cfg(unix)]
pub(crate) fn make_read_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o444))?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn make_read_only(path: &Path) -> Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}
