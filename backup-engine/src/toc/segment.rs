//! Per-segment table of contents.
//!
//! Maps a table oid to the byte range of its rows inside one segment's data
//! file. Lookups are by oid only; the orchestrator knows which oids to ask for.

use super::extract::{read_range, ReadAt};
use crate::utils::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDataEntry {
    pub start_byte: u64,
    pub end_byte: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentToc {
    pub last_byte_read: u64,
    #[serde(default)]
    pub data_entries: BTreeMap<u32, SegmentDataEntry>,
}

impl SegmentToc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read(path)?;
        let toc: SegmentToc = serde_json::from_slice(&contents)?;
        Ok(toc)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_vec_pretty(self)?;
        let mut file = std::fs::File::create(path)?;
        file.write_all(&contents)?;
        file.sync_all()?;
        info!(
            "Wrote segment TOC {} ({} tables)",
            path.display(),
            self.data_entries.len()
        );
        Ok(())
    }

    pub fn add_segment_data_entry(&mut self, oid: u32, start_byte: u64, end_byte: u64) {
        self.data_entries.insert(oid, SegmentDataEntry { start_byte, end_byte });
        self.last_byte_read = self.last_byte_read.max(end_byte);
    }

    pub fn data_entry(&self, oid: u32) -> Option<&SegmentDataEntry> {
        self.data_entries.get(&oid)
    }

    /// Rows of table `oid` from the segment data file, or `None` if this
    /// segment holds no data for it.
    pub fn read_data<R: ReadAt + ?Sized>(&self, oid: u32, file: &R) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.data_entry(oid) else {
            return Ok(None);
        };
        let len = file.byte_len()?;
        read_range(file, entry.start_byte, entry.end_byte, len).map(Some)
    }
}
