//! Error types for the backup engine.
//!
//! Every variant here is fatal for the invocation that raised it. Filters that
//! match nothing are not errors; they return empty collections.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("History database error: {0}")]
    History(#[from] rusqlite::Error),

    #[error("There was no matching previous backup found with the flags provided. Please take a full backup.")]
    NoMatchingBackup,

    #[error("Backup with timestamp {0} not found in backup history")]
    BackupNotFound(String),

    #[error("Backup with timestamp {0} did not complete successfully and cannot be used as an incremental base")]
    FailedBackup(String),

    #[error("The flags of the backup with timestamp = {0} do not match those of the current one. Please refer to the report to view the flags supplied for the previous backup.")]
    IncrementalFlagsMismatch(String),

    #[error("Invalid timestamp {0}: expected 14 digits in YYYYMMDDHHMMSS form")]
    InvalidTimestamp(String),

    #[error("Byte range [{start}, {end}) exceeds file length {len}")]
    OutOfRange { start: u64, end: u64, len: u64 },

    #[error("Invalid TOC entry: {0}")]
    InvalidEntry(String),

    #[error("Statement for {0} is not valid UTF-8")]
    InvalidStatement(String),

    #[error("Unknown section: {0}")]
    UnknownSection(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
