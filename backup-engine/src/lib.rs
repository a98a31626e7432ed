//! Backup Engine Library
//!
//! Table-of-contents indexing over dump streams, incremental change detection
//! between backups, and restore-plan maintenance across a backup chain.

pub mod config;
pub mod filter;
pub mod history;
pub mod incremental;
pub mod paths;
pub mod restore_plan;
pub mod session;
pub mod toc;
pub mod utils;

// Re-export commonly used types
pub use config::{BackupOptions, EngineConfig};
pub use history::{BackupConfig, History, HistoryStore, RestorePlanEntry};
pub use incremental::Table;
pub use toc::{Section, SegmentToc, Toc};
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
