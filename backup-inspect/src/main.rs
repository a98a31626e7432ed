//! Backup Inspect - Main entry point
//!
//! Operator CLI over the backup engine: read TOCs and dumps, resolve the
//! incremental anchor, and print restore plans.

use anyhow::{Context, Result};
use backup_engine::history::{target_backup_timestamp, HistoryStore};
use backup_engine::restore_plan::tables_by_timestamp;
use backup_engine::toc::extract::{remove_active_role, substitute_redirect_database, StatementFilter};
use backup_engine::{utils, EngineConfig, Section, SegmentToc, Toc};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the entries of a TOC
    Entries {
        #[arg(long, value_name = "FILE")]
        toc: PathBuf,

        /// Only this section (global, predata, postdata, statistics)
        #[arg(long)]
        section: Option<Section>,
    },

    /// Print statements from a metadata dump
    Statements {
        #[arg(long, value_name = "FILE")]
        toc: PathBuf,

        #[arg(long, value_name = "FILE")]
        metadata: PathBuf,

        #[arg(long)]
        section: Section,

        #[arg(long = "include-type")]
        include_types: Vec<String>,

        #[arg(long = "exclude-type")]
        exclude_types: Vec<String>,

        #[arg(long = "include-schema")]
        include_schemas: Vec<String>,

        /// Table FQN; also selects the table's indexes, triggers and other dependents
        #[arg(long = "include-table")]
        include_tables: Vec<String>,

        /// Rename the database in database statements (needs --old-db-name)
        #[arg(long, requires = "old_db_name")]
        redirect_db: Option<String>,

        #[arg(long)]
        old_db_name: Option<String>,

        /// Drop role statements for this role
        #[arg(long)]
        active_role: Option<String>,
    },

    /// List table data entries of a TOC
    Data {
        #[arg(long, value_name = "FILE")]
        toc: PathBuf,

        #[arg(long = "include-schema")]
        include_schemas: Vec<String>,

        #[arg(long = "include-table")]
        include_tables: Vec<String>,
    },

    /// Show a segment TOC, or dump one table's rows from the segment data file
    Segment {
        #[arg(long, value_name = "FILE")]
        toc: PathBuf,

        #[arg(long)]
        oid: Option<u32>,

        #[arg(long, value_name = "FILE", requires = "oid")]
        data: Option<PathBuf>,
    },

    /// Resolve the backup an incremental run would build on
    Match {
        #[arg(long)]
        backup_dir: Option<PathBuf>,

        #[arg(long)]
        dbname: Option<String>,

        #[arg(long)]
        from_timestamp: Option<String>,
    },

    /// Print the restore plan recorded with a backup
    Plan {
        #[arg(long)]
        timestamp: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        EngineConfig::from_file(config_path)?
    } else {
        EngineConfig::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("Starting backup-inspect v{}", env!("CARGO_PKG_VERSION"));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Entries { toc, section } => {
            let toc = load_toc(&toc)?;
            let sections = match section {
                Some(section) => vec![section],
                None => Section::ALL.to_vec(),
            };
            for section in sections {
                for entry in toc.entries(section) {
                    writeln!(
                        out,
                        "{}\t{}\t{}.{}\t{}\t[{}, {})",
                        section,
                        entry.object_type,
                        entry.schema,
                        entry.name,
                        entry.reference_object,
                        entry.start_byte,
                        entry.end_byte
                    )?;
                }
            }
        }
        Command::Statements {
            toc,
            metadata,
            section,
            include_types,
            exclude_types,
            include_schemas,
            include_tables,
            redirect_db,
            old_db_name,
            active_role,
        } => {
            let toc = load_toc(&toc)?;
            let file = File::open(&metadata)
                .with_context(|| format!("Failed to open metadata file {}", metadata.display()))?;
            let filter = StatementFilter {
                include_types,
                exclude_types,
                include_schemas,
                include_tables,
            };

            let mut statements = toc.statements_for_types(section, &file, &filter)?;
            if let (Some(new_name), Some(old_name)) = (redirect_db, old_db_name) {
                statements = substitute_redirect_database(statements, &old_name, &new_name)?;
            }
            if let Some(role) = active_role {
                statements = remove_active_role(&role, statements);
            }
            tracing::info!("{} statements matched in {}", statements.len(), section);

            for statement in statements {
                writeln!(out, "{}\n", statement.statement)?;
            }
        }
        Command::Data {
            toc,
            include_schemas,
            include_tables,
        } => {
            let toc = load_toc(&toc)?;
            let entries = toc.data_entries_matching(&include_schemas, &include_tables);
            for entry in entries {
                writeln!(
                    out,
                    "{}\t{}.{}\t{}\t{} rows",
                    entry.oid, entry.schema, entry.name, entry.attribute_string, entry.rows_copied
                )?;
            }
        }
        Command::Segment { toc, oid, data } => {
            let segment_toc = SegmentToc::from_file(&toc)
                .with_context(|| format!("Failed to load segment TOC {}", toc.display()))?;
            match (oid, data) {
                (Some(oid), Some(data)) => {
                    let file = File::open(&data)
                        .with_context(|| format!("Failed to open data file {}", data.display()))?;
                    let rows = segment_toc
                        .read_data(oid, &file)?
                        .with_context(|| format!("No data for oid {} in {}", oid, toc.display()))?;
                    out.write_all(&rows)?;
                }
                (Some(oid), None) => match segment_toc.data_entry(oid) {
                    Some(entry) => writeln!(out, "{}\t[{}, {})", oid, entry.start_byte, entry.end_byte)?,
                    None => writeln!(out, "{}\tnot present", oid)?,
                },
                (None, _) => {
                    writeln!(out, "last byte read: {}", segment_toc.last_byte_read)?;
                    for (oid, entry) in &segment_toc.data_entries {
                        writeln!(out, "{}\t[{}, {})", oid, entry.start_byte, entry.end_byte)?;
                    }
                }
            }
        }
        Command::Match {
            backup_dir,
            dbname,
            from_timestamp,
        } => {
            if let Some(backup_dir) = backup_dir {
                config.backup.backup_dir = backup_dir;
            }
            if let Some(dbname) = dbname {
                config.backup.database_name = dbname;
            }
            if from_timestamp.is_some() {
                config.backup.from_timestamp = from_timestamp;
            }

            let store = HistoryStore::open(&config.history_path())?;
            let history = store.load_history()?;
            let current = config.backup.to_backup_config("");
            let anchor = target_backup_timestamp(
                &history,
                &current,
                config.backup.from_timestamp.as_deref(),
            )?;
            writeln!(out, "{}", anchor.timestamp)?;
        }
        Command::Plan { timestamp } => {
            let store = HistoryStore::open(&config.history_path())?;
            let backup = store
                .find_backup(&timestamp)?
                .with_context(|| format!("Backup {} not found in history", timestamp))?;
            let grouped = tables_by_timestamp(&backup.restore_plan);
            writeln!(out, "{}", serde_json::to_string_pretty(&grouped)?)?;
        }
    }

    Ok(())
}

fn load_toc(path: &Path) -> Result<Toc> {
    Toc::from_file(path).with_context(|| format!("Failed to load TOC {}", path.display()))
}
