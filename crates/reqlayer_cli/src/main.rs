//! Reference allocation smoke CLI.
//!
//! # Usage
//!
//! ```bash
//! # Create three epics and print their reference ids
//! reqlayer --db ./requirements.sqlite3 --family EP --count 3
//!
//! # Log allocation events to a directory
//! reqlayer --db ./requirements.sqlite3 --family REQ --log-dir /tmp/reqlayer-logs
//! ```

use clap::Parser;
use reqlayer_core::db::open_db_with;
use reqlayer_core::{
    core_version, default_log_level, init_logging, Allocator, FamilyRegistry, RecordRepository,
    ReferenceRecord, SqliteRecordRepository, StoreConfig,
};

/// Allocate reference ids against a requirements store
#[derive(Parser, Debug)]
#[command(name = "reqlayer")]
#[command(about = "Create reference-tagged records and print their ids")]
#[command(version)]
struct Args {
    /// Path to the SQLite store (created and migrated when missing)
    #[arg(long)]
    db: String,

    /// Family prefix (EP, US, REQ, AC, STD, PROMPT)
    #[arg(short, long)]
    family: String,

    /// Number of records to create
    #[arg(short, long, default_value = "1")]
    count: u32,

    /// Title stored on each created record
    #[arg(short, long, default_value = "untitled")]
    title: String,

    /// Cooperative lock budget in milliseconds
    #[arg(long, default_value = "100")]
    lock_budget_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long)]
    log_dir: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(log_dir) = args.log_dir.as_deref() {
        let level = args.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }
    log::info!(
        "event=cli_start module=cli status=ok version={}",
        core_version()
    );

    let family = FamilyRegistry::global().resolve(&args.family)?.tag;
    let config = StoreConfig {
        lock_budget_ms: args.lock_budget_ms,
        ..StoreConfig::default()
    };

    let conn = open_db_with(&args.db, &config)?;
    let allocator = Allocator::from_probe(&conn, &config)?;
    let repo = SqliteRecordRepository::try_new(&conn, &allocator)?;

    for _ in 0..args.count {
        let mut record = ReferenceRecord::new(family, args.title.as_str());
        let reference_id = repo.create_record(&mut record)?;
        println!("{reference_id}\t{}", record.uuid);
    }

    Ok(())
}
