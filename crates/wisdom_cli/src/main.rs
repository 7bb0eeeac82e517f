//! Wisdom CLI
//!
//! Command-line tools for a Wisdom knowledge base.
//!
//! # Commands
//!
//! - `init` - Prepare directories, create the library and apply migrations
//! - `write` - Write a document through the mutation pipeline
//! - `delete` - Delete a document, leaving a tombstone
//! - `link` - Replace a document's backlinks
//! - `show` - Display a document, its links and its history
//! - `dump-log` - Dump change-log events after a cursor
//! - `verify` - Audit the change log against the live tables
//! - `status` - Readiness diagnostics
//! - `mirror-sync` - Sync a local client mirror through the sync protocol

mod commands;
mod config;
mod error;
mod startup;

use clap::{Parser, Subcommand};
use commands::mirror_sync::MirrorSyncArgs;
use commands::write::WriteArgs;
use config::{Overrides, WisdomConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Wisdom knowledge-base tools.
#[derive(Parser)]
#[command(name = "wisdom")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory (overrides WISDOM_DATA_DIR)
    #[arg(global = true, long)]
    data_dir: Option<PathBuf>,

    /// Database file (overrides WISDOM_DB_PATH)
    #[arg(global = true, long)]
    db: Option<PathBuf>,

    /// Content root (overrides WISDOM_CONTENT_ROOT)
    #[arg(global = true, long)]
    content_root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare directories, create the library and apply migrations
    Init,

    /// Write a document
    Write {
        /// Library-relative path
        path: String,

        /// Owning adapter
        #[arg(short, long, default_value = "markdown")]
        adapter: String,

        /// Inline content
        #[arg(short, long, conflicts_with = "file")]
        content: Option<String>,

        /// Read content from this file instead of the content root
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Mark the document as imported
        #[arg(long)]
        import: bool,

        /// Mark the document as a shadow representation
        #[arg(long)]
        shadow: bool,

        /// Metadata as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Delete a document by path or id
    Delete {
        /// Path or id
        document: String,
    },

    /// Replace a document's backlinks (no targets clears them)
    Link {
        /// Source path or id
        source: String,

        /// Target paths or ids
        targets: Vec<String>,
    },

    /// Display a document
    Show {
        /// Path or id
        document: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump change-log events
    DumpLog {
        /// Only events after this seq
        #[arg(short, long, default_value = "0")]
        cursor: i64,

        /// Maximum number of events to dump
        #[arg(short, long)]
        limit: Option<u32>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Audit the change log
    Verify,

    /// Show readiness diagnostics
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Sync a local client mirror
    MirrorSync {
        /// Mirror database (default: <data>/mirror.db)
        #[arg(short, long)]
        mirror: Option<PathBuf>,

        /// Client id reported to the server
        #[arg(long, default_value = "wisdom-cli")]
        client_id: String,

        /// Events per pull (overrides WISDOM_PULL_BATCH)
        #[arg(short, long)]
        batch: Option<u32>,

        /// Rebuild the mirror from cursor 0
        #[arg(long)]
        reset: bool,

        /// List mirrored documents afterwards
        #[arg(short, long)]
        list: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("Wisdom CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("Wisdom Core v{}", wisdom_core::VERSION);
        println!("Sync protocol v{}", wisdom_sync_protocol::PROTOCOL_VERSION);
        return Ok(());
    }

    let overrides = Overrides {
        data_dir: cli.data_dir,
        db_path: cli.db,
        content_root: cli.content_root,
    };
    let config = WisdomConfig::from_env(&overrides)?;
    tracing::debug!(db = %config.db_path.display(), "configuration loaded");

    match cli.command {
        Commands::Init => commands::init::run(&config)?,
        Commands::Write {
            path,
            adapter,
            content,
            file,
            import,
            shadow,
            metadata,
        } => commands::write::run(
            &config,
            WriteArgs {
                relative_path: path,
                adapter,
                content,
                file,
                import,
                shadow,
                metadata,
            },
        )?,
        Commands::Delete { document } => commands::delete::run(&config, &document)?,
        Commands::Link { source, targets } => commands::link::run(&config, &source, &targets)?,
        Commands::Show { document, format } => commands::show::run(&config, &document, &format)?,
        Commands::DumpLog {
            cursor,
            limit,
            format,
        } => commands::dump_log::run(&config, cursor, limit, &format)?,
        Commands::Verify => commands::verify::run(&config)?,
        Commands::Status { format } => commands::status::run(&config, &format)?,
        Commands::MirrorSync {
            mirror,
            client_id,
            batch,
            reset,
            list,
        } => commands::mirror_sync::run(
            &config,
            MirrorSyncArgs {
                mirror,
                client_id,
                batch,
                reset,
                list,
            },
        )?,
        Commands::Version => {}
    }

    Ok(())
}
