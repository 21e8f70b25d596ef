//! rootstore CLI
//!
//! Command-line tools for looking into a rootstore directory.
//!
//! # Commands
//!
//! - `inspect` - Display store metadata and contents
//! - `verify` - Replay the commit log and check its integrity
//! - `dump-wal` - Dump commit log records for debugging
//! - `get` - Print one root

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// rootstore command-line tools.
#[derive(Parser)]
#[command(name = "rootstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store metadata and contents
    Inspect {
        /// List roots with their values
        #[arg(short, long)]
        roots: bool,

        /// List classes with their methods
        #[arg(short, long)]
        classes: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay the commit log and check its integrity
    Verify,

    /// Dump commit log records for debugging
    DumpWal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Decode Put payloads
        #[arg(long)]
        payloads: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the committed value of one root
    Get {
        /// Root key, with or without the leading colon
        key: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect {
            roots,
            classes,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, roots, classes, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::DumpWal {
            limit,
            offset,
            payloads,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for dump-wal")?;
            commands::dump_wal::run(&path, limit, offset, payloads, &format)?;
        }
        Commands::Get { key, format } => {
            let path = cli.path.ok_or("Store path required for get")?;
            commands::get::run(&path, &key, &format)?;
        }
        Commands::Version => {
            println!("rootstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("rootstore core v{}", rootstore_core::VERSION);
        }
    }

    Ok(())
}
