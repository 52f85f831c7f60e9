//! TQDB CLI
//!
//! Offline tools for TQDB database files.
//!
//! # Commands
//!
//! - `inspect` - Display main-file and WAL header metadata
//! - `verify` - Verify the main file's integrity CRC and per-entry WAL CRCs
//! - `dump-wal` - Print staged WAL entries for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TQDB command-line database tools.
#[derive(Parser)]
#[command(name = "tqdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
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
    /// Display main-file and WAL header metadata
    Inspect,

    /// Verify the main file's integrity CRC and per-entry WAL CRCs
    Verify {
        /// Only check the WAL
        #[arg(short, long)]
        wal: bool,
    },

    /// Print staged WAL entries for debugging
    DumpWal {
        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect => {
            let path = cli.path.ok_or("database path required for inspect")?;
            commands::inspect::run(&path)?;
        }
        Commands::Verify { wal } => {
            let path = cli.path.ok_or("database path required for verify")?;
            commands::verify::run(&path, wal)?;
        }
        Commands::DumpWal { limit } => {
            let path = cli.path.ok_or("database path required for dump-wal")?;
            commands::dump_wal::run(&path, limit)?;
        }
        Commands::Version => {
            println!("tqdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("tqdb core v{}", tqdb_core::VERSION);
        }
    }

    Ok(())
}
