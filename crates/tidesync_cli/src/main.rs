//! Tidesync CLI
//!
//! Command-line tools for inspecting a file-backed tidesync cache.
//!
//! # Commands
//!
//! - `inspect` - Display a dataset's summary and sync state
//! - `pending` - List a dataset's pending changes
//! - `clear` - Delete a dataset's cached snapshot
//! - `hash` - Compute the canonical hash of a JSON value

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tidesync command-line cache tools.
#[derive(Parser)]
#[command(name = "tidesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display a dataset's summary and sync state
    Inspect {
        /// Dataset id
        dataset: String,

        /// List every record uid and hash
        #[arg(short, long)]
        records: bool,
    },

    /// List a dataset's pending changes
    Pending {
        /// Dataset id
        dataset: String,

        /// Only show changes awaiting an answer
        #[arg(short, long)]
        in_flight: bool,
    },

    /// Delete a dataset's cached snapshot
    Clear {
        /// Dataset id
        dataset: String,

        /// Dry run - show what would be deleted
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Compute the canonical hash of a JSON value
    Hash {
        /// JSON text to hash
        json: String,

        /// Also print the canonical form
        #[arg(short, long)]
        canonical: bool,
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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { dataset, records } => {
            let path = cli.path.ok_or("Cache path required for inspect")?;
            commands::inspect::run(&path, &dataset, records, &cli.format)?;
        }
        Commands::Pending { dataset, in_flight } => {
            let path = cli.path.ok_or("Cache path required for pending")?;
            commands::pending::run(&path, &dataset, in_flight, &cli.format)?;
        }
        Commands::Clear { dataset, dry_run } => {
            let path = cli.path.ok_or("Cache path required for clear")?;
            commands::clear::run(&path, &dataset, dry_run)?;
        }
        Commands::Hash { json, canonical } => {
            commands::hash::run(&json, canonical, &cli.format)?;
        }
        Commands::Version => {
            println!("Tidesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
