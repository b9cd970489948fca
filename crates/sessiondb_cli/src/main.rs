//! sessiondb CLI
//!
//! Command-line tools for inspecting and maintaining file-backed session
//! stores.
//!
//! # Commands
//!
//! - `inspect` - Display manifest, stream time, segments and position
//! - `dump` - Print stored sessions in key order
//! - `compact` - Rewrite the store log as a snapshot

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::dump::DumpOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// sessiondb command-line store tools.
#[derive(Parser)]
#[command(name = "sessiondb")]
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

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store metadata, segments and position
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Print stored sessions
    Dump {
        /// Smallest key to print
        #[arg(long)]
        key_from: Option<String>,

        /// Largest key to print
        #[arg(long)]
        key_to: Option<String>,

        /// Print in descending key order
        #[arg(short, long)]
        reverse: bool,

        /// Maximum number of sessions to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Rewrite the store log as a snapshot of its live keys
    Compact,

    /// Show version information
    Version,
}

fn main() -> ExitCode {
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

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, matches!(format, Format::Json))?;
        }
        Commands::Dump {
            key_from,
            key_to,
            reverse,
            limit,
        } => {
            let path = cli.path.ok_or("Store path required for dump")?;
            let options = DumpOptions {
                key_from,
                key_to,
                reverse,
                limit,
            };
            commands::dump::run(&path, &options)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("sessiondb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("sessiondb core v{}", sessiondb_core::VERSION);
        }
    }
    Ok(())
}
