//! Memtrace Studio CLI
//!
//! Ingests recorded memory-access traces and answers call stack queries.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use memtrace_studio::commands::{
    display_regions, display_version, execute_inspect, execute_stack, InspectArgs, StackArgs,
    TraceOptions,
};

/// Memtrace Studio - memory-access trace explorer
#[derive(Parser, Debug)]
#[command(name = "memtrace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a trace and summarize chunks, pages and regions
    Inspect {
        /// Trace file to read
        trace: PathBuf,

        /// Output path for the JSON summary
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: TraceOptions,
    },

    /// Print the call stack enclosing a record
    Stack {
        /// Trace file to read
        trace: PathBuf,

        /// Global record position
        #[arg(long = "at")]
        position: u64,

        #[command(flatten)]
        options: TraceOptions,
    },

    /// Print the region table from the trace header
    Regions {
        /// Trace file to read
        trace: PathBuf,

        #[command(flatten)]
        options: TraceOptions,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Inspect {
            trace,
            output,
            options,
        } => {
            execute_inspect(InspectArgs {
                trace,
                output,
                options,
            })?;
        }

        Commands::Stack {
            trace,
            position,
            options,
        } => {
            execute_stack(StackArgs {
                trace,
                position,
                options,
            })?;
        }

        Commands::Regions { trace, options } => {
            display_regions(&trace, &options)?;
        }

        Commands::Version => display_version(),
    }

    Ok(())
}
