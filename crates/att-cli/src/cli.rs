//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Attendance interval reconciliation.
///
/// Pulls the roster and card scans from a device export, reconstructs
/// entry/exit work intervals, and stores them idempotently.
#[derive(Debug, Parser)]
#[command(name = "att", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one reconciliation against the configured export.
    Run(RunArgs),

    /// Show what the store currently holds.
    Status,

    /// Replay one card's stored scans and show how each was classified.
    Trace {
        /// Card to trace.
        #[arg(long)]
        card: String,
    },

    /// List stored intervals.
    Intervals {
        /// Only show this card.
        #[arg(long)]
        card: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Overrides for a single run.
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Trailing window in months.
    #[arg(long, value_name = "MONTHS")]
    pub window: Option<u32>,

    /// Provenance tag for the intervals this run writes.
    #[arg(long)]
    pub provenance: Option<String>,

    /// Directory holding `employees.jsonl` and `events.jsonl`.
    #[arg(long)]
    pub export_dir: Option<PathBuf>,
}
