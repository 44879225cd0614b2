use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "merge-sentinel")]
#[command(about = "Merge conflict detection with a searchable history of past conflicts")]
#[command(long_about = "Merge Sentinel checks pull requests for merge conflicts, confirms them with a \
                       local three-way merge, and matches each conflicting file against similar \
                       conflicts from the repository's merged history. Run 'merge-sentinel ingest' \
                       to build the history index.")]
pub struct Cli {
    /// Configuration file (defaults to merge-sentinel.toml when present)
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze one pull_request webhook payload and print the outcome as JSON
    HandleEvent {
        /// Webhook payload file, or '-' for stdin
        #[arg(long, default_value = "-", help = "Path to the webhook JSON payload ('-' reads stdin)")]
        payload: String,
    },
    /// Load merged pull requests into the conflict knowledge index
    Ingest {
        /// Stop after this many merged pull requests
        #[arg(long, help = "Maximum number of merged pull requests to ingest")]
        max_prs: Option<usize>,
    },
    /// Search the knowledge index for conflicts similar to some diff text
    Search {
        /// Query text, e.g. "File: src/lib.rs\nDiff: ..."
        text: String,
        /// Number of matches to return
        #[arg(short = 'k', long, help = "Number of matches (defaults to index.top_k)")]
        k: Option<usize>,
    },
    /// Run a local merge probe of one branch into another
    Probe {
        /// Base branch to merge into
        #[arg(long, help = "Base branch, e.g. main")]
        base: String,
        /// Head branch to merge
        #[arg(long, help = "Head branch of the pull request")]
        head: String,
        /// Pull request number recorded in the conflict set
        #[arg(long, default_value = "0", help = "Pull request number for the report")]
        pr: u64,
    },
    /// Show knowledge index statistics
    Stats,
    /// Print the effective configuration with secrets redacted
    Config,
}
