use anyhow::Result;
use serde::Serialize;

pub mod config;
pub mod handle_event;
pub mod ingest;
pub mod probe;
pub mod search;
pub mod stats;

pub use config::ConfigCommand;
pub use handle_event::HandleEventCommand;
pub use ingest::IngestCommand;
pub use probe::ProbeCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;

/// Write a command result to stdout as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
