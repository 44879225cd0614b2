use anyhow::Result;
use clap::Parser;

use merge_sentinel::cli::commands::{
    ConfigCommand, HandleEventCommand, IngestCommand, ProbeCommand, SearchCommand, StatsCommand,
};
use merge_sentinel::cli::{Cli, Commands};
use merge_sentinel::config::SentinelConfig;
use merge_sentinel::github::GitHubError;
use merge_sentinel::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let result = run(cli);

    if let Err(e) = &result {
        if let Some(github_error) = e.downcast_ref::<GitHubError>() {
            eprintln!("hint: {}", github_error.hint());
        }
    }
    result
}

fn run(cli: Cli) -> Result<()> {
    SentinelConfig::load_env_file()?;
    let config = SentinelConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;

    match cli.command {
        Commands::Config => ConfigCommand.execute(&config),
        Commands::HandleEvent { payload } => tokio::runtime::Runtime::new()?
            .block_on(async { HandleEventCommand::new(payload).execute(&config).await }),
        Commands::Ingest { max_prs } => tokio::runtime::Runtime::new()?.block_on(async {
            IngestCommand {
                max_pull_requests: max_prs,
            }
            .execute(&config)
            .await
        }),
        Commands::Search { text, k } => tokio::runtime::Runtime::new()?
            .block_on(async { SearchCommand { text, k }.execute(&config).await }),
        Commands::Probe { base, head, pr } => tokio::runtime::Runtime::new()?.block_on(async {
            ProbeCommand {
                base,
                head,
                pull_request_id: pr,
            }
            .execute(&config)
            .await
        }),
        Commands::Stats => {
            tokio::runtime::Runtime::new()?.block_on(async { StatsCommand.execute(&config).await })
        }
    }
}
