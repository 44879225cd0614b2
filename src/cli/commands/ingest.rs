use anyhow::Result;
use tracing::info;

use super::print_json;
use crate::app;
use crate::config::SentinelConfig;

pub struct IngestCommand {
    pub max_pull_requests: Option<usize>,
}

impl IngestCommand {
    pub async fn execute(&self, config: &SentinelConfig) -> Result<()> {
        let (ingestor, index) = app::build_ingestor(config, self.max_pull_requests).await?;
        let summary = ingestor.run().await;
        info!(vectors = index.len().await?, "Conflict index updated");

        print_json(&summary)
    }
}
