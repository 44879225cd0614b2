use anyhow::Result;
use serde::Serialize;

use super::print_json;
use crate::app;
use crate::config::SentinelConfig;

#[derive(Debug, Serialize)]
struct IndexStats {
    path: String,
    model: String,
    dims: usize,
    vectors: usize,
}

pub struct StatsCommand;

impl StatsCommand {
    pub async fn execute(&self, config: &SentinelConfig) -> Result<()> {
        let index = app::open_knowledge_index(config).await?;

        print_json(&IndexStats {
            path: config.index.path.display().to_string(),
            model: index.embedder().model_name().to_string(),
            dims: index.embedder().dims(),
            vectors: index.len().await?,
        })
    }
}
