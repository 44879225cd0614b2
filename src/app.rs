//! Wiring of production components from a loaded configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SentinelConfig;
use crate::git::{Git2MergeEngine, LocalMergeProber};
use crate::github::GitHubClient;
use crate::knowledge::{
    ConflictKnowledgeIndex, ConflictLookup, Embedder, HashingEmbedder, KnowledgeIngestor,
    UnavailableIndex, VectorStore,
};
use crate::pipeline::{ConflictEventPipeline, PipelineSettings};
use crate::resolver::MergeabilityResolver;
use crate::retry::{RetryPolicy, TokioClock};

pub fn github_client(config: &SentinelConfig) -> Result<Arc<GitHubClient>> {
    let client = GitHubClient::new(&config.github).context("Failed to create GitHub client")?;
    Ok(Arc::new(client))
}

pub fn merge_prober(config: &SentinelConfig) -> LocalMergeProber {
    let engine = Git2MergeEngine::with_token(config.github.token.clone());
    LocalMergeProber::new(
        Arc::new(engine),
        Duration::from_secs(config.prober.timeout_secs),
    )
}

/// Open the knowledge index at `index.path`, or in memory without the
/// `database` feature.
pub async fn open_knowledge_index(config: &SentinelConfig) -> Result<Arc<ConflictKnowledgeIndex>> {
    let embedder = HashingEmbedder::new(config.index.dims).context("Failed to build tokenizer")?;
    let store = open_store(config, embedder.model_name()).await?;

    Ok(Arc::new(ConflictKnowledgeIndex::new(
        Arc::new(embedder),
        store,
        config.index.top_k,
        config.index.max_k,
    )))
}

#[cfg(feature = "database")]
async fn open_store(config: &SentinelConfig, model: &str) -> Result<Arc<dyn VectorStore>> {
    let store = crate::knowledge::SqliteVectorStore::open(&config.index.path, model).await?;
    info!(path = %config.index.path.display(), "Opened conflict index");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn open_store(_config: &SentinelConfig, _model: &str) -> Result<Arc<dyn VectorStore>> {
    tracing::warn!("Built without the database feature; conflict index is in memory only");
    Ok(Arc::new(crate::knowledge::InMemoryVectorStore::new()))
}

/// The pipeline still answers mergeability when the index cannot be opened;
/// matches are then replaced by per-file warnings.
pub async fn build_pipeline(config: &SentinelConfig) -> Result<ConflictEventPipeline> {
    let client = github_client(config)?;
    let lookup: Arc<dyn ConflictLookup> = match open_knowledge_index(config).await {
        Ok(index) => index,
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(
                path = %config.index.path.display(),
                error = %reason,
                "Conflict index unavailable; reporting conflicts without history"
            );
            Arc::new(UnavailableIndex::new(reason))
        }
    };

    let resolver = MergeabilityResolver::new(
        client.clone(),
        RetryPolicy::from_config(&config.resolver),
        Arc::new(TokioClock),
    );

    info!(repository = %config.repository_ref().key, "Conflict pipeline ready");

    Ok(ConflictEventPipeline::new(
        Arc::new(resolver),
        Arc::new(merge_prober(config)),
        lookup,
        client,
        config.repository_ref(),
        PipelineSettings::from_config(config),
    ))
}

pub async fn build_ingestor(
    config: &SentinelConfig,
    max_pull_requests: Option<usize>,
) -> Result<(KnowledgeIngestor, Arc<ConflictKnowledgeIndex>)> {
    let client = github_client(config)?;
    let index = open_knowledge_index(config).await?;
    let ingestor = KnowledgeIngestor::new(
        client,
        index.clone(),
        config.ingestion.page_size,
        max_pull_requests.unwrap_or(config.ingestion.max_pull_requests),
    );
    Ok((ingestor, index))
}
