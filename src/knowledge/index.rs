use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::embedding::Embedder;
use super::store::{StoredConflict, VectorStore};
use crate::error::SentinelError;
use crate::types::{ConflictRecord, SimilarConflict, VectorId};

/// Read side of the knowledge index, as seen by the pipeline.
#[async_trait]
pub trait ConflictLookup: Send + Sync {
    async fn similar_conflicts(
        &self,
        text: &str,
        k: Option<usize>,
    ) -> Result<Vec<SimilarConflict>, SentinelError>;
}

/// Embeds historical conflict records and answers nearest-neighbor queries.
pub struct ConflictKnowledgeIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    default_k: usize,
    max_k: usize,
}

impl ConflictKnowledgeIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        default_k: usize,
        max_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            default_k: default_k.min(max_k),
            max_k,
        }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Embed and store one record, replacing any earlier record with the same
    /// pull request and path.
    pub async fn ingest(&self, record: ConflictRecord) -> Result<VectorId, SentinelError> {
        let vector = self.embedder.embed(&record.embedding_text());
        let entry = StoredConflict::new(record, vector);
        let id = entry.id.clone();

        self.store
            .insert_or_replace(entry)
            .await
            .map_err(|e| SentinelError::index(format!("failed to store {id}: {e:#}")))?;

        debug!(%id, "Ingested conflict record");
        Ok(id)
    }

    /// Up to `k` (default `top_k`, at most `max_k`) records most similar to
    /// `text`.
    pub async fn query(
        &self,
        text: &str,
        k: Option<usize>,
    ) -> Result<Vec<SimilarConflict>, SentinelError> {
        let k = k.unwrap_or(self.default_k).min(self.max_k);
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(text);
        self.store
            .query(&vector, k)
            .await
            .map_err(|e| SentinelError::index(format!("{e:#}")))
    }

    pub async fn len(&self) -> Result<usize, SentinelError> {
        self.store
            .len()
            .await
            .map_err(|e| SentinelError::index(format!("{e:#}")))
    }

    pub async fn is_empty(&self) -> Result<bool, SentinelError> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl ConflictLookup for ConflictKnowledgeIndex {
    async fn similar_conflicts(
        &self,
        text: &str,
        k: Option<usize>,
    ) -> Result<Vec<SimilarConflict>, SentinelError> {
        self.query(text, k).await
    }
}

/// Lookup for an index that could not be opened. Every query fails, which
/// the pipeline records as a per-file warning.
pub struct UnavailableIndex {
    reason: String,
}

impl UnavailableIndex {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ConflictLookup for UnavailableIndex {
    async fn similar_conflicts(
        &self,
        _text: &str,
        _k: Option<usize>,
    ) -> Result<Vec<SimilarConflict>, SentinelError> {
        Err(SentinelError::index(self.reason.clone()))
    }
}
