//! Vector store seam and the in-memory backend.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::embedding::cosine_similarity;
use crate::types::{ConflictRecord, SimilarConflict, VectorId};

/// A record together with its embedding, keyed by the record's [`VectorId`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredConflict {
    pub id: VectorId,
    pub record: ConflictRecord,
    pub vector: Vec<f32>,
}

impl StoredConflict {
    pub fn new(record: ConflictRecord, vector: Vec<f32>) -> Self {
        Self {
            id: record.id(),
            record,
            vector,
        }
    }
}

/// Storage for conflict vectors.
///
/// Writes are atomic per identifier. A write with an existing identifier
/// replaces the stored row as a whole.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert_or_replace(&self, entry: StoredConflict) -> Result<()>;

    /// The `k` most similar entries, ranked by [`rank`].
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarConflict>>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Order matches by descending score, breaking ties by ascending identifier,
/// and keep the first `k`.
pub fn rank(matches: impl IntoIterator<Item = SimilarConflict>, k: usize) -> Vec<SimilarConflict> {
    let mut ranked: Vec<SimilarConflict> = matches.into_iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    ranked.truncate(k);
    ranked
}

/// Brute-force store for tests and runs without the `database` feature.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<BTreeMap<VectorId, StoredConflict>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert_or_replace(&self, entry: StoredConflict) -> Result<()> {
        self.entries.write().await.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarConflict>> {
        let entries = self.entries.read().await;
        // Vectors of another dimensionality cannot be compared
        let scored = entries
            .values()
            .filter(|entry| entry.vector.len() == vector.len())
            .map(|entry| SimilarConflict {
                id: entry.id.clone(),
                score: cosine_similarity(vector, &entry.vector),
                merged_at: entry.record.merged_at,
            });
        Ok(rank(scored, k))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
