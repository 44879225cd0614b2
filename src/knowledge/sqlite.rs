use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

use super::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use super::store::{rank, StoredConflict, VectorStore};
use crate::types::{SimilarConflict, VectorId};

/// SQLite-backed vector store
///
/// Vectors are stored as little-endian `f32` blobs. Similarity is computed in
/// process over every row, which is fine for one repository's merge history.
/// Rows embedded by a different model or dimensionality are never scored or
/// counted; re-ingesting replaces them.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    model: String,
}

impl SqliteVectorStore {
    /// Open (creating if needed) the database file and apply migrations
    pub async fn open(path: &Path, model: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let database_url = format!("sqlite://{}", path.display());
        if !sqlx::Sqlite::database_exists(&database_url).await? {
            info!("Creating conflict index at {}", path.display());
            sqlx::Sqlite::create_database(&database_url).await?;
        }

        let pool = SqlitePool::connect(&database_url)
            .await
            .with_context(|| format!("Failed to open conflict index at {}", path.display()))?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let model = model.into();
        let row = sqlx::query("SELECT COUNT(*) AS count FROM conflict_vectors WHERE model != ?1")
            .bind(&model)
            .fetch_one(&pool)
            .await?;
        let stale: i64 = row.get("count");
        if stale > 0 {
            warn!(
                stale,
                %model,
                "Conflict index holds vectors from another embedding model; re-run ingest to replace them"
            );
        }

        Ok(Self { pool, model })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_or_replace(&self, entry: StoredConflict) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO conflict_vectors
                (pull_request_id, file_path, diff_patch_text, merged_at, model, dims, embedding, ingested_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
            "#,
        )
        .bind(entry.id.pull_request_id as i64)
        .bind(&entry.id.file_path)
        .bind(&entry.record.diff_patch_text)
        .bind(entry.record.merged_at.to_rfc3339())
        .bind(&self.model)
        .bind(entry.vector.len() as i64)
        .bind(vec_to_blob(&entry.vector))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarConflict>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT pull_request_id, file_path, merged_at, embedding
            FROM conflict_vectors
            WHERE model = ?1 AND dims = ?2
            "#,
        )
        .bind(&self.model)
        .bind(vector.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let pull_request_id: i64 = row.get("pull_request_id");
            let file_path: String = row.get("file_path");
            let merged_at: String = row.get("merged_at");
            let embedding: Vec<u8> = row.get("embedding");

            let merged_at = DateTime::parse_from_rfc3339(&merged_at)
                .with_context(|| format!("Invalid merged_at for pr-{pull_request_id}/{file_path}"))?
                .with_timezone(&Utc);

            scored.push(SimilarConflict {
                id: VectorId::new(pull_request_id as u64, file_path),
                score: cosine_similarity(vector, &blob_to_vec(&embedding)),
                merged_at,
            });
        }

        Ok(rank(scored, k))
    }

    async fn len(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM conflict_vectors WHERE model = ?1")
            .bind(&self.model)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConflictRecord;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry(pr: u64, path: &str, patch: &str, vector: Vec<f32>) -> StoredConflict {
        StoredConflict::new(
            ConflictRecord {
                source_pull_request_id: pr,
                file_path: path.to_string(),
                diff_patch_text: patch.to_string(),
                merged_at: Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap(),
            },
            vector,
        )
    }

    #[tokio::test]
    async fn test_replace_keeps_one_row() {
        let dir = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(&dir.path().join("index.db"), "test")
            .await
            .unwrap();

        store
            .insert_or_replace(entry(3, "src/main.rs", "old", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert_or_replace(entry(3, "src/main.rs", "new", vec![0.0, 1.0]))
            .await
            .unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        let patch: String = sqlx::query("SELECT diff_patch_text FROM conflict_vectors")
            .fetch_one(store.pool())
            .await
            .unwrap()
            .get("diff_patch_text");
        assert_eq!(patch, "new");
    }

    #[tokio::test]
    async fn test_query_reads_back_merge_time() {
        let dir = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(&dir.path().join("nested/index.db"), "test")
            .await
            .unwrap();
        store
            .insert_or_replace(entry(5, "a.rs", "p", vec![0.6, 0.8]))
            .await
            .unwrap();

        let results = store.query(&[0.6, 0.8], 3).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, VectorId::new(5, "a.rs"));
        assert_eq!(
            results[0].merged_at,
            Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap()
        );
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_rows_from_another_model_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");

        let old = SqliteVectorStore::open(&path, "feature-hash-sha256-2").await.unwrap();
        old.insert_or_replace(entry(5, "a.rs", "p", vec![0.6, 0.8]))
            .await
            .unwrap();
        old.close().await;

        let resized = SqliteVectorStore::open(&path, "feature-hash-sha256-3").await.unwrap();
        assert!(resized.query(&[0.6, 0.8, 0.0], 3).await.unwrap().is_empty());
        assert_eq!(resized.len().await.unwrap(), 0);

        // Re-ingesting under the new model replaces the stale row
        resized
            .insert_or_replace(entry(5, "a.rs", "p", vec![0.0, 0.6, 0.8]))
            .await
            .unwrap();
        let results = resized.query(&[0.0, 0.6, 0.8], 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 1e-5);
        let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM conflict_vectors")
            .fetch_one(resized.pool())
            .await
            .unwrap()
            .get("count");
        assert_eq!(total, 1);
    }
}
