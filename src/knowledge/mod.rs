//! Conflict knowledge index
//!
//! Historical conflicting diffs are embedded into a fixed-dimension vector
//! space and served back as ranked nearest neighbors.

pub mod embedding;
pub mod index;
pub mod ingestion;
#[cfg(feature = "database")]
pub mod sqlite;
pub mod store;

pub use embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder, HashingEmbedder};
pub use index::{ConflictKnowledgeIndex, ConflictLookup, UnavailableIndex};
pub use ingestion::{IngestionSummary, KnowledgeIngestor};
#[cfg(feature = "database")]
pub use sqlite::SqliteVectorStore;
pub use store::{rank, InMemoryVectorStore, StoredConflict, VectorStore};
