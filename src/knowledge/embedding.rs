//! Embedding function and vector helpers.
//!
//! [`HashingEmbedder`] maps text into a fixed number of buckets by hashing
//! token unigrams and bigrams. It needs no model download, is deterministic
//! across processes, and puts diffs that touch the same identifiers close
//! together under cosine similarity.

use regex::Regex;
use sha2::{Digest, Sha256};

/// Trait for embedding backends.
pub trait Embedder: Send + Sync {
    /// Identifier recorded alongside stored vectors
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// Deterministic: equal text always yields an equal vector.
    fn embed(&self, text: &str) -> Vec<f32>;
}

const BIGRAM_WEIGHT: f32 = 0.5;

pub struct HashingEmbedder {
    dims: usize,
    model_name: String,
    tokenizer: Regex,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Result<Self, regex::Error> {
        let dims = dims.max(1);
        // Identifiers, numbers, runs of punctuation
        let tokenizer = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*|[0-9]+|[^\sA-Za-z0-9_]+")?;
        Ok(Self {
            dims,
            model_name: format!("feature-hash-sha256-{dims}"),
            tokenizer,
        })
    }

    fn tokens(&self, text: &str) -> Vec<String> {
        self.tokenizer
            .find_iter(text)
            .map(|token| token.as_str().to_lowercase())
            .collect()
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        let tokens = self.tokens(text);

        for token in &tokens {
            self.add_feature(&mut vector, &format!("u:{token}"), 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("b:{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        normalize(&mut vector);
        vector
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing bytes short of a full
/// `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, zero or
/// mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
