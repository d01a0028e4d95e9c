use crate::bm25::tokenize;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use simstore_core::{SimstoreError, SimstoreResult, Vector};
use std::collections::BTreeMap;

/// Trait for computing text embeddings (vector representations).
///
/// The engine treats implementations as opaque and never retries a failed
/// call; retry policy belongs to the implementation.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute the embedding vector for a single text.
    async fn embed(&self, text: &str) -> SimstoreResult<Vector>;

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Local embedding built by signed feature hashing; no external model.
///
/// Every distinct term is hashed with SHA-256 into two buckets, each with a
/// sign taken from the digest, and weighted by `1 + ln(tf)`. The result is
/// L2-normalized, so texts sharing vocabulary have positive cosine
/// similarity while unrelated terms cancel out on average.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// Create an embedder producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Add one term's contribution to `vector`.
    fn accumulate(&self, vector: &mut [f32], term: &str, weight: f32) {
        let digest = Sha256::digest(term.as_bytes());
        for (slot, scale) in [(0usize, 1.0f32), (8, 0.5)] {
            let mut word = [0u8; 8];
            word.copy_from_slice(&digest[slot..slot + 8]);
            let bits = u64::from_le_bytes(word);
            let bucket = (bits >> 1) as usize % self.dimension;
            let sign = if bits & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * scale * weight;
        }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> SimstoreResult<Vector> {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for term in tokenize(text) {
            *counts.entry(term).or_default() += 1;
        }
        if counts.is_empty() {
            return Err(SimstoreError::EmbeddingFailed(
                "text has no indexable terms".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (term, count) in &counts {
            self.accumulate(&mut vector, term, 1.0 + (*count as f32).ln());
        }

        // Collisions can cancel every component out.
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(SimstoreError::EmbeddingFailed(
                "terms hashed to a zero vector".to_string(),
            ));
        }
        for v in &mut vector {
            *v /= norm;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
