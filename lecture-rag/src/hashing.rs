//! Local feature-hashing embeddings.
//!
//! Each lowercase alphanumeric token is hashed (FNV-1a) into one of
//! `dimensions` buckets with a hash-derived sign, counts are dampened with
//! `1 + ln(tf)` and the vector is L2-normalised. The result is a bag-of-words
//! vector: lexical overlap drives cosine similarity, so shared stopwords can
//! outrank shared meaning. It needs no model files and is deterministic
//! across platforms; use it offline and in tests, not for serving.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic bag-of-words embeddings via the hashing trick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing vectors of `dimensions` components.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    /// Embed synchronously. Empty or token-free text maps to the zero vector.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut counts = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            counts[bucket] += sign;
        }

        let mut embedding: Vec<f32> = counts
            .into_iter()
            .map(|c| if c == 0.0 { 0.0 } else { c.signum() * (1.0 + c.abs().ln()) })
            .collect();

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        embedding
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        format!("hashing-bow-fnv1a-{}", self.dimensions)
    }
}
