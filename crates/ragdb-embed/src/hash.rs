use async_trait::async_trait;
use std::hash::Hasher;
use twox_hash::XxHash64;

use ragdb_core::{EmbeddingProvider, ProviderError};

use crate::l2_normalize;

/// Bag-of-words feature hashing. Each lowercased alphanumeric token adds 1.0
/// to bucket `xxh64(token) % dimension`; the result is L2-normalized.
///
/// Needs no model files, so it backs tests and offline smoke runs. Texts that
/// share words land close together, which is enough for lexical retrieval.
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self { dimension, model_id: format!("hash:d{dimension}") }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        let lowered = text.to_lowercase();
        let mut any = false;
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            v[self.bucket(token)] += 1.0;
            any = true;
        }
        if !any {
            // punctuation-only input still gets a unit vector
            v[self.bucket(lowered.trim())] = 1.0;
        }
        l2_normalize(&mut v);
        v
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(token.as_bytes());
        (hasher.finish() % self.dimension as u64) as usize
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_sync(text))
    }
}
