use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::types::{Prompt, SearchHit, VectorRecord};

/// Text to fixed-dimension vector.
///
/// Implementations return L2-normalized vectors of the same dimensionality for
/// a given `model_id`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:d384`).
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// (question, context passages) to answer text.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Upper bound on prompt characters the model accepts, if it has one.
    fn max_input_chars(&self) -> Option<usize> {
        None
    }

    async fn generate(&self, prompt: &Prompt) -> std::result::Result<String, ProviderError>;
}

/// Logical contract of a vector index.
///
/// Adds are serialized by the implementation; searches may run concurrently
/// with each other. `persist` runs under the same exclusivity as `add`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append a batch. All-or-nothing: either every record is stored or none.
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Up to `k` hits by descending cosine similarity, earlier insertions
    /// first on ties.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Established vector dimension, `None` until the first add.
    async fn dimension(&self) -> Result<Option<usize>>;

    /// Write the full contents to durable storage, if the store has a location.
    async fn persist(&self) -> Result<()>;

    /// Keep only the first `len` records in insertion order. Undoes an `add`
    /// whose `persist` failed; the established dimension is kept.
    async fn truncate(&self, len: usize) -> Result<()>;

    /// Swap the whole contents for `records` in one step. The batch is
    /// checked against the established dimension before anything is dropped,
    /// and a store with a location makes the new contents durable before they
    /// become visible. On error the previous contents are untouched.
    async fn replace(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Drop every record, durably where the store persists. The established
    /// dimension is kept.
    async fn clear(&self) -> Result<()> {
        self.replace(Vec::new()).await
    }
}
