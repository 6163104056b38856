//! Builds providers and the store from configuration.
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use ragdb_core::config::{EmbeddingBackend, EmbeddingKind, GenerationBackend, GenerationKind};
use ragdb_core::{EmbeddingProvider, GenerativeModel, Prompt, ProviderError, ProviderErrorKind, RagConfig, VectorStore};
use ragdb_embed::{HashEmbedder, LocalEmbedder, OllamaEmbedder};
use ragdb_generate::{GeminiGenerator, OllamaGenerator};
use ragdb_vector::FlatVectorStore;

use crate::cli::StoreKind;

pub fn build_embedder(rag: &RagConfig, backend: &EmbeddingBackend) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match backend.kind {
        EmbeddingKind::Hash => Arc::new(HashEmbedder::new(backend.dimension)),
        EmbeddingKind::Local => {
            let dir = LocalEmbedder::resolve_model_dir(backend.model_dir.as_deref(), &rag.embedding_model)?;
            Arc::new(LocalEmbedder::load(&dir, &rag.embedding_model)?)
        }
        EmbeddingKind::Ollama => {
            let mut e = OllamaEmbedder::new(rag.embedding_model.as_str());
            if let Some(url) = &backend.base_url {
                e = e.with_base_url(url.as_str());
            }
            Arc::new(e)
        }
    };
    Ok(embedder)
}

pub fn build_generator(rag: &RagConfig, backend: &GenerationBackend) -> Result<Arc<dyn GenerativeModel>> {
    let generator: Arc<dyn GenerativeModel> = match backend.kind {
        GenerationKind::Gemini => {
            let mut g = GeminiGenerator::from_env(rag.generative_model.as_str(), &backend.api_key_env)?
                .with_temperature(rag.generation_temperature);
            if let Some(url) = &backend.base_url {
                g = g.with_base_url(url.as_str());
            }
            if backend.max_input_chars.is_some() {
                g = g.with_max_input_chars(backend.max_input_chars);
            }
            Arc::new(g)
        }
        GenerationKind::Ollama => {
            let mut g = OllamaGenerator::new(rag.generative_model.as_str())
                .with_temperature(rag.generation_temperature)
                .with_max_input_chars(backend.max_input_chars);
            if let Some(url) = &backend.base_url {
                g = g.with_base_url(url.as_str());
            }
            Arc::new(g)
        }
    };
    Ok(generator)
}

/// Stand-in for commands that never generate (ingest, status, clear), so a
/// missing API key does not block them.
pub struct UnconfiguredGenerator {
    model_id: String,
    reason: String,
}

impl UnconfiguredGenerator {
    pub fn new(model_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { model_id: model_id.into(), reason: reason.into() }
    }
}

#[async_trait]
impl GenerativeModel for UnconfiguredGenerator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<String, ProviderError> {
        Err(ProviderError::new(ProviderErrorKind::Authentication, self.reason.clone()))
    }
}

pub fn build_generator_or_placeholder(rag: &RagConfig, backend: &GenerationBackend) -> Arc<dyn GenerativeModel> {
    match build_generator(rag, backend) {
        Ok(g) => g,
        Err(e) => {
            tracing::debug!(error = %e, "generator unavailable; continuing without it");
            Arc::new(UnconfiguredGenerator::new(rag.generative_model.as_str(), e.to_string()))
        }
    }
}

pub async fn open_store(kind: StoreKind, rag: &RagConfig) -> Result<Arc<dyn VectorStore>> {
    let dir = rag.persist_path();
    match kind {
        StoreKind::Flat => {
            let store = FlatVectorStore::open(&dir).with_context(|| format!("opening store at {}", dir.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "lance")]
        StoreKind::Lance => {
            std::fs::create_dir_all(&dir)?;
            let store = ragdb_vector::LanceVectorStore::open(&dir, ragdb_vector::lance::DEFAULT_TABLE).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "lance"))]
        StoreKind::Lance => anyhow::bail!("this build has no LanceDB support; rebuild with --features lance"),
    }
}
