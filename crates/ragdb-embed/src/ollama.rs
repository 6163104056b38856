use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use ragdb_core::{EmbeddingProvider, ProviderError};

use crate::l2_normalize;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Embeddings from a running Ollama server (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    model_id: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: format!("ollama:{model}"),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| ProviderError::invalid_response("Ollama returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest { model: &self.model, input: texts };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.is_timeout(), format!("Ollama embed request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::from_status(status, error_text));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse Ollama response: {e}")))?;
        if body.embeddings.len() != texts.len() {
            return Err(ProviderError::invalid_response(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }

        Ok(body
            .embeddings
            .into_iter()
            .map(|mut v| {
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}
