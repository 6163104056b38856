use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use ragdb_core::{GenerativeModel, Prompt, ProviderError};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Completion through a local Ollama server (`POST /api/generate`, non-streaming).
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_input_chars: Option<usize>,
    model_id: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.7,
            max_input_chars: None,
            model_id: format!("ollama:{model}"),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_input_chars(mut self, max: Option<usize>) -> Self {
        self.max_input_chars = max;
        self
    }
}

#[async_trait]
impl GenerativeModel for OllamaGenerator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.max_input_chars
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt: prompt.render(),
            stream: false,
            options: GenerateOptions { temperature: self.temperature },
        };
        tracing::debug!(model = %self.model, prompt_chars = request.prompt.chars().count(), "ollama generate");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.is_timeout(), format!("Ollama generate request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::from_status(status, error_text));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse Ollama response: {e}")))?;
        Ok(body.response)
    }
}
