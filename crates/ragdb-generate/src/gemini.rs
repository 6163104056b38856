use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

use ragdb_core::{GenerativeModel, Prompt, ProviderError};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Roughly 30k tokens of prompt for gemini-pro.
const DEFAULT_MAX_INPUT_CHARS: usize = 90_000;

/// Google Gemini `generateContent` client.
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_input_chars: Option<usize>,
    model_id: String,
}

impl GeminiGenerator {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
            temperature: 0.7,
            max_input_chars: Some(DEFAULT_MAX_INPUT_CHARS),
            model_id: format!("gemini:{model}"),
            model,
        }
    }

    /// Read the API key from `key_var`.
    pub fn from_env(model: impl Into<String>, key_var: &str) -> anyhow::Result<Self> {
        let api_key = env::var(key_var).map_err(|_| anyhow::anyhow!("{key_var} not set"))?;
        if api_key.trim().is_empty() {
            anyhow::bail!("{key_var} is empty");
        }
        Ok(Self::new(model, api_key))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_input_chars(mut self, max: Option<usize>) -> Self {
        self.max_input_chars = max;
        self
    }

    fn request_for(&self, prompt: &Prompt) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content { role: Some("user".to_string()), parts: vec![Part { text: prompt.render() }] }],
            generation_config: GenerationConfig { temperature: self.temperature },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn answer_text(response: GenerateContentResponse) -> Result<String, ProviderError> {
    let Some(content) = response.candidates.into_iter().next().and_then(|c| c.content) else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(ProviderError::invalid_response(format!("Gemini returned no answer: {reason}")));
    };
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    if text.trim().is_empty() {
        return Err(ProviderError::invalid_response("Gemini returned an empty answer"));
    }
    Ok(text)
}

#[async_trait]
impl GenerativeModel for GeminiGenerator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.max_input_chars
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = self.request_for(prompt);
        tracing::debug!(model = %self.model, context_chars = prompt.context_chars(), "gemini generate");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.is_timeout(), format!("Gemini API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::from_status(status, error_text));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse Gemini response: {e}")))?;
        let answer = answer_text(body)?;
        tracing::debug!(model = %self.model, answer_chars = answer.chars().count(), "gemini answered");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::ProviderErrorKind;

    #[test]
    fn request_body_matches_the_api_shape() {
        let generator = GeminiGenerator::new("gemini-pro", "k").with_temperature(0.2);
        let prompt = Prompt::new("Why is the sky blue?", vec!["Rayleigh scattering.".to_string()]);
        let body = serde_json::to_value(generator.request_for(&prompt)).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("Rayleigh scattering."));
        assert!(text.contains("Why is the sky blue?"));
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn parts_are_concatenated() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Blue "},{"text":"light scatters."}]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(answer_text(parsed).unwrap(), "Blue light scatters.");
    }

    #[test]
    fn blocked_prompt_is_an_invalid_response() {
        let raw = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let err = answer_text(parsed).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidResponse);
        assert!(err.message.contains("SAFETY"));
    }
}
