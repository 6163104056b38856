//! Configuration value objects and the layered loader.
//!
//! The engine only ever sees a validated [`RagConfig`]. [`Config::load`] merges
//! `config.toml` + `config.<env>.toml` + `APP_*` env vars (with `__` as the
//! nesting separator, e.g. `APP_RAG__TOP_K=8`) and hands out typed sections.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::chunker::ChunkingConfig;
use crate::error::RagError;

/// How retrieved passages are turned into generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextStrategy {
    /// Every passage in one prompt, lowest-ranked dropped first when over budget.
    #[default]
    Stuff,
    /// One call per passage, each refining the previous answer.
    Refine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub embedding_model: String,
    pub generative_model: String,
    pub generation_temperature: f32,
    pub persist_directory: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub context_strategy: ContextStrategy,
    /// Max context characters per generation call.
    pub context_budget: usize,
    pub embed_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub embed_concurrency: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            generative_model: "gemini-pro".to_string(),
            generation_temperature: 0.7,
            persist_directory: "./chroma_db".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            context_strategy: ContextStrategy::Stuff,
            context_budget: 12_000,
            embed_timeout_secs: 30,
            generate_timeout_secs: 120,
            max_retries: 2,
            retry_base_delay_ms: 500,
            embed_concurrency: 8,
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking().validate()?;
        let invalid = |msg: &str| -> Result<(), RagError> { Err(RagError::InvalidConfig(msg.to_string())) };
        if self.embedding_model.trim().is_empty() {
            return invalid("embedding_model must not be empty");
        }
        if self.generative_model.trim().is_empty() {
            return invalid("generative_model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.generation_temperature) {
            return invalid("generation_temperature must be within [0, 2]");
        }
        if self.persist_directory.trim().is_empty() {
            return invalid("persist_directory must not be empty");
        }
        if self.top_k == 0 {
            return invalid("top_k must be at least 1");
        }
        if self.context_budget == 0 {
            return invalid("context_budget must be positive");
        }
        if self.embed_timeout_secs == 0 || self.generate_timeout_secs == 0 {
            return invalid("provider timeouts must be positive");
        }
        if self.embed_concurrency == 0 {
            return invalid("embed_concurrency must be at least 1");
        }
        Ok(())
    }

    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig { chunk_size: self.chunk_size, overlap: self.chunk_overlap }
    }

    pub fn persist_path(&self) -> PathBuf {
        expand_path(&self.persist_directory)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingKind {
    /// Deterministic feature hashing; no model needed.
    Hash,
    /// Sentence-transformer weights on local disk.
    #[default]
    Local,
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingBackend {
    pub kind: EmbeddingKind,
    pub base_url: Option<String>,
    /// Model directory for `local`; defaults to `models/<embedding_model>`.
    pub model_dir: Option<String>,
    /// Output dimension for `hash`.
    pub dimension: usize,
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        Self { kind: EmbeddingKind::Local, base_url: None, model_dir: None, dimension: 384 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    #[default]
    Gemini,
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationBackend {
    pub kind: GenerationKind,
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_input_chars: Option<usize>,
}

impl Default for GenerationBackend {
    fn default() -> Self {
        Self { kind: GenerationKind::Gemini, base_url: None, api_key_env: "GEMINI_API_KEY".to_string(), max_input_chars: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub embedding: EmbeddingBackend,
    pub generation: GenerationBackend,
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        tracing::debug!(env = %env_name, "configuration sources merged");

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `rag` section, defaulted where absent and validated.
    pub fn rag(&self) -> anyhow::Result<RagConfig> {
        let rag: RagConfig = self.section("rag")?;
        rag.validate()?;
        Ok(rag)
    }

    pub fn providers(&self) -> anyhow::Result<ProvidersConfig> {
        self.section("providers")
    }

    fn section<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.figment.find_value(key).is_err() {
            return Ok(T::default());
        }
        self.get(key)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
