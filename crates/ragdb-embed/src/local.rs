//! Sentence-transformer embeddings computed in-process with candle.
//!
//! The model directory holds `config.json`, `tokenizer.json` and either
//! `model.safetensors` or `pytorch_model.bin` (e.g. a local copy of
//! `sentence-transformers/all-MiniLM-L6-v2`). Vectors are the masked mean of
//! the last hidden states, L2-normalized.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use ragdb_core::{EmbeddingProvider, ProviderError};

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

/// Word pieces beyond this are dropped; MiniLM-style models are trained on 256.
const MAX_TOKENS: usize = 256;

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
}

pub struct LocalEmbedder {
    inner: Arc<LoadedModel>,
    model_id: String,
}

impl LocalEmbedder {
    pub fn load(model_dir: &Path, model_name: &str) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), model = model_name, "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.get_padding().map(|p| p.pad_id).unwrap_or(0);

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw).with_context(|| format!("parsing {}", config_path.display()))?;

        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config).context("building BERT model from weights")?;
        tracing::info!(model = model_name, "embedding model loaded");

        Ok(Self {
            inner: Arc::new(LoadedModel { model, tokenizer, device, pad_id }),
            model_id: format!("local:{model_name}"),
        })
    }

    /// `configured` if set, otherwise `APP_MODEL_DIR`, otherwise
    /// `models/<model_name>`.
    pub fn resolve_model_dir(configured: Option<&str>, model_name: &str) -> Result<PathBuf> {
        if let Some(dir) = configured {
            return existing(ragdb_core::config::expand_path(dir));
        }
        if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
            let p = PathBuf::from(dir);
            if p.exists() {
                return Ok(p);
            }
        }
        existing(Path::new("models").join(model_name))
    }
}

fn existing(p: PathBuf) -> Result<PathBuf> {
    if p.exists() {
        Ok(p)
    } else {
        Err(anyhow!("Could not locate embedding model directory {}", p.display()))
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the file is mapped read-only and not modified while the model lives.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? };
        return Ok(vb);
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&weights_path)
        .with_context(|| format!("reading weights from {}", weights_path.display()))?;
    let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

impl LoadedModel {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, MAX_TOKENS, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        if start.elapsed().as_millis() > 500 {
            tracing::debug!(batch = texts.len(), ms = start.elapsed().as_millis() as u64, "slow embedding batch");
        }
        Ok(out)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| ProviderError::invalid_response("model returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || inner.embed_batch(&texts))
            .await
            .map_err(|e| ProviderError::unavailable(format!("embedding worker failed: {e}")))?
            .map_err(|e| ProviderError::invalid_response(format!("local inference failed: {e:#}")))
    }
}
