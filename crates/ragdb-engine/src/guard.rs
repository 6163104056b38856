//! Per-call timeout and retry around provider calls.
//!
//! Each attempt runs under its own deadline. Transient failures (timeout,
//! unavailable, rate limited) are retried after `base_delay * 2^attempt`,
//! capped at [`MAX_BACKOFF`]; anything else is returned immediately.
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use ragdb_core::{EmbeddingProvider, GenerativeModel, Prompt, ProviderError};

pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

pub async fn call_with_retry<T, F, Fut>(what: &str, policy: &RetryPolicy, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(format!("{what} timed out after {:?}", policy.timeout))),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                attempt += 1;
                warn!(call = what, attempt, max_retries = policy.max_retries, delay_ms = delay.as_millis() as u64, error = %e, "transient provider error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct GuardedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl GuardedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl EmbeddingProvider for GuardedEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let inner = &self.inner;
        call_with_retry("embedding", &self.policy, move || inner.embed(text)).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let inner = &self.inner;
        call_with_retry("embedding batch", &self.policy, move || inner.embed_batch(texts)).await
    }
}

pub struct GuardedGenerator {
    inner: Arc<dyn GenerativeModel>,
    policy: RetryPolicy,
}

impl GuardedGenerator {
    pub fn new(inner: Arc<dyn GenerativeModel>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl GenerativeModel for GuardedGenerator {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.inner.max_input_chars()
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let inner = &self.inner;
        call_with_retry("generation", &self.policy, move || inner.generate(prompt)).await
    }
}
