//! Embedding providers: a deterministic feature-hashing embedder, a local
//! sentence-transformer running on candle, and an Ollama HTTP client.

pub mod device;
pub mod hash;
pub mod local;
pub mod ollama;
pub mod pool;
pub mod tokenize;

pub use device::select_device;
pub use hash::HashEmbedder;
pub use local::LocalEmbedder;
pub use ollama::OllamaEmbedder;
pub use pool::masked_mean_l2;

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
