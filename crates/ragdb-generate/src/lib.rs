//! Generative model adapters.

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiGenerator;
pub use ollama::OllamaGenerator;
