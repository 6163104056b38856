//! Core data model, error taxonomy, capability traits, chunking and
//! configuration shared by every `ragdb-*` crate.

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use chunker::{chunk, ChunkingConfig, DocumentChunker};
pub use config::{ContextStrategy, RagConfig};
pub use error::{ErrorClass, ProviderError, ProviderErrorKind, RagError, Result};
pub use traits::{EmbeddingProvider, GenerativeModel, VectorStore};
pub use types::{Chunk, Document, Meta, Prompt, QueryResult, SearchHit, VectorRecord};
