//! Retrieval-augmented query engine: ingest (chunk, embed, store) and query
//! (embed, search, compose, generate) over the `ragdb-core` capability traits.

pub mod compose;
pub mod engine;
pub mod guard;

pub use compose::{composer_for, Composition, ContextComposer, RefineComposer, StuffComposer};
pub use engine::{EngineState, EngineStatus, IngestReport, RagEngine, EMBED_BATCH_SIZE};
pub use guard::{GuardedEmbedder, GuardedGenerator, RetryPolicy};
