use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use ragdb_core::{
    Chunk, Document, DocumentChunker, EmbeddingProvider, GenerativeModel, ProviderError, QueryResult, RagConfig,
    RagError, Result, VectorRecord, VectorStore,
};

use crate::compose::{composer_for, ContextComposer};
use crate::guard::{GuardedEmbedder, GuardedGenerator, RetryPolicy};

/// Chunks per `embed_batch` call during ingest.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Index lifecycle. `Ready` means the store holds at least one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub records: usize,
    pub dimension: Option<usize>,
    pub embedding_model: String,
    pub generative_model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub total_records: usize,
}

/// Retrieval-augmented question answering over one vector store.
///
/// Ingests are serialized by `ingest_lock`; embedding happens before the lock
/// is taken so a slow provider never blocks other writers. Queries never touch
/// the lock and never mutate the store.
pub struct RagEngine {
    config: RagConfig,
    chunker: DocumentChunker,
    embedder: GuardedEmbedder,
    generator: GuardedGenerator,
    store: Arc<dyn VectorStore>,
    composer: Box<dyn ContextComposer>,
    ingest_lock: Mutex<()>,
    state: RwLock<EngineState>,
}

impl RagEngine {
    /// Validate `config` and wire the providers. The initial state follows the
    /// store: a store loaded from a snapshot with records starts `Ready`.
    pub async fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerativeModel>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = DocumentChunker::new(config.chunking())?;
        let embed_policy = RetryPolicy {
            timeout: config.embed_timeout(),
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
        };
        let generate_policy = RetryPolicy { timeout: config.generate_timeout(), ..embed_policy };
        let state = if store.is_empty().await? { EngineState::Uninitialized } else { EngineState::Ready };
        info!(?state, embedder = embedder.model_id(), generator = generator.model_id(), "engine ready");

        Ok(Self {
            composer: composer_for(config.context_strategy, config.context_budget),
            embedder: GuardedEmbedder::new(embedder, embed_policy),
            generator: GuardedGenerator::new(generator, generate_policy),
            chunker,
            store,
            config,
            ingest_lock: Mutex::new(()),
            state: RwLock::new(state),
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        Ok(EngineStatus {
            state: self.state().await,
            records: self.store.len().await?,
            dimension: self.store.dimension().await?,
            embedding_model: self.embedder.model_id().to_string(),
            generative_model: self.generator.model_id().to_string(),
        })
    }

    /// Chunk, embed and append `documents`, then persist. Existing records are
    /// kept.
    pub async fn ingest(&self, documents: Vec<Document>) -> Result<IngestReport> {
        let (records, report) = self.prepare(&documents).await?;
        let _guard = self.ingest_lock.lock().await;
        self.commit(records, report).await
    }

    /// Ingest raw strings; each becomes a document with a content-derived id.
    pub async fn ingest_texts(&self, texts: Vec<String>) -> Result<IngestReport> {
        self.ingest(texts.into_iter().map(Document::new).collect()).await
    }

    /// Replace the whole index with `documents`. The current index stays as it
    /// is unless the new documents chunk, embed and store successfully.
    pub async fn rebuild(&self, documents: Vec<Document>) -> Result<IngestReport> {
        let (records, mut report) = self.prepare(&documents).await?;
        let _guard = self.ingest_lock.lock().await;
        self.store.replace(records).await?;
        report.total_records = self.store.len().await?;
        *self.state.write().await =
            if report.total_records > 0 { EngineState::Ready } else { EngineState::Uninitialized };
        info!(chunks = report.chunks, total = report.total_records, "index rebuilt");
        Ok(report)
    }

    /// Drop every record, durably where the store persists.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.ingest_lock.lock().await;
        self.store.clear().await?;
        *self.state.write().await = EngineState::Uninitialized;
        info!("index cleared");
        Ok(())
    }

    pub async fn query(&self, question: &str) -> Result<QueryResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::validation("question must not be blank"));
        }
        if self.state().await == EngineState::Uninitialized {
            return Err(RagError::NotInitialized);
        }

        let query_vector = self.embedder.embed(question).await.map_err(RagError::Embedding)?;
        let hits = self.store.search(&query_vector, self.config.top_k).await?;
        debug!(hits = hits.len(), top_k = self.config.top_k, "retrieved passages");

        let composition = self
            .composer
            .compose(question, &hits, &self.generator)
            .await
            .map_err(RagError::Generation)?;
        info!(sources = composition.used.len(), "answered query");
        Ok(QueryResult {
            answer: composition.answer,
            sources: composition.used.into_iter().map(|h| h.chunk).collect(),
        })
    }

    /// [`query`](Self::query) that gives up with [`RagError::Cancelled`] as
    /// soon as `cancel` completes.
    pub async fn query_until<F>(&self, question: &str, cancel: F) -> Result<QueryResult>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.query(question) => result,
            _ = cancel => {
                info!("query cancelled");
                Err(RagError::Cancelled)
            }
        }
    }

    async fn prepare(&self, documents: &[Document]) -> Result<(Vec<VectorRecord>, IngestReport)> {
        if documents.is_empty() {
            return Err(RagError::validation("at least one document is required"));
        }
        if let Some(i) = documents.iter().position(|d| d.text.trim().is_empty()) {
            return Err(RagError::validation(format!("document {i} ({}) has blank text", documents[i].id)));
        }

        let chunks: Vec<(Chunk, &Document)> = documents
            .iter()
            .flat_map(|doc| self.chunker.chunk_document(doc).into_iter().map(move |c| (c, doc)))
            .collect();
        info!(documents = documents.len(), chunks = chunks.len(), "ingesting");

        let batches: Vec<Vec<String>> = chunks
            .chunks(EMBED_BATCH_SIZE)
            .map(|batch| batch.iter().map(|(chunk, _)| chunk.text.clone()).collect())
            .collect();
        // Collected first: a borrowing closure held by the stream would make
        // the ingest future non-Send.
        let pending: Vec<_> = batches.iter().map(|texts| self.embedder.embed_batch(texts)).collect();
        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(pending)
            .buffered(self.config.embed_concurrency)
            .try_collect()
            .await
            .map_err(RagError::Embedding)?;
        let vectors: Vec<Vec<f32>> = embedded.into_iter().flatten().collect();
        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(ProviderError::invalid_response(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            ))));
        }

        let report = IngestReport { documents: documents.len(), chunks: chunks.len(), total_records: 0 };
        let records = chunks
            .into_iter()
            .zip(vectors)
            .map(|((chunk, doc), vector)| VectorRecord { chunk, vector, metadata: doc.metadata.clone() })
            .collect();
        Ok((records, report))
    }

    /// Append and persist; a failed persist takes the append back out. Caller
    /// holds `ingest_lock`.
    async fn commit(&self, records: Vec<VectorRecord>, mut report: IngestReport) -> Result<IngestReport> {
        let before = self.store.len().await?;
        self.store.add(records).await?;
        if let Err(e) = self.store.persist().await {
            warn!(error = %e, kept = before, "persist failed, rolling back append");
            if let Err(undo) = self.store.truncate(before).await {
                error!(error = %undo, "rollback failed; in-memory index is ahead of disk");
            }
            return Err(e);
        }
        report.total_records = self.store.len().await?;
        if report.total_records > 0 {
            *self.state.write().await = EngineState::Ready;
        }
        info!(chunks = report.chunks, total = report.total_records, "ingest committed");
        Ok(report)
    }
}
