//! Domain types shared by the chunker, the vector stores and the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DocumentId = String;
pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;

/// A source document as handed to ingestion.
///
/// - `id`: stable document identity; derived from the text when not supplied
/// - `text`: the raw payload that gets chunked
/// - `metadata`: free-form labels copied onto every record of the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub text: String,
    #[serde(default)]
    pub metadata: Meta,
}

impl Document {
    /// Build a document whose id is the first 16 hex chars of the blake3 hash
    /// of its text, so ingesting the same text twice yields the same id.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let id = content_id(&text);
        Self { id, text, metadata: Meta::new() }
    }

    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Meta::new() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub fn content_id(text: &str) -> String {
    let hex = blake3::hash(text.as_bytes()).to_hex();
    hex.as_str()[..16].to_string()
}

/// A bounded slice of a document, the unit of retrieval.
///
/// Offsets count characters (not bytes) into the parent document text and
/// `end_offset` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub sequence_index: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// An embedded chunk as stored in a vector store. The record's chunk id is
/// `chunk.id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Meta,
}

impl VectorRecord {
    pub fn chunk_id(&self) -> &str {
        &self.chunk.id
    }
}

/// One ranked search result. `score` is cosine similarity; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
    pub metadata: Meta,
}

/// Answer to one question together with the chunks that were put in front of
/// the generative model, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<Chunk>,
}

/// What a generative model is asked to do in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub question: String,
    pub context: Vec<String>,
    /// Running answer being refined, if any.
    pub previous_answer: Option<String>,
}

impl Prompt {
    pub fn new(question: impl Into<String>, context: Vec<String>) -> Self {
        Self { question: question.into(), context, previous_answer: None }
    }

    pub fn refining(mut self, previous_answer: impl Into<String>) -> Self {
        self.previous_answer = Some(previous_answer.into());
        self
    }

    pub fn context_chars(&self) -> usize {
        self.context.iter().map(|c| c.chars().count()).sum()
    }

    /// Render into a single instruction string for text-in/text-out models.
    pub fn render(&self) -> String {
        let context = self.context.join("\n\n");
        match &self.previous_answer {
            None => format!(
                "Use the following pieces of context to answer the question at the end. \
                 If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
                 {context}\n\nQuestion: {}\nHelpful Answer:",
                self.question
            ),
            Some(existing) => format!(
                "The original question is as follows: {}\n\
                 We have provided an existing answer: {existing}\n\
                 We have the opportunity to refine the existing answer (only if needed) with some more context below.\n\
                 ------------\n{context}\n------------\n\
                 Given the new context, refine the original answer to better answer the question. \
                 If the context isn't useful, return the original answer.",
                self.question
            ),
        }
    }
}
