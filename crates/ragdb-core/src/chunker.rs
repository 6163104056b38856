//! Character-window chunking with exact overlap.
//!
//! A chunk starting at `s` ends at the last paragraph break inside its window,
//! else the last sentence end, else the last whitespace, else a hard cut at
//! `s + chunk_size`. The window's lower edge is `s + max(overlap + 1,
//! chunk_size / 2)` so every step makes progress and no sliver chunks appear.
//! The next chunk starts exactly `overlap` characters before the previous end.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::types::{Chunk, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, overlap: 200 }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { chunk_size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Whitespace,
}

const BOUNDARY_PRIORITY: [Boundary; 3] = [Boundary::Paragraph, Boundary::Sentence, Boundary::Whitespace];

#[derive(Debug, Clone, Default)]
pub struct DocumentChunker {
    config: ChunkingConfig,
}

impl DocumentChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = doc.text.chars().collect();
        split_spans(&chars, self.config.chunk_size, self.config.overlap)
            .into_iter()
            .enumerate()
            .map(|(sequence_index, (start, end))| Chunk {
                id: format!("{}:{}", doc.id, sequence_index),
                document_id: doc.id.clone(),
                text: chars[start..end].iter().collect(),
                start_offset: start,
                end_offset: end,
                sequence_index,
            })
            .collect()
    }
}

/// Chunk raw text. The document id is derived from the text (see
/// [`Document::new`]).
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = DocumentChunker::new(ChunkingConfig::new(chunk_size, overlap)?)?;
    Ok(chunker.chunk_document(&Document::new(text)))
}

fn split_spans(chars: &[char], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let len = chars.len();
    let mut spans = Vec::new();
    let mut start = 0;
    while start < len {
        if len - start <= chunk_size {
            spans.push((start, len));
            break;
        }
        let end = find_split(chars, start, chunk_size, overlap);
        spans.push((start, end));
        start = end - overlap;
    }
    spans
}

fn find_split(chars: &[char], start: usize, chunk_size: usize, overlap: usize) -> usize {
    let hard = start + chunk_size;
    let lo = start + (overlap + 1).max(chunk_size / 2);
    for kind in BOUNDARY_PRIORITY {
        if let Some(end) = (lo..=hard).rev().find(|&end| ends_at(chars, end, kind)) {
            return end;
        }
    }
    hard
}

/// Whether a chunk ending just before index `end` ends on a `kind` boundary.
fn ends_at(chars: &[char], end: usize, kind: Boundary) -> bool {
    if end == 0 || end > chars.len() {
        return false;
    }
    let last = chars[end - 1];
    match kind {
        Boundary::Paragraph => end >= 2 && last == '\n' && chars[end - 2] == '\n',
        Boundary::Sentence => end >= 2 && last.is_whitespace() && matches!(chars[end - 2], '.' | '!' | '?'),
        Boundary::Whitespace => last.is_whitespace(),
    }
}
