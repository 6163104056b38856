use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

use ragdb_core::{RagError, Result, SearchHit, VectorRecord, VectorStore};

use crate::snapshot;

#[derive(Default)]
struct Inner {
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
    norms: Vec<f32>,
}

/// Brute-force cosine search over an in-memory record list, optionally backed
/// by a JSON snapshot directory.
///
/// `writer` serializes every mutation and every snapshot write; `inner` is only
/// write-locked for the final swap or append, so searches keep running while a
/// batch is validated or a snapshot is written.
pub struct FlatVectorStore {
    dir: Option<PathBuf>,
    writer: Mutex<()>,
    inner: RwLock<Inner>,
}

impl FlatVectorStore {
    pub fn new_in_memory() -> Self {
        Self { dir: None, writer: Mutex::new(()), inner: RwLock::new(Inner::default()) }
    }

    /// Store persisted under `dir`, loading the existing snapshot if there is one.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let inner = match snapshot::read(&dir)? {
            Some(snap) => {
                tracing::info!(dir = %dir.display(), records = snap.records.len(), saved_at = %snap.saved_at, "loaded vector snapshot");
                let norms = snap.records.iter().map(|r| l2(&r.vector)).collect();
                Inner { dimension: snap.dimension, records: snap.records, norms }
            }
            None => Inner::default(),
        };
        Ok(Self { dir: Some(dir), writer: Mutex::new(()), inner: RwLock::new(inner) })
    }

    /// Like [`open`](Self::open) but the snapshot must already exist.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !snapshot::snapshot_path(&dir).exists() {
            return Err(RagError::store(format!("no snapshot in {}", dir.display())));
        }
        Self::open(dir)
    }

    /// Write `dimension` and `records` as the snapshot. No-op without a location.
    async fn write_snapshot(&self, dimension: Option<usize>, records: &[VectorRecord]) -> Result<()> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        let bytes = snapshot::encode(dimension, records)?;
        tokio::task::spawn_blocking(move || snapshot::write_atomic(&dir, &bytes))
            .await
            .map_err(|e| RagError::store(format!("snapshot writer failed: {e}")))?
    }
}

fn l2(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, v: &[f32], v_norm: f32) -> f32 {
    let denom = query_norm * v_norm;
    if denom == 0.0 {
        return 0.0;
    }
    query.iter().zip(v).map(|(a, b)| a * b).sum::<f32>() / denom
}

/// Dimension every record of the batch must have; fails on the first bad one.
pub(crate) fn validate_batch(records: &[VectorRecord], established: Option<usize>) -> Result<usize> {
    let expected = match (established, records.first()) {
        (Some(d), _) => d,
        (None, Some(first)) => first.vector.len(),
        (None, None) => 0,
    };
    for r in records {
        if r.vector.is_empty() {
            return Err(RagError::validation(format!("record {} has an empty vector", r.chunk_id())));
        }
        if r.vector.len() != expected {
            return Err(RagError::DimensionMismatch { expected, actual: r.vector.len() });
        }
        if r.vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::validation(format!("record {} has non-finite values", r.chunk_id())));
        }
    }
    Ok(expected)
}

#[async_trait]
impl VectorStore for FlatVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _writer = self.writer.lock().await;
        let established = self.inner.read().await.dimension;
        let dimension = validate_batch(&records, established)?;
        let norms: Vec<f32> = records.iter().map(|r| l2(&r.vector)).collect();

        let mut inner = self.inner.write().await;
        inner.dimension.get_or_insert(dimension);
        let added = records.len();
        inner.records.extend(records);
        inner.norms.extend(norms);
        tracing::debug!(added, total = inner.records.len(), dimension, "appended records");
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RagError::validation("k must be at least 1"));
        }
        let inner = self.inner.read().await;
        if let Some(d) = inner.dimension {
            if query.len() != d {
                return Err(RagError::DimensionMismatch { expected: d, actual: query.len() });
            }
        }
        if inner.records.is_empty() {
            return Ok(Vec::new());
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(RagError::validation("query vector has non-finite values"));
        }

        let qn = l2(query);
        let mut scored: Vec<(usize, f32)> = inner
            .records
            .iter()
            .zip(&inner.norms)
            .enumerate()
            .map(|(i, (r, &n))| (i, cosine(query, qn, &r.vector, n)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let r = &inner.records[i];
                SearchHit { chunk: r.chunk.clone(), score, metadata: r.metadata.clone() }
            })
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.inner.read().await.records.len())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.inner.read().await.dimension)
    }

    async fn persist(&self) -> Result<()> {
        if self.dir.is_none() {
            return Ok(());
        }
        let _writer = self.writer.lock().await;
        let inner = self.inner.read().await;
        self.write_snapshot(inner.dimension, &inner.records).await?;
        tracing::debug!(records = inner.records.len(), "snapshot persisted");
        Ok(())
    }

    async fn truncate(&self, len: usize) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut inner = self.inner.write().await;
        let dropped = inner.records.len().saturating_sub(len);
        inner.records.truncate(len);
        inner.norms.truncate(len);
        tracing::debug!(dropped, total = inner.records.len(), "truncated records");
        Ok(())
    }

    async fn replace(&self, records: Vec<VectorRecord>) -> Result<()> {
        let _writer = self.writer.lock().await;
        let established = self.inner.read().await.dimension;
        let dimension = if records.is_empty() { established } else { Some(validate_batch(&records, established)?) };
        let norms: Vec<f32> = records.iter().map(|r| l2(&r.vector)).collect();
        self.write_snapshot(dimension, &records).await?;

        let mut inner = self.inner.write().await;
        tracing::debug!(previous = inner.records.len(), records = records.len(), "replaced contents");
        *inner = Inner { dimension, records, norms };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::Chunk;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk: Chunk {
                id: id.to_string(),
                document_id: "d".to_string(),
                text: id.to_string(),
                start_offset: 0,
                end_offset: id.chars().count(),
                sequence_index: 0,
            },
            vector,
            metadata: Default::default(),
        }
    }

    #[test]
    fn first_batch_must_agree_on_dimension() {
        let batch = vec![record("a", vec![1.0, 0.0]), record("b", vec![1.0, 0.0, 0.0])];
        assert!(matches!(validate_batch(&batch, None), Err(RagError::DimensionMismatch { expected: 2, actual: 3 })));
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine(&[1.0, 0.0], 1.0, &[0.0, 0.0], 0.0), 0.0);
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let store = FlatVectorStore::new_in_memory();
        store
            .add(vec![record("first", vec![1.0, 0.0]), record("second", vec![2.0, 0.0]), record("third", vec![0.0, 1.0])])
            .await
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }
}
