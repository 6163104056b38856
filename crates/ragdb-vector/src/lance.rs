//! LanceDB-backed store. Every mutation is its own Lance commit, so `persist`
//! has nothing left to do. Rows carry a contiguous `seq` from 0, which gives
//! insertion order for ties and lets `truncate` cut by sequence.
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::database::CreateTableMode;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use ragdb_core::{Chunk, Meta, RagError, Result, SearchHit, VectorRecord, VectorStore};

use crate::flat::validate_batch;
use crate::schema::{build_chunk_schema, vector_dimension};
use crate::table::{ensure_table, open_db, open_table_if_exists, store_err};

pub const DEFAULT_TABLE: &str = "chunks";

pub struct LanceVectorStore {
    conn: Connection,
    table_name: String,
    /// Next insertion sequence; the lock also serializes writers.
    next_seq: Mutex<i64>,
    dimension: RwLock<Option<usize>>,
}

impl LanceVectorStore {
    pub async fn open(dir: &Path, table_name: &str) -> Result<Self> {
        let conn = open_db(dir.to_string_lossy().as_ref()).await?;
        let (dimension, rows) = match open_table_if_exists(&conn, table_name).await? {
            Some(table) => {
                let schema = table.schema().await.map_err(store_err)?;
                let rows = table.count_rows(None).await.map_err(store_err)?;
                (vector_dimension(&schema), rows)
            }
            None => (None, 0),
        };
        tracing::info!(dir = %dir.display(), table = table_name, rows, "opened lance store");
        Ok(Self {
            conn,
            table_name: table_name.to_string(),
            next_seq: Mutex::new(rows as i64),
            dimension: RwLock::new(dimension),
        })
    }

    fn records_to_batch(&self, records: &[VectorRecord], first_seq: i64, dimension: usize) -> Result<RecordBatch> {
        let schema = build_chunk_schema(dimension);
        let mut seqs = Vec::with_capacity(records.len());
        let mut ids = Vec::with_capacity(records.len());
        let mut doc_ids = Vec::with_capacity(records.len());
        let mut texts = Vec::with_capacity(records.len());
        let mut starts = Vec::with_capacity(records.len());
        let mut ends = Vec::with_capacity(records.len());
        let mut sequence_indices = Vec::with_capacity(records.len());
        let mut metadata = Vec::with_capacity(records.len());
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
        for (i, r) in records.iter().enumerate() {
            seqs.push(first_seq + i as i64);
            ids.push(r.chunk.id.clone());
            doc_ids.push(r.chunk.document_id.clone());
            texts.push(r.chunk.text.clone());
            starts.push(r.chunk.start_offset as i64);
            ends.push(r.chunk.end_offset as i64);
            sequence_indices.push(r.chunk.sequence_index as i64);
            metadata.push(serde_json::to_string(&r.metadata)?);
            vectors.push(Some(r.vector.iter().map(|&x| Some(x)).collect()));
        }
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(seqs)),
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(doc_ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(Int64Array::from(starts)),
                Arc::new(Int64Array::from(ends)),
                Arc::new(Int64Array::from(sequence_indices)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                    vectors.into_iter(),
                    dimension as i32,
                )),
            ],
        )
        .map_err(store_err)
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| RagError::store(format!("lancedb: column '{name}' missing or mistyped")))
}

fn hits_from_batch(batch: &RecordBatch, out: &mut Vec<(i64, SearchHit)>) -> Result<()> {
    let seq = column::<Int64Array>(batch, "seq")?;
    let id = column::<StringArray>(batch, "id")?;
    let document_id = column::<StringArray>(batch, "document_id")?;
    let text = column::<StringArray>(batch, "text")?;
    let start = column::<Int64Array>(batch, "start_offset")?;
    let end = column::<Int64Array>(batch, "end_offset")?;
    let sequence_index = column::<Int64Array>(batch, "sequence_index")?;
    let metadata = column::<StringArray>(batch, "metadata")?;
    let distance = column::<Float32Array>(batch, "_distance")?;
    for i in 0..batch.num_rows() {
        let meta: Meta = serde_json::from_str(metadata.value(i))?;
        let chunk = Chunk {
            id: id.value(i).to_string(),
            document_id: document_id.value(i).to_string(),
            text: text.value(i).to_string(),
            start_offset: start.value(i) as usize,
            end_offset: end.value(i) as usize,
            sequence_index: sequence_index.value(i) as usize,
        };
        // cosine distance is 1 - similarity
        out.push((seq.value(i), SearchHit { chunk, score: 1.0 - distance.value(i), metadata: meta }));
    }
    Ok(())
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut next_seq = self.next_seq.lock().await;
        let established = *self.dimension.read().await;
        let dimension = validate_batch(&records, established)?;
        let batch = self.records_to_batch(&records, *next_seq, dimension)?;

        let schema = batch.schema();
        let table = ensure_table(&self.conn, &self.table_name, schema.clone()).await?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        table.add(reader).execute().await.map_err(store_err)?;

        *next_seq += records.len() as i64;
        self.dimension.write().await.get_or_insert(dimension);
        tracing::debug!(added = records.len(), table = %self.table_name, "appended records");
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RagError::validation("k must be at least 1"));
        }
        if let Some(d) = *self.dimension.read().await {
            if query.len() != d {
                return Err(RagError::DimensionMismatch { expected: d, actual: query.len() });
            }
        }
        let Some(table) = open_table_if_exists(&self.conn, &self.table_name).await? else {
            return Ok(Vec::new());
        };
        if table.count_rows(None).await.map_err(store_err)? == 0 {
            return Ok(Vec::new());
        }

        // Over-fetch so equal scores at the cut can be re-ordered by seq.
        let fetch = k.saturating_mul(4).max(k + 16);
        let mut stream = table
            .vector_search(query.to_vec())
            .map_err(store_err)?
            .distance_type(DistanceType::Cosine)
            .limit(fetch)
            .execute()
            .await
            .map_err(store_err)?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(store_err)? {
            hits_from_batch(&batch, &mut hits)?;
        }
        hits.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
        Ok(hits.into_iter().take(k).map(|(_, hit)| hit).collect())
    }

    async fn len(&self) -> Result<usize> {
        match open_table_if_exists(&self.conn, &self.table_name).await? {
            Some(table) => table.count_rows(None).await.map_err(store_err),
            None => Ok(0),
        }
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(*self.dimension.read().await)
    }

    async fn persist(&self) -> Result<()> {
        Ok(())
    }

    async fn truncate(&self, len: usize) -> Result<()> {
        let mut next_seq = self.next_seq.lock().await;
        if let Some(table) = open_table_if_exists(&self.conn, &self.table_name).await? {
            table.delete(&format!("seq >= {len}")).await.map_err(store_err)?;
        }
        *next_seq = (*next_seq).min(len as i64);
        Ok(())
    }

    async fn replace(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut next_seq = self.next_seq.lock().await;
        if records.is_empty() {
            if let Some(table) = open_table_if_exists(&self.conn, &self.table_name).await? {
                table.delete("true").await.map_err(store_err)?;
            }
            *next_seq = 0;
            return Ok(());
        }
        let established = *self.dimension.read().await;
        let dimension = validate_batch(&records, established)?;
        let batch = self.records_to_batch(&records, 0, dimension)?;

        // Overwrite commits a new table version in one step.
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.conn
            .create_table(self.table_name.as_str(), reader)
            .mode(CreateTableMode::Overwrite)
            .execute()
            .await
            .map_err(store_err)?;

        *next_seq = records.len() as i64;
        self.dimension.write().await.get_or_insert(dimension);
        tracing::debug!(records = records.len(), table = %self.table_name, "replaced table contents");
        Ok(())
    }
}
