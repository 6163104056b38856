use std::sync::Arc;
use tempfile::TempDir;

use ragdb_core::{Chunk, RagError, VectorRecord, VectorStore};
use ragdb_vector::{FlatVectorStore, SNAPSHOT_FILE};

fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
    VectorRecord {
        chunk: Chunk {
            id: id.to_string(),
            document_id: format!("doc-{id}"),
            text: format!("text of {id}"),
            start_offset: 0,
            end_offset: 10,
            sequence_index: 0,
        },
        vector,
        metadata: [("source".to_string(), format!("{id}.txt"))].into_iter().collect(),
    }
}

fn seed() -> Vec<VectorRecord> {
    vec![
        record("north", vec![0.0, 1.0, 0.0]),
        record("east", vec![1.0, 0.0, 0.0]),
        record("north-east", vec![0.7, 0.7, 0.0]),
        record("up", vec![0.0, 0.0, 1.0]),
    ]
}

fn ids(hits: &[ragdb_core::SearchHit]) -> Vec<String> {
    hits.iter().map(|h| h.chunk.id.clone()).collect()
}

#[tokio::test]
async fn search_ranks_by_cosine_and_respects_k() {
    let store = FlatVectorStore::new_in_memory();
    store.add(seed()).await.unwrap();

    let hits = store.search(&[1.0, 0.1, 0.0], 2).await.unwrap();
    assert_eq!(ids(&hits), vec!["east", "north-east"]);
    assert!(hits[0].score >= hits[1].score);
    assert_eq!(hits[0].metadata.get("source").map(String::as_str), Some("east.txt"));

    let all = store.search(&[1.0, 0.0, 0.0], 50).await.unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn k_zero_is_a_validation_error() {
    let store = FlatVectorStore::new_in_memory();
    store.add(seed()).await.unwrap();
    assert!(matches!(store.search(&[1.0, 0.0, 0.0], 0).await, Err(RagError::Validation(_))));
}

#[tokio::test]
async fn empty_store_returns_nothing() {
    let store = FlatVectorStore::new_in_memory();
    assert!(store.search(&[1.0, 2.0], 3).await.unwrap().is_empty());
    assert!(store.is_empty().await.unwrap());
    assert_eq!(store.dimension().await.unwrap(), None);
}

#[tokio::test]
async fn dimension_guard_leaves_store_unchanged() {
    let store = FlatVectorStore::new_in_memory();
    store.add(seed()).await.unwrap();

    let err = store.add(vec![record("wide", vec![1.0, 0.0, 0.0, 0.0])]).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 4 }));
    assert_eq!(store.len().await.unwrap(), 4);

    let err = store.search(&[1.0, 0.0], 1).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
}

#[tokio::test]
async fn batch_add_is_all_or_nothing() {
    let store = FlatVectorStore::new_in_memory();
    store.add(seed()).await.unwrap();

    let batch = vec![
        record("ok-1", vec![0.5, 0.5, 0.0]),
        record("bad", vec![f32::NAN, 0.0, 0.0]),
        record("ok-2", vec![0.1, 0.2, 0.3]),
    ];
    assert!(matches!(store.add(batch).await, Err(RagError::Validation(_))));
    assert_eq!(store.len().await.unwrap(), 4);

    let hits = store.search(&[0.5, 0.5, 0.0], 10).await.unwrap();
    assert!(hits.iter().all(|h| !h.chunk.id.starts_with("ok-")));

    assert!(store.add(vec![record("empty", vec![])]).await.is_err());
    assert_eq!(store.len().await.unwrap(), 4);
}

#[tokio::test]
async fn persist_then_load_gives_identical_results() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("store");
    let query = [0.6, 0.8, 0.0];

    let before = {
        let store = FlatVectorStore::open(&dir).unwrap();
        store.add(seed()).await.unwrap();
        store.persist().await.unwrap();
        store.search(&query, 3).await.unwrap()
    };
    assert!(dir.join(SNAPSHOT_FILE).exists());

    let reloaded = FlatVectorStore::load(&dir).unwrap();
    assert_eq!(reloaded.len().await.unwrap(), 4);
    assert_eq!(reloaded.dimension().await.unwrap(), Some(3));
    assert_eq!(reloaded.search(&query, 3).await.unwrap(), before);

    // no stray temp files next to the snapshot
    let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn load_without_snapshot_fails_but_open_starts_empty() {
    let tmp = TempDir::new().unwrap();
    assert!(matches!(FlatVectorStore::load(tmp.path()), Err(RagError::Store(_))));
    let store = FlatVectorStore::open(tmp.path()).unwrap();
    assert_eq!(store.len().await.unwrap(), 0);
}

#[tokio::test]
async fn corrupt_snapshot_is_a_store_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(SNAPSHOT_FILE), b"{ not json").unwrap();
    assert!(matches!(FlatVectorStore::open(tmp.path()), Err(RagError::Store(_))));
    // the file is left for inspection
    assert_eq!(std::fs::read(tmp.path().join(SNAPSHOT_FILE)).unwrap(), b"{ not json");
}

#[tokio::test]
async fn clear_keeps_dimension() {
    let tmp = TempDir::new().unwrap();
    let store = FlatVectorStore::open(tmp.path()).unwrap();
    store.add(seed()).await.unwrap();
    store.clear().await.unwrap();
    store.persist().await.unwrap();

    assert_eq!(store.len().await.unwrap(), 0);
    assert_eq!(store.dimension().await.unwrap(), Some(3));
    assert!(store.add(vec![record("flat", vec![1.0, 0.0])]).await.is_err());

    let reloaded = FlatVectorStore::load(tmp.path()).unwrap();
    assert_eq!(reloaded.len().await.unwrap(), 0);
    assert_eq!(reloaded.dimension().await.unwrap(), Some(3));
}

#[tokio::test]
async fn concurrent_searches_during_adds() {
    let store = Arc::new(FlatVectorStore::new_in_memory());
    store.add(seed()).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                store.add(vec![record(&format!("extra-{i}"), vec![0.1, 0.1, 0.9])]).await.map(|_| 0)
            } else {
                store.search(&[0.0, 0.0, 1.0], 2).await.map(|h| h.len())
            }
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }
    assert_eq!(store.len().await.unwrap(), 8);
}

#[tokio::test]
async fn leftover_temp_file_does_not_shadow_the_snapshot() {
    let tmp = TempDir::new().unwrap();
    let query = [1.0, 0.0, 0.0];
    let before = {
        let store = FlatVectorStore::open(tmp.path()).unwrap();
        store.add(seed()).await.unwrap();
        store.persist().await.unwrap();
        store.search(&query, 2).await.unwrap()
    };
    // a writer that died before its rename
    std::fs::write(tmp.path().join(".tmpA1b2C3"), br#"{"format_version":1,"dimen"#).unwrap();

    let reloaded = FlatVectorStore::load(tmp.path()).unwrap();
    assert_eq!(reloaded.len().await.unwrap(), 4);
    assert_eq!(reloaded.search(&query, 2).await.unwrap(), before);
}

#[tokio::test]
async fn failed_persist_keeps_previous_snapshot_loadable() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("store");
    let moved = tmp.path().join("store.saved");

    let store = FlatVectorStore::open(&dir).unwrap();
    store.add(seed()).await.unwrap();
    store.persist().await.unwrap();

    // take the directory away and block its path with a plain file
    std::fs::rename(&dir, &moved).unwrap();
    std::fs::write(&dir, b"not a directory").unwrap();
    store.add(vec![record("late", vec![0.0, 0.0, 1.0])]).await.unwrap();
    assert!(matches!(store.persist().await, Err(RagError::Store(_))));
    assert!(matches!(store.replace(Vec::new()).await, Err(RagError::Store(_))));
    assert_eq!(store.len().await.unwrap(), 5);

    std::fs::remove_file(&dir).unwrap();
    std::fs::rename(&moved, &dir).unwrap();
    let reloaded = FlatVectorStore::load(&dir).unwrap();
    assert_eq!(reloaded.len().await.unwrap(), 4);
}

#[tokio::test]
async fn replace_validates_before_dropping_anything() {
    let tmp = TempDir::new().unwrap();
    let store = FlatVectorStore::open(tmp.path()).unwrap();
    store.add(seed()).await.unwrap();
    store.persist().await.unwrap();

    let err = store.replace(vec![record("wide", vec![1.0, 0.0, 0.0, 0.0])]).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 4 }));
    assert_eq!(store.len().await.unwrap(), 4);
    assert_eq!(FlatVectorStore::load(tmp.path()).unwrap().len().await.unwrap(), 4);
}

#[tokio::test]
async fn replace_is_durable_without_persist() {
    let tmp = TempDir::new().unwrap();
    let store = FlatVectorStore::open(tmp.path()).unwrap();
    store.add(seed()).await.unwrap();
    store.persist().await.unwrap();

    store.replace(vec![record("only", vec![0.0, 1.0, 0.0])]).await.unwrap();
    assert_eq!(ids(&store.search(&[0.0, 1.0, 0.0], 5).await.unwrap()), vec!["only"]);

    let reloaded = FlatVectorStore::load(tmp.path()).unwrap();
    assert_eq!(ids(&reloaded.search(&[0.0, 1.0, 0.0], 5).await.unwrap()), vec!["only"]);
}

#[tokio::test]
async fn truncate_drops_the_newest_records() {
    let store = FlatVectorStore::new_in_memory();
    store.add(seed()).await.unwrap();
    store.add(vec![record("late", vec![1.0, 0.0, 0.0])]).await.unwrap();

    store.truncate(4).await.unwrap();
    assert_eq!(store.len().await.unwrap(), 4);
    assert_eq!(ids(&store.search(&[1.0, 0.0, 0.0], 1).await.unwrap()), vec!["east"]);
    assert_eq!(store.dimension().await.unwrap(), Some(3));
}
