//! On-disk snapshot of a flat store: `<dir>/vectors.json`.
//!
//! Compact JSON. Writes go to a temp file in the same directory which is
//! fsynced and then renamed over the previous snapshot, and the directory is
//! fsynced after the rename. A crash leaves either the old or the new file and
//! never a torn one.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ragdb_core::{RagError, Result, VectorRecord};

pub const SNAPSHOT_FILE: &str = "vectors.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub dimension: Option<usize>,
    pub saved_at: DateTime<Utc>,
    pub records: Vec<VectorRecord>,
}

#[derive(Serialize)]
pub(crate) struct SnapshotRef<'a> {
    pub format_version: u32,
    pub dimension: Option<usize>,
    pub saved_at: DateTime<Utc>,
    pub records: &'a [VectorRecord],
}

pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

pub(crate) fn encode(dimension: Option<usize>, records: &[VectorRecord]) -> Result<Vec<u8>> {
    let snap = SnapshotRef { format_version: FORMAT_VERSION, dimension, saved_at: Utc::now(), records };
    Ok(serde_json::to_vec(&snap)?)
}

pub(crate) fn write_atomic(dir: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_with(dir, |file| file.write_all(bytes))
}

/// `fill` writes the new contents into the temp file. If anything fails before
/// the rename, the temp file is removed and the old snapshot is left as it was.
fn write_atomic_with<F>(dir: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut fs::File) -> std::io::Result<()>,
{
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(snapshot_path(dir))
        .map_err(|e| RagError::store(format!("replacing snapshot in {}: {}", dir.display(), e.error)))?;
    sync_dir(dir)
}

/// Flush the directory entry so the rename itself survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Read and check the snapshot in `dir`; `Ok(None)` when there is none yet.
pub fn read(dir: &Path) -> Result<Option<Snapshot>> {
    let path = snapshot_path(dir);
    let bytes = match fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snap: Snapshot = serde_json::from_slice(&bytes)
        .map_err(|e| RagError::store(format!("corrupt snapshot {}: {e}", path.display())))?;
    if snap.format_version != FORMAT_VERSION {
        return Err(RagError::store(format!(
            "unsupported snapshot format_version {} in {}",
            snap.format_version,
            path.display()
        )));
    }
    match snap.dimension {
        Some(d) => {
            if let Some(bad) = snap.records.iter().find(|r| r.vector.len() != d) {
                return Err(RagError::store(format!(
                    "corrupt snapshot {}: record {} has {} values, expected {d}",
                    path.display(),
                    bad.chunk_id(),
                    bad.vector.len()
                )));
            }
        }
        None if !snap.records.is_empty() => {
            return Err(RagError::store(format!("corrupt snapshot {}: records without a dimension", path.display())));
        }
        None => {}
    }
    Ok(Some(snap))
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
    fn interrupted_write_keeps_the_previous_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let old = vec![record("kept", vec![1.0, 0.0])];
        write_atomic(tmp.path(), &encode(Some(2), &old).unwrap()).unwrap();

        let err = write_atomic_with(tmp.path(), |file| {
            file.write_all(br#"{"format_version":1,"dimension":2,"rec"#)?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"))
        })
        .unwrap_err();
        assert!(matches!(err, RagError::Store(_)));

        let snap = read(tmp.path()).unwrap().expect("snapshot");
        assert_eq!(snap.dimension, Some(2));
        assert_eq!(snap.records.len(), 1);
        assert_eq!(snap.records[0].chunk.id, "kept");
        // the half-written temp file is gone
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn unknown_format_version_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = r#"{"format_version":99,"dimension":null,"saved_at":"2026-01-01T00:00:00Z","records":[]}"#;
        fs::write(snapshot_path(tmp.path()), raw).unwrap();
        assert!(matches!(read(tmp.path()), Err(RagError::Store(_))));
    }
}
