//! Turns files and directories on disk into [`Document`]s for ingestion.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::Document;

pub struct DocumentLoader {
    extensions: Vec<String>,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self { extensions: vec!["txt".to_string(), "md".to_string()] }
    }
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { extensions: extensions.into_iter().map(Into::into).collect() }
    }

    /// Load a single file, or every matching file under a directory (sorted by
    /// path). Empty files are skipped.
    pub fn load_path(&self, path: &Path) -> Result<Vec<Document>> {
        if path.is_file() {
            let root = path.parent().unwrap_or(path);
            return Ok(self.load_file(path, root)?.into_iter().collect());
        }
        let files = self.list_files(path);
        if files.is_empty() {
            tracing::warn!(dir = %path.display(), "no matching files found");
        }
        let mut docs = Vec::with_capacity(files.len());
        for file in &files {
            if let Some(doc) = self.load_file(file, path)? {
                docs.push(doc);
            }
        }
        tracing::info!(files = files.len(), documents = docs.len(), dir = %path.display(), "loaded documents");
        Ok(docs)
    }

    fn load_file(&self, file: &Path, root: &Path) -> Result<Option<Document>> {
        let content = read_file_content(file)?;
        if content.trim().is_empty() {
            tracing::debug!(file = %file.display(), "skipping empty file");
            return Ok(None);
        }
        let relative = file.strip_prefix(root).unwrap_or(file);
        let doc = Document::with_id(relative.to_string_lossy(), content)
            .with_meta("source", file.to_string_lossy())
            .with_meta("category", category_for(relative));
        Ok(Some(doc))
    }

    fn list_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| self.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
            })
            .collect();
        files.sort();
        files
    }
}

fn read_file_content(file: &Path) -> Result<String> {
    match fs::read_to_string(file) {
        Ok(content) => Ok(content),
        Err(_) => {
            let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
    }
}

fn category_for(relative: &Path) -> String {
    match relative.parent().and_then(|p| p.to_str()) {
        Some(parent) if !parent.is_empty() => format!("/{}", parent.replace('\\', "/")),
        _ => "/misc".to_string(),
    }
}
