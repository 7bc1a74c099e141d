//! Per-note change manifest stored next to the vector store.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use noterag_core::error::{Error, Result};

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEntry {
    pub note_id: String,
    /// blake3 of the raw note text.
    pub content_hash: String,
    pub mtime_ms: i64,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub embedding_model_id: String,
    pub dimension: usize,
    /// RFC 3339.
    pub updated_at: String,
    /// Keyed by corpus-relative note path.
    pub notes: BTreeMap<String, NoteEntry>,
}

impl IndexManifest {
    pub fn new(embedding_model_id: &str, dimension: usize) -> Self {
        Self {
            version: MANIFEST_VERSION,
            embedding_model_id: embedding_model_id.to_string(),
            dimension,
            updated_at: Utc::now().to_rfc3339(),
            notes: BTreeMap::new(),
        }
    }

    /// `Ok(None)` when no manifest exists; a manifest that does not parse or
    /// has an unknown version is an error.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Manifest(format!("{}: {e}", path.display())))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::Manifest(format!(
                "{}: unsupported version {}",
                path.display(),
                manifest.version
            )));
        }
        Ok(Some(manifest))
    }

    /// Write to a sibling temp file and rename over `path`.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Utc::now().to_rfc3339();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(|e| Error::Manifest(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Delete the manifest file; a missing file is fine.
    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Built with the same embedding model and dimension.
    pub fn matches_model(&self, model_id: &str, dimension: usize) -> bool {
        self.embedding_model_id == model_id && self.dimension == dimension
    }

    pub fn total_chunks(&self) -> usize {
        self.notes.values().map(|n| n.chunk_count).sum()
    }
}
