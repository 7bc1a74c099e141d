//! Corpus → chunks → embeddings → vector store, full and incremental.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use noterag_core::chunker::Chunker;
use noterag_core::config::RagConfig;
use noterag_core::corpus::{is_markdown, list_notes, modified_ms, read_note, relative_note_path, NoteFile};
use noterag_core::error::{Error, Result};
use noterag_core::frontmatter::parse_note;
use noterag_core::graph::extract_links;
use noterag_core::traits::{EmbeddingProvider, VectorStore};
use noterag_core::types::{document_id, note_id_for, DocumentMetadata, VectorDocument};

use crate::manifest::{IndexManifest, NoteEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProgress {
    pub processed: usize,
    pub total: usize,
    pub note_path: Option<String>,
}

pub type ProgressCallback = Arc<dyn Fn(&IndexProgress) + Send + Sync>;

/// A note that could not be indexed; the run continues without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexError {
    pub note_path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub full_rebuild: bool,
    pub notes_added: usize,
    pub notes_updated: usize,
    pub notes_removed: usize,
    pub notes_unchanged: usize,
    pub documents_written: usize,
    pub documents_deleted: usize,
    pub errors: Vec<IndexError>,
}

impl IndexReport {
    fn error(&mut self, note_path: &str, err: &Error) {
        warn!(path = %note_path, error = %err, "note skipped");
        self.errors.push(IndexError { note_path: note_path.to_string(), message: err.to_string() });
    }

    pub fn changed(&self) -> bool {
        self.notes_added + self.notes_updated + self.notes_removed > 0 || self.documents_deleted > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Added,
    Updated,
}

/// A note read and chunked, waiting for embeddings.
struct PreparedNote {
    rel_path: String,
    entry: NoteEntry,
    docs: Vec<VectorDocument>,
    change: Change,
}

pub struct Indexer {
    notes_dir: PathBuf,
    manifest_path: PathBuf,
    chunker: Chunker,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_concurrent_batches: usize,
    run_lock: Mutex<()>,
}

impl Indexer {
    pub fn new(config: &RagConfig, store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Ok(Self {
            notes_dir: config.notes_dir.clone(),
            manifest_path: config.manifest_path(),
            chunker: Chunker::with_config(config.chunking.clone())?,
            store,
            embedder,
            batch_size: config.embedding.batch_size.max(1),
            max_concurrent_batches: config.embedding.max_concurrent_batches.max(1),
            run_lock: Mutex::new(()),
        })
    }

    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Clear the store and index every note.
    pub async fn index_all(&self, progress: Option<ProgressCallback>) -> Result<IndexReport> {
        let _guard = self.run_lock.lock().await;
        self.rebuild(progress).await
    }

    /// Bring the store in line with the corpus, touching only changed notes.
    ///
    /// Falls back to a full rebuild when the manifest is missing or unreadable,
    /// or was written for another embedding model.
    pub async fn index_incremental(&self, progress: Option<ProgressCallback>) -> Result<IndexReport> {
        let _guard = self.run_lock.lock().await;
        let model_id = self.embedder.model_id().to_string();
        let dimension = self.embedder.dimension();
        let mut manifest = match IndexManifest::load(&self.manifest_path) {
            Ok(Some(m)) if m.matches_model(&model_id, dimension) => m,
            Ok(Some(m)) => {
                info!(previous = %m.embedding_model_id, current = %model_id, "embedding model changed, rebuilding index");
                return self.rebuild(progress).await;
            }
            Ok(None) => {
                info!("no index manifest, rebuilding index");
                return self.rebuild(progress).await;
            }
            Err(err) => {
                warn!(error = %err, "index manifest unusable, rebuilding index");
                return self.rebuild(progress).await;
            }
        };

        let files = list_notes(&self.notes_dir)?;
        let mut report = IndexReport::default();
        let mut seen = HashSet::with_capacity(files.len());
        let mut pending = Vec::new();
        for file in &files {
            seen.insert(file.rel_path.clone());
            let mtime = match modified_ms(&file.abs_path) {
                Ok(m) => m,
                Err(err) => {
                    report.error(&file.rel_path, &err);
                    continue;
                }
            };
            match manifest.notes.get_mut(&file.rel_path) {
                Some(entry) if entry.mtime_ms == mtime => report.notes_unchanged += 1,
                Some(entry) => match self.prepare(file) {
                    Ok(note) if note.entry.content_hash == entry.content_hash => {
                        debug!(path = %file.rel_path, "mtime changed, content identical");
                        entry.mtime_ms = note.entry.mtime_ms;
                        report.notes_unchanged += 1;
                    }
                    Ok(mut note) => {
                        note.change = Change::Updated;
                        pending.push(note);
                    }
                    Err(err) => report.error(&file.rel_path, &err),
                },
                None => match self.prepare(file) {
                    Ok(note) => pending.push(note),
                    Err(err) => report.error(&file.rel_path, &err),
                },
            }
        }

        let removed: Vec<String> = manifest.notes.keys().filter(|p| !seen.contains(*p)).cloned().collect();
        for path in removed {
            self.store.delete_by_note_path(&path).await?;
            if let Some(entry) = manifest.notes.remove(&path) {
                report.documents_deleted += entry.chunk_count;
            }
            report.notes_removed += 1;
            debug!(path = %path, "removed note from index");
        }

        self.write_notes(pending, &mut manifest, &mut report, true, progress.as_ref()).await?;
        report.documents_deleted += self.prune_orphans(&manifest).await?;
        manifest.save(&self.manifest_path)?;
        info!(
            added = report.notes_added,
            updated = report.notes_updated,
            removed = report.notes_removed,
            unchanged = report.notes_unchanged,
            errors = report.errors.len(),
            "incremental index complete"
        );
        Ok(report)
    }

    /// Re-index one note, or drop it when the file no longer exists.
    /// `path` may be absolute or relative to the notes directory.
    pub async fn index_note(&self, path: &Path) -> Result<IndexReport> {
        let _guard = self.run_lock.lock().await;
        let (abs_path, rel_path) = self.resolve(path)?;
        if !abs_path.exists() {
            return self.remove_locked(&rel_path).await;
        }
        let mut manifest = self.load_or_new_manifest();
        let mut report = IndexReport::default();
        let file = NoteFile { abs_path, rel_path };
        match self.prepare(&file) {
            Ok(mut note) => {
                if manifest.notes.contains_key(&file.rel_path) {
                    note.change = Change::Updated;
                }
                self.write_notes(vec![note], &mut manifest, &mut report, true, None).await?;
            }
            Err(err) => report.error(&file.rel_path, &err),
        }
        manifest.save(&self.manifest_path)?;
        Ok(report)
    }

    /// Delete a note's documents and manifest entry.
    pub async fn remove_note(&self, path: &Path) -> Result<IndexReport> {
        let _guard = self.run_lock.lock().await;
        let (_, rel_path) = self.resolve(path)?;
        self.remove_locked(&rel_path).await
    }

    async fn remove_locked(&self, rel_path: &str) -> Result<IndexReport> {
        let mut manifest = self.load_or_new_manifest();
        let mut report = IndexReport::default();
        self.store.delete_by_note_path(rel_path).await?;
        if let Some(entry) = manifest.notes.remove(rel_path) {
            report.notes_removed = 1;
            report.documents_deleted = entry.chunk_count;
        }
        manifest.save(&self.manifest_path)?;
        Ok(report)
    }

    fn resolve(&self, path: &Path) -> Result<(PathBuf, String)> {
        let abs = if path.is_absolute() { path.to_path_buf() } else { self.notes_dir.join(path) };
        let rel = relative_note_path(&self.notes_dir, &abs)
            .ok_or_else(|| Error::corpus(path.display().to_string(), "path is outside the notes directory"))?;
        if !is_markdown(&abs) {
            return Err(Error::corpus(rel, "not a markdown note"));
        }
        if rel.split('/').any(|part| part.starts_with('.')) {
            return Err(Error::corpus(rel, "path is inside a hidden directory"));
        }
        Ok((abs, rel))
    }

    fn load_or_new_manifest(&self) -> IndexManifest {
        match IndexManifest::load(&self.manifest_path) {
            Ok(Some(m)) => m,
            Ok(None) => IndexManifest::new(self.embedder.model_id(), self.embedder.dimension()),
            Err(err) => {
                warn!(error = %err, "starting a fresh index manifest");
                IndexManifest::new(self.embedder.model_id(), self.embedder.dimension())
            }
        }
    }

    async fn rebuild(&self, progress: Option<ProgressCallback>) -> Result<IndexReport> {
        // Until the new manifest lands, the next incremental run must rebuild.
        IndexManifest::remove(&self.manifest_path)?;
        self.store.clear().await?;
        let files = list_notes(&self.notes_dir)?;
        let mut manifest = IndexManifest::new(self.embedder.model_id(), self.embedder.dimension());
        let mut report = IndexReport { full_rebuild: true, ..Default::default() };
        let mut pending = Vec::with_capacity(files.len());
        for file in &files {
            match self.prepare(file) {
                Ok(note) => pending.push(note),
                Err(err) => report.error(&file.rel_path, &err),
            }
        }
        self.write_notes(pending, &mut manifest, &mut report, false, progress.as_ref()).await?;
        manifest.save(&self.manifest_path)?;
        info!(
            notes = report.notes_added,
            documents = report.documents_written,
            errors = report.errors.len(),
            "full index complete"
        );
        Ok(report)
    }

    fn prepare(&self, file: &NoteFile) -> Result<PreparedNote> {
        let note = read_note(file)?;
        let content_hash = blake3::hash(note.text.as_bytes()).to_hex().to_string();
        let connection_count = extract_links(parse_note(&note.text).body).len() as u32;
        let fm = note.frontmatter.clone().unwrap_or_default();
        let metadata = DocumentMetadata {
            title: note.title(),
            note_type: fm.note_type,
            tags: fm.tags,
            created: fm.created,
            modified: fm.modified,
            connection_count,
        };
        let note_id = note_id_for(&file.rel_path);
        let docs: Vec<VectorDocument> = self
            .chunker
            .chunk(&note.text)
            .into_iter()
            .map(|chunk| VectorDocument {
                id: document_id(&note_id, chunk.index),
                note_id: note_id.clone(),
                note_path: file.rel_path.clone(),
                chunk_index: chunk.index,
                content: chunk.content,
                embedding: Vec::new(),
                metadata: metadata.clone(),
            })
            .collect();
        Ok(PreparedNote {
            rel_path: file.rel_path.clone(),
            entry: NoteEntry { note_id, content_hash, mtime_ms: note.mtime_ms, chunk_count: docs.len() },
            docs,
            change: Change::Added,
        })
    }

    /// Embed and store prepared notes in waves of `batch_size * max_concurrent_batches` chunks.
    async fn write_notes(
        &self,
        notes: Vec<PreparedNote>,
        manifest: &mut IndexManifest,
        report: &mut IndexReport,
        replace_existing: bool,
        progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        let total = notes.len();
        let wave_budget = self.batch_size * self.max_concurrent_batches;
        let mut processed = 0usize;
        let mut wave: Vec<PreparedNote> = Vec::new();
        let mut wave_chunks = 0usize;
        let mut notes = notes.into_iter().peekable();
        while let Some(note) = notes.next() {
            wave_chunks += note.docs.len();
            wave.push(note);
            if wave_chunks < wave_budget && notes.peek().is_some() {
                continue;
            }
            let embedded = self.embed_wave(std::mem::take(&mut wave)).await;
            wave_chunks = 0;
            for (note, outcome) in embedded {
                processed += 1;
                let note_path = note.rel_path.clone();
                match outcome {
                    Ok(docs) => self.store_note(note, docs, manifest, report, replace_existing).await?,
                    Err(err) => report.error(&note_path, &err),
                }
                if let Some(cb) = progress {
                    cb(&IndexProgress { processed, total, note_path: Some(note_path) });
                }
            }
        }
        if total == 0 {
            if let Some(cb) = progress {
                cb(&IndexProgress { processed: 0, total: 0, note_path: None });
            }
        }
        Ok(())
    }

    async fn store_note(
        &self,
        note: PreparedNote,
        docs: Vec<VectorDocument>,
        manifest: &mut IndexManifest,
        report: &mut IndexReport,
        replace_existing: bool,
    ) -> Result<()> {
        if replace_existing {
            self.store.delete_by_note_path(&note.rel_path).await?;
            if let Some(old) = manifest.notes.get(&note.rel_path) {
                report.documents_deleted += old.chunk_count;
            }
        }
        if !docs.is_empty() {
            self.store.add(&docs).await?;
        }
        report.documents_written += docs.len();
        match note.change {
            Change::Added => report.notes_added += 1,
            Change::Updated => report.notes_updated += 1,
        }
        debug!(path = %note.rel_path, chunks = docs.len(), "indexed note");
        manifest.notes.insert(note.rel_path, note.entry);
        Ok(())
    }

    /// Embed every chunk of the wave with up to `max_concurrent_batches` requests
    /// in flight. A failed batch fails only the notes it carried.
    async fn embed_wave(&self, wave: Vec<PreparedNote>) -> Vec<(PreparedNote, Result<Vec<VectorDocument>>)> {
        let texts: Vec<(usize, String)> = wave
            .iter()
            .enumerate()
            .flat_map(|(ni, note)| note.docs.iter().map(move |d| (ni, d.content.clone())))
            .collect();
        let batches: Vec<Vec<(usize, String)>> = texts.chunks(self.batch_size).map(<[_]>::to_vec).collect();
        let expected_dim = self.embedder.dimension();

        let results: Vec<Result<Vec<Vec<f32>>>> = stream::iter(batches.iter().map(|batch| {
            let inputs: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
            let embedder = self.embedder.clone();
            async move {
                let vectors = embedder.embed(&inputs).await?;
                if vectors.len() != inputs.len() {
                    return Err(Error::provider(format!("expected {} vectors, got {}", inputs.len(), vectors.len())));
                }
                if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dim) {
                    return Err(Error::DimensionMismatch { expected: expected_dim, actual: bad.len() });
                }
                Ok(vectors)
            }
        }))
        .buffered(self.max_concurrent_batches)
        .collect()
        .await;

        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut failures: HashMap<usize, String> = HashMap::new();
        for (batch, result) in batches.iter().zip(results) {
            match result {
                Ok(vs) => vectors.extend(vs.into_iter().map(Some)),
                Err(err) => {
                    for (ni, _) in batch {
                        failures.entry(*ni).or_insert_with(|| err.to_string());
                    }
                    vectors.extend(batch.iter().map(|_| None));
                }
            }
        }

        let mut cursor = vectors.into_iter();
        wave.into_iter()
            .enumerate()
            .map(|(ni, mut note)| {
                let mut docs = std::mem::take(&mut note.docs);
                for doc in &mut docs {
                    if let Some(Some(v)) = cursor.next() {
                        doc.embedding = v;
                    }
                }
                let outcome = match failures.remove(&ni) {
                    Some(message) => Err(Error::Provider(message)),
                    None => Ok(docs),
                };
                (note, outcome)
            })
            .collect()
    }

    /// Drop documents whose note has no manifest entry.
    async fn prune_orphans(&self, manifest: &IndexManifest) -> Result<usize> {
        let known: HashSet<&str> = manifest.notes.values().map(|e| e.note_id.as_str()).collect();
        let orphans: Vec<String> = self
            .store
            .get_all_documents()
            .await?
            .into_iter()
            .filter(|d| !known.contains(d.note_id.as_str()))
            .map(|d| d.id)
            .collect();
        if !orphans.is_empty() {
            info!(count = orphans.len(), "pruning orphaned documents");
            self.store.delete(&orphans).await?;
        }
        Ok(orphans.len())
    }
}
