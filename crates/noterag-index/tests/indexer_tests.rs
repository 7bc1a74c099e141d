use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use noterag_core::config::RagConfig;
use noterag_core::traits::{EmbeddingProvider, VectorStore};
use noterag_core::types::{document_id, note_id_for, DocumentMetadata, VectorDocument, VectorHit};
use noterag_embed::HashingEmbedder;
use noterag_index::{IndexManifest, IndexProgress, Indexer, ProgressCallback};
use noterag_vector::MemoryVectorStore;

fn write_note(dir: &Path, rel: &str, text: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, text).unwrap();
}

/// Push the mtime forward so change detection never depends on clock granularity.
fn bump_mtime(dir: &Path, rel: &str, secs: u64) {
    let file = std::fs::OpenOptions::new().write(true).open(dir.join(rel)).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs)).unwrap();
}

fn seed_corpus(dir: &Path) {
    write_note(dir, "alpha.md", "---\ntitle: Alpha\ntags: [garden]\n---\n# Alpha\n\nAlpha links to [[Beta]] and [[Gamma]].\n");
    write_note(dir, "beta.md", "# Beta\n\nBeta is about composting and soil.\n");
    write_note(dir, "projects/gamma.md", "# Gamma\n\nGamma tracks the greenhouse build.\n");
}

fn indexer(dir: &Path, store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Indexer {
    Indexer::new(&RagConfig::for_notes_dir(dir), store, embedder).unwrap()
}

async fn paths_in_store(store: &dyn VectorStore) -> Vec<String> {
    let mut paths: Vec<String> = store.get_all_documents().await.unwrap().into_iter().map(|d| d.note_path).collect();
    paths.sort();
    paths.dedup();
    paths
}

#[tokio::test]
async fn full_index_then_incremental_is_a_no_op() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(MemoryVectorStore::new());
    let idx = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32)));

    let report = idx.index_all(None).await?;
    assert!(report.full_rebuild);
    assert_eq!(report.notes_added, 3);
    assert!(report.errors.is_empty());
    let count = store.count().await?;
    assert_eq!(report.documents_written, count);
    assert_eq!(paths_in_store(store.as_ref()).await, vec!["alpha.md", "beta.md", "projects/gamma.md"]);

    let manifest = IndexManifest::load(idx.manifest_path())?.unwrap();
    assert_eq!(manifest.notes.len(), 3);
    assert_eq!(manifest.total_chunks(), count);
    assert!(manifest.matches_model("hashing:d32", 32));

    let again = idx.index_incremental(None).await?;
    assert!(!again.full_rebuild);
    assert_eq!(again.notes_unchanged, 3);
    assert_eq!(again.documents_written, 0);
    assert!(!again.changed());
    assert_eq!(store.count().await?, count);
    Ok(())
}

#[tokio::test]
async fn stored_documents_carry_note_metadata() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(MemoryVectorStore::new());
    indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(16))).index_all(None).await?;

    let docs = store.get_all_documents().await?;
    let alpha = docs.iter().find(|d| d.note_path == "alpha.md").unwrap();
    assert_eq!(alpha.note_id, note_id_for("alpha.md"));
    assert_eq!(alpha.id, document_id(&alpha.note_id, alpha.chunk_index));
    assert_eq!(alpha.metadata.title, "Alpha");
    assert_eq!(alpha.metadata.tags, vec!["garden"]);
    assert_eq!(alpha.metadata.connection_count, 2);
    assert_eq!(alpha.embedding.len(), 16);

    let gamma = docs.iter().find(|d| d.note_path == "projects/gamma.md").unwrap();
    assert_eq!(gamma.metadata.title, "gamma");
    assert_eq!(gamma.metadata.connection_count, 0);
    Ok(())
}

#[tokio::test]
async fn incremental_picks_up_edits_additions_and_removals() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(MemoryVectorStore::new());
    let idx = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32)));
    idx.index_incremental(None).await?;

    write_note(tmp.path(), "beta.md", "# Beta\n\nBeta now covers worm bins instead.\n");
    bump_mtime(tmp.path(), "beta.md", 10);
    write_note(tmp.path(), "delta.md", "# Delta\n\nA brand new note.\n");
    std::fs::remove_file(tmp.path().join("projects/gamma.md"))?;

    let report = idx.index_incremental(None).await?;
    assert!(!report.full_rebuild);
    assert_eq!(report.notes_updated, 1);
    assert_eq!(report.notes_added, 1);
    assert_eq!(report.notes_removed, 1);
    assert_eq!(report.notes_unchanged, 1);

    assert_eq!(paths_in_store(store.as_ref()).await, vec!["alpha.md", "beta.md", "delta.md"]);
    let beta: Vec<VectorDocument> =
        store.get_all_documents().await?.into_iter().filter(|d| d.note_path == "beta.md").collect();
    assert!(beta.iter().all(|d| !d.content.contains("composting")));
    assert!(beta.iter().any(|d| d.content.contains("worm bins")));

    let manifest = IndexManifest::load(idx.manifest_path())?.unwrap();
    assert!(!manifest.notes.contains_key("projects/gamma.md"));
    assert_eq!(manifest.total_chunks(), store.count().await?);
    Ok(())
}

#[tokio::test]
async fn touched_but_unchanged_note_is_not_reembedded() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(MemoryVectorStore::new());
    let idx = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32)));
    idx.index_all(None).await?;
    let before = IndexManifest::load(idx.manifest_path())?.unwrap().notes["beta.md"].clone();

    bump_mtime(tmp.path(), "beta.md", 30);
    let report = idx.index_incremental(None).await?;
    assert_eq!(report.notes_unchanged, 3);
    assert_eq!(report.documents_written, 0);

    let after = IndexManifest::load(idx.manifest_path())?.unwrap().notes["beta.md"].clone();
    assert_eq!(after.content_hash, before.content_hash);
    assert!(after.mtime_ms > before.mtime_ms);
    Ok(())
}

#[tokio::test]
async fn orphaned_documents_are_pruned() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(MemoryVectorStore::new());
    let embedder = Arc::new(HashingEmbedder::new(32));
    let idx = indexer(tmp.path(), store.clone(), embedder.clone());
    idx.index_all(None).await?;
    let count = store.count().await?;

    let stray_id = note_id_for("ghost.md");
    store
        .add(&[VectorDocument {
            id: document_id(&stray_id, 0),
            note_id: stray_id,
            note_path: "ghost.md".into(),
            chunk_index: 0,
            content: "left behind by an interrupted run".into(),
            embedding: embedder.embed_text("left behind"),
            metadata: DocumentMetadata::default(),
        }])
        .await?;

    let report = idx.index_incremental(None).await?;
    assert_eq!(report.documents_deleted, 1);
    assert_eq!(store.count().await?, count);
    assert!(!paths_in_store(store.as_ref()).await.contains(&"ghost.md".to_string()));
    Ok(())
}

#[tokio::test]
async fn corrupt_manifest_forces_rebuild() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(MemoryVectorStore::new());
    let idx = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32)));
    idx.index_all(None).await?;
    let count = store.count().await?;

    std::fs::write(idx.manifest_path(), "{ definitely not json")?;
    let report = idx.index_incremental(None).await?;
    assert!(report.full_rebuild);
    assert_eq!(report.notes_added, 3);
    assert_eq!(store.count().await?, count);
    assert!(IndexManifest::load(idx.manifest_path())?.is_some());
    Ok(())
}

#[tokio::test]
async fn model_change_forces_rebuild() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(MemoryVectorStore::new());
    indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32))).index_all(None).await?;
    assert_eq!(store.dimension().await?, Some(32));

    let swapped = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(48)));
    let report = swapped.index_incremental(None).await?;
    assert!(report.full_rebuild);
    assert_eq!(store.dimension().await?, Some(48));
    let manifest = IndexManifest::load(swapped.manifest_path())?.unwrap();
    assert_eq!(manifest.embedding_model_id, "hashing:d48");
    Ok(())
}

#[tokio::test]
async fn unreadable_note_is_reported_and_skipped() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    std::fs::write(tmp.path().join("broken.md"), [0xff, 0xfe, 0x00, 0x41])?;
    let store = Arc::new(MemoryVectorStore::new());
    let idx = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32)));

    let report = idx.index_all(None).await?;
    assert_eq!(report.notes_added, 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].note_path, "broken.md");
    assert!(!paths_in_store(store.as_ref()).await.contains(&"broken.md".to_string()));
    Ok(())
}

/// Fails any batch that contains the word "poison".
struct PickyEmbedder(HashingEmbedder);

#[async_trait]
impl EmbeddingProvider for PickyEmbedder {
    fn model_id(&self) -> &str {
        self.0.model_id()
    }

    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    async fn embed(&self, texts: &[String]) -> noterag_core::Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(noterag_core::Error::provider("model rejected input"));
        }
        self.0.embed(texts).await
    }
}

#[tokio::test]
async fn failed_embedding_batch_only_fails_its_notes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    write_note(tmp.path(), "bad.md", "# Bad\n\nThis one carries poison.\n");
    let mut config = RagConfig::for_notes_dir(tmp.path());
    config.embedding.batch_size = 1;
    let store = Arc::new(MemoryVectorStore::new());
    let idx = Indexer::new(&config, store.clone(), Arc::new(PickyEmbedder(HashingEmbedder::new(16))))?;

    let report = idx.index_all(None).await?;
    assert_eq!(report.notes_added, 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].note_path, "bad.md");
    assert_eq!(paths_in_store(store.as_ref()).await, vec!["alpha.md", "beta.md", "projects/gamma.md"]);
    let manifest = IndexManifest::load(idx.manifest_path())?.unwrap();
    assert!(!manifest.notes.contains_key("bad.md"));
    Ok(())
}

/// Memory store whose `add` fails once the armed count of writes is reached.
struct FlakyStore {
    inner: MemoryVectorStore,
    adds_left: AtomicUsize,
    armed: std::sync::atomic::AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self { inner: MemoryVectorStore::new(), adds_left: AtomicUsize::new(0), armed: Default::default() }
    }

    /// Let `ok_adds` more writes through, then fail every write.
    fn fail_after(&self, ok_adds: usize) {
        self.adds_left.store(ok_adds, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    fn heal(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn initialize(&self) -> noterag_core::Result<()> {
        self.inner.initialize().await
    }

    async fn add(&self, documents: &[VectorDocument]) -> noterag_core::Result<()> {
        if self.armed.load(Ordering::SeqCst) {
            let left = self.adds_left.load(Ordering::SeqCst);
            if left == 0 {
                return Err(noterag_core::Error::store("disk full"));
            }
            self.adds_left.store(left - 1, Ordering::SeqCst);
        }
        self.inner.add(documents).await
    }

    async fn search(&self, query: &[f32], top_k: usize) -> noterag_core::Result<Vec<VectorHit>> {
        self.inner.search(query, top_k).await
    }

    async fn delete(&self, ids: &[String]) -> noterag_core::Result<()> {
        self.inner.delete(ids).await
    }

    async fn delete_by_note_path(&self, note_path: &str) -> noterag_core::Result<()> {
        self.inner.delete_by_note_path(note_path).await
    }

    async fn clear(&self) -> noterag_core::Result<()> {
        self.inner.clear().await
    }

    async fn count(&self) -> noterag_core::Result<usize> {
        self.inner.count().await
    }

    async fn get_all_documents(&self) -> noterag_core::Result<Vec<VectorDocument>> {
        self.inner.get_all_documents().await
    }

    async fn dimension(&self) -> noterag_core::Result<Option<usize>> {
        self.inner.dimension().await
    }
}

#[tokio::test]
async fn interrupted_rebuild_is_finished_by_next_incremental_run() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(FlakyStore::new());
    let idx = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32)));
    idx.index_all(None).await?;

    store.fail_after(1);
    let err = idx.index_all(None).await.unwrap_err();
    assert!(matches!(err, noterag_core::Error::Store(_)));
    assert_eq!(paths_in_store(store.as_ref()).await, vec!["alpha.md"]);
    assert!(IndexManifest::load(idx.manifest_path())?.is_none());

    store.heal();
    let report = idx.index_incremental(None).await?;
    assert!(report.full_rebuild);
    assert_eq!(report.notes_added, 3);
    assert_eq!(paths_in_store(store.as_ref()).await, vec!["alpha.md", "beta.md", "projects/gamma.md"]);
    Ok(())
}

#[tokio::test]
async fn failed_incremental_write_is_retried() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(FlakyStore::new());
    let idx = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32)));
    idx.index_all(None).await?;

    write_note(tmp.path(), "beta.md", "# Beta\n\nBeta now covers worm bins instead.\n");
    bump_mtime(tmp.path(), "beta.md", 10);
    store.fail_after(0);
    assert!(idx.index_incremental(None).await.is_err());

    store.heal();
    let report = idx.index_incremental(None).await?;
    assert_eq!(report.notes_updated, 1);
    assert_eq!(paths_in_store(store.as_ref()).await, vec!["alpha.md", "beta.md", "projects/gamma.md"]);
    Ok(())
}

#[tokio::test]
async fn index_note_rejects_files_outside_the_corpus() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    write_note(tmp.path(), "todo.txt", "not a note\n");
    write_note(tmp.path(), ".noterag/stray.md", "# Stray\n\nInside the data directory.\n");
    let store = Arc::new(MemoryVectorStore::new());
    let idx = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32)));
    idx.index_all(None).await?;
    let count = store.count().await?;

    for path in ["todo.txt", ".noterag/stray.md"] {
        let err = idx.index_note(Path::new(path)).await.unwrap_err();
        assert!(matches!(err, noterag_core::Error::Corpus { .. }), "{path}: {err}");
    }
    assert!(idx.remove_note(Path::new("todo.txt")).await.is_err());
    assert_eq!(store.count().await?, count);
    assert_eq!(paths_in_store(store.as_ref()).await, vec!["alpha.md", "beta.md", "projects/gamma.md"]);
    Ok(())
}

#[tokio::test]
async fn index_note_and_remove_note() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let store = Arc::new(MemoryVectorStore::new());
    let idx = indexer(tmp.path(), store.clone(), Arc::new(HashingEmbedder::new(32)));
    idx.index_all(None).await?;

    write_note(tmp.path(), "epsilon.md", "# Epsilon\n\nSeed saving notes.\n");
    let added = idx.index_note(Path::new("epsilon.md")).await?;
    assert_eq!(added.notes_added, 1);
    assert!(paths_in_store(store.as_ref()).await.contains(&"epsilon.md".to_string()));

    // absolute paths resolve to the same note; a re-index replaces rather than duplicates
    let before = store.count().await?;
    let again = idx.index_note(&tmp.path().join("epsilon.md")).await?;
    assert_eq!(again.notes_updated, 1);
    assert_eq!(store.count().await?, before);

    let removed = idx.remove_note(Path::new("epsilon.md")).await?;
    assert_eq!(removed.notes_removed, 1);
    assert!(!paths_in_store(store.as_ref()).await.contains(&"epsilon.md".to_string()));
    assert!(!IndexManifest::load(idx.manifest_path())?.unwrap().notes.contains_key("epsilon.md"));

    // indexing a path that no longer exists removes it
    std::fs::remove_file(tmp.path().join("beta.md"))?;
    let gone = idx.index_note(Path::new("beta.md")).await?;
    assert_eq!(gone.notes_removed, 1);
    assert_eq!(paths_in_store(store.as_ref()).await, vec!["alpha.md", "projects/gamma.md"]);

    assert!(idx.index_note(Path::new("/somewhere/else.md")).await.is_err());
    Ok(())
}

#[tokio::test]
async fn progress_reports_every_note() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    seed_corpus(tmp.path());
    let seen = Arc::new(AtomicUsize::new(0));
    let last_total = Arc::new(AtomicUsize::new(0));
    let cb: ProgressCallback = {
        let seen = seen.clone();
        let last_total = last_total.clone();
        Arc::new(move |p: &IndexProgress| {
            seen.fetch_add(1, Ordering::SeqCst);
            last_total.store(p.total, Ordering::SeqCst);
            assert!(p.processed <= p.total);
            assert!(p.note_path.is_some());
        })
    };
    let idx = indexer(tmp.path(), Arc::new(MemoryVectorStore::new()), Arc::new(HashingEmbedder::new(32)));
    idx.index_all(Some(cb)).await?;
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(last_total.load(Ordering::SeqCst), 3);
    Ok(())
}
