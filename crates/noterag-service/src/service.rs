//! Lifecycle owner for the index: builds the store, provider, indexer and
//! retriever once, then serves searches and note updates.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use noterag_core::config::{RagConfig, RetrievalConfig};
use noterag_core::error::{Error, Result};
use noterag_core::graph::WikiLinkAnalyzer;
use noterag_core::traits::{EmbeddingProvider, VectorStore};
use noterag_core::types::RetrievalResult;
use noterag_hybrid::HybridRetriever;
use noterag_index::{IndexReport, Indexer, ProgressCallback};
use noterag_text::{query_terms, KeywordTokenizer};

use crate::backend::ServiceOptions;

/// Per-call retrieval knobs; defaults come from the `[retrieval]` config table.
pub type SearchOptions = RetrievalConfig;

const MAX_HIGHLIGHTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagSearchResult {
    pub note_path: String,
    pub title: String,
    /// Best chunk, widened with surrounding lines when context expansion is on.
    pub content: String,
    pub base_score: f32,
    pub final_score: f32,
    /// Lines of `content` that contain a query term.
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub note_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Uninitialized,
    Initializing,
    Ready,
}

struct Engine {
    config: RagConfig,
    fingerprint: String,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    indexer: Indexer,
    retriever: HybridRetriever,
}

enum ServiceState {
    Uninitialized,
    Initializing,
    Ready(Arc<Engine>),
}

pub struct RagService {
    init_lock: Mutex<()>,
    state: RwLock<ServiceState>,
}

impl Default for RagService {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<RagService> = OnceLock::new();

impl RagService {
    pub fn new() -> Self {
        Self { init_lock: Mutex::new(()), state: RwLock::new(ServiceState::Uninitialized) }
    }

    /// Process-wide instance.
    pub fn global() -> &'static RagService {
        GLOBAL.get_or_init(RagService::new)
    }

    pub fn status(&self) -> ServiceStatus {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            ServiceState::Uninitialized => ServiceStatus::Uninitialized,
            ServiceState::Initializing => ServiceStatus::Initializing,
            ServiceState::Ready(_) => ServiceStatus::Ready,
        }
    }

    fn set_state(&self, state: ServiceState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn engine(&self) -> Result<Arc<Engine>> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            ServiceState::Ready(engine) => Ok(engine.clone()),
            ServiceState::Initializing => Err(Error::NotReady("service is initializing".into())),
            ServiceState::Uninitialized => Err(Error::NotReady("service has not been initialized".into())),
        }
    }

    /// Bring the index up to date and make the service searchable.
    ///
    /// Concurrent callers queue on one lock; whoever comes second finds the
    /// service ready and returns. Calling again with the same notes directory
    /// and backends is a no-op (`Ok(None)`) unless `full_rebuild` is set, which
    /// rebuilds on the running engine; anything else builds a new engine.
    /// Returns the report of the index run this call performed.
    pub async fn initialize(&self, options: ServiceOptions) -> Result<Option<IndexReport>> {
        let _guard = self.init_lock.lock().await;
        options.config.validate()?;
        let fingerprint = options.fingerprint();
        if let Ok(engine) = self.engine() {
            if engine.config.notes_dir == options.config.notes_dir && engine.fingerprint == fingerprint {
                if !options.full_rebuild {
                    debug!(notes_dir = %options.config.notes_dir.display(), "service already initialized");
                    return Ok(None);
                }
                let report = engine.indexer.index_all(options.progress).await?;
                engine.retriever.load_from_store(engine.store.as_ref()).await?;
                log_report(&report);
                return Ok(Some(report));
            }
            info!(notes_dir = %options.config.notes_dir.display(), "re-initializing service");
        }

        self.set_state(ServiceState::Initializing);
        match Self::build_engine(options, fingerprint).await {
            Ok((engine, report)) => {
                self.set_state(ServiceState::Ready(Arc::new(engine)));
                Ok(Some(report))
            }
            Err(err) => {
                self.set_state(ServiceState::Uninitialized);
                Err(err)
            }
        }
    }

    async fn build_engine(options: ServiceOptions, fingerprint: String) -> Result<(Engine, IndexReport)> {
        let ServiceOptions { config, store, embedder, full_rebuild, progress } = options;
        let store = store.build(&config);
        store.initialize().await?;
        let embedder = embedder.build(&config.embedding)?;
        let indexer = Indexer::new(&config, store.clone(), embedder.clone())?;

        let report = if full_rebuild || store.count().await? == 0 {
            indexer.index_all(progress).await?
        } else {
            match store.dimension().await? {
                Some(stored) if stored != embedder.dimension() => {
                    warn!(stored, provider = embedder.dimension(), "embedding dimension changed, clearing store");
                    store.clear().await?;
                    indexer.index_all(progress).await?
                }
                _ => indexer.index_incremental(progress).await?,
            }
        };
        log_report(&report);

        let retriever = HybridRetriever::new(&config.notes_dir, embedder.clone(), WikiLinkAnalyzer::shared());
        retriever.load_from_store(store.as_ref()).await?;
        info!(
            notes_dir = %config.notes_dir.display(),
            model = %embedder.model_id(),
            "service ready"
        );
        Ok((Engine { config, fingerprint, store, embedder, indexer, retriever }, report))
    }

    /// Search with `options`, or the configured defaults when `None`.
    pub async fn search(&self, query: &str, options: Option<SearchOptions>) -> Result<Vec<RagSearchResult>> {
        let engine = self.engine()?;
        let options = options.unwrap_or_else(|| engine.config.retrieval.clone());
        options.validate()?;
        let results = engine.retriever.retrieve(query, &options).await?;
        let tokenizer = KeywordTokenizer::new();
        let terms = query_terms(&tokenizer, query);
        Ok(results.into_iter().map(|r| to_search_result(r, &terms)).collect())
    }

    /// Raw note-level results with every contributing chunk.
    pub async fn retrieve(&self, query: &str, options: &SearchOptions) -> Result<Vec<RetrievalResult>> {
        let engine = self.engine()?;
        engine.retriever.retrieve(query, options).await
    }

    /// Rebuild the whole index from the notes directory.
    pub async fn reindex(&self, on_progress: Option<ProgressCallback>) -> Result<IndexReport> {
        let engine = self.engine()?;
        let report = engine.indexer.index_all(on_progress).await?;
        engine.retriever.load_from_store(engine.store.as_ref()).await?;
        log_report(&report);
        Ok(report)
    }

    /// Re-index only what changed since the last run.
    pub async fn refresh(&self, on_progress: Option<ProgressCallback>) -> Result<IndexReport> {
        let engine = self.engine()?;
        let report = engine.indexer.index_incremental(on_progress).await?;
        if report.changed() {
            engine.retriever.load_from_store(engine.store.as_ref()).await?;
        }
        log_report(&report);
        Ok(report)
    }

    pub async fn index_note(&self, path: &Path) -> Result<IndexReport> {
        let engine = self.engine()?;
        let report = engine.indexer.index_note(path).await?;
        engine.retriever.load_from_store(engine.store.as_ref()).await?;
        Ok(report)
    }

    pub async fn remove_note(&self, path: &Path) -> Result<IndexReport> {
        let engine = self.engine()?;
        let report = engine.indexer.remove_note(path).await?;
        engine.retriever.load_from_store(engine.store.as_ref()).await?;
        Ok(report)
    }

    pub async fn get_stats(&self) -> Result<IndexStats> {
        let engine = self.engine()?;
        let documents = engine.store.get_all_documents().await?;
        let note_count = documents.iter().map(|d| d.note_id.as_str()).collect::<HashSet<_>>().len();
        Ok(IndexStats { document_count: documents.len(), note_count })
    }

    pub fn get_embedding_model_id(&self) -> Result<String> {
        Ok(self.engine()?.embedder.model_id().to_string())
    }

    pub fn config(&self) -> Result<RagConfig> {
        Ok(self.engine()?.config.clone())
    }
}

fn log_report(report: &IndexReport) {
    info!(
        full = report.full_rebuild,
        added = report.notes_added,
        updated = report.notes_updated,
        removed = report.notes_removed,
        unchanged = report.notes_unchanged,
        errors = report.errors.len(),
        "index updated"
    );
}

fn to_search_result(result: RetrievalResult, terms: &[String]) -> RagSearchResult {
    let content = result.chunks.into_iter().next().map(|c| c.content).unwrap_or_default();
    let highlights = highlight_lines(&content, terms);
    RagSearchResult {
        note_path: result.note_path,
        title: result.note_title,
        content,
        base_score: result.base_score,
        final_score: result.final_score,
        highlights,
    }
}

fn highlight_lines(content: &str, terms: &[String]) -> Vec<String> {
    if terms.is_empty() {
        return Vec::new();
    }
    content
        .lines()
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .take(MAX_HIGHLIGHTS)
        .map(str::to_string)
        .collect()
}
