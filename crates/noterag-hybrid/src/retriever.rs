//! Hybrid retrieval: dense similarity and BM25 fused per note, reranked by
//! link-graph centrality.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use noterag_core::config::{RetrievalConfig, SearchMode};
use noterag_core::error::{Error, Result};
use noterag_core::traits::{EmbeddingProvider, GraphAnalyzer, VectorStore};
use noterag_core::types::{NoteId, RetrievalResult, ScoredChunk, VectorDocument};
use noterag_text::KeywordTokenizer;
use noterag_vector::cosine_similarity;

use crate::context::expand_chunk;
use crate::snapshot::IndexSnapshot;

/// Multiplier on `top_k` for the number of vector hits considered before aggregation.
const VECTOR_CANDIDATE_FACTOR: usize = 3;

pub struct HybridRetriever {
    notes_dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    graph: Arc<dyn GraphAnalyzer>,
    tokenizer: KeywordTokenizer,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
}

/// Per-note accumulator; notes keep the order in which they were first seen.
struct NoteHits {
    note_id: NoteId,
    note_path: String,
    title: String,
    chunks: Vec<ScoredChunk>,
    vector: f32,
    keyword: f32,
}

impl NoteHits {
    fn new(doc: &VectorDocument) -> Self {
        Self {
            note_id: doc.note_id.clone(),
            note_path: doc.note_path.clone(),
            title: doc.metadata.title.clone(),
            chunks: Vec::new(),
            vector: 0.0,
            keyword: 0.0,
        }
    }

    fn add_chunk(&mut self, doc: &VectorDocument, score: f32) {
        match self.chunks.iter_mut().find(|c| c.chunk_index == doc.chunk_index) {
            Some(existing) => existing.score = existing.score.max(score),
            None => self.chunks.push(ScoredChunk { content: doc.content.clone(), score, chunk_index: doc.chunk_index }),
        }
    }
}

impl HybridRetriever {
    pub fn new(notes_dir: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>, graph: Arc<dyn GraphAnalyzer>) -> Self {
        Self {
            notes_dir: notes_dir.into(),
            embedder,
            graph,
            tokenizer: KeywordTokenizer::new(),
            snapshot: RwLock::new(None),
        }
    }

    /// Replace the searchable snapshot. Re-analyzes the link graph so
    /// centrality reflects the corpus as it is now.
    pub async fn load_index(&self, documents: Vec<VectorDocument>) -> Result<()> {
        let graph = self.graph.analyze(&self.notes_dir, false).await?;
        let tokenizer = self.tokenizer.clone();
        let snapshot = tokio::task::spawn_blocking(move || IndexSnapshot::build(documents, graph, &tokenizer))
            .await
            .map_err(|e| Error::store(format!("snapshot build panicked: {e}")))?;
        info!(documents = snapshot.documents.len(), notes = snapshot.note_count(), "retriever index loaded");
        *self.snapshot.write().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(snapshot));
        Ok(())
    }

    /// Load every document currently held by `store`.
    pub async fn load_from_store(&self, store: &dyn VectorStore) -> Result<()> {
        let documents = store.get_all_documents().await?;
        self.load_index(documents).await
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| Error::NotReady("retriever index has not been loaded".into()))
    }

    pub async fn retrieve(&self, query: &str, config: &RetrievalConfig) -> Result<Vec<RetrievalResult>> {
        let snapshot = self.snapshot()?;
        let candidates = config.top_k.saturating_mul(VECTOR_CANDIDATE_FACTOR);
        let (vector_hits, keyword_hits) = match config.mode {
            SearchMode::Hybrid => {
                let (v, k) = tokio::join!(
                    self.vector_search(&snapshot, query, candidates),
                    self.keyword_search(snapshot.clone(), query)
                );
                (v?, k?)
            }
            SearchMode::Semantic => (self.vector_search(&snapshot, query, candidates).await?, Vec::new()),
            SearchMode::Keyword => (Vec::new(), self.keyword_search(snapshot.clone(), query).await?),
        };
        debug!(vector = vector_hits.len(), keyword = keyword_hits.len(), mode = ?config.mode, "retrieval candidates");

        let mut results = aggregate(&snapshot, &vector_hits, &keyword_hits, config);
        if config.context_expansion {
            for result in &mut results {
                let Some(top) = result.chunks.first_mut() else { continue };
                if let Some(wider) = expand_chunk(&self.notes_dir, &result.note_path, &top.content, config.context_lines).await {
                    top.content = wider;
                }
            }
        }
        Ok(results)
    }

    /// `(document position, cosine similarity)`, best first.
    async fn vector_search(&self, snapshot: &IndexSnapshot, query: &str, limit: usize) -> Result<Vec<(usize, f32)>> {
        if snapshot.documents.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).await?;
        if let Some(dim) = snapshot.dimension() {
            if dim != query_vec.len() {
                return Err(Error::DimensionMismatch { expected: dim, actual: query_vec.len() });
            }
        }
        let mut scored: Vec<(usize, f32)> = snapshot
            .documents
            .iter()
            .enumerate()
            .map(|(i, d)| (i, cosine_similarity(&query_vec, &d.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// `(document position, raw BM25)` for every matching chunk.
    async fn keyword_search(&self, snapshot: Arc<IndexSnapshot>, query: &str) -> Result<Vec<(usize, f32)>> {
        let tokenizer = self.tokenizer.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || snapshot.keywords.search(&tokenizer, &query))
            .await
            .map_err(|e| Error::store(format!("keyword search panicked: {e}")))
    }
}

fn slot<'a>(by_note: &mut HashMap<&'a str, usize>, order: &mut Vec<NoteHits>, doc: &'a VectorDocument) -> usize {
    *by_note.entry(doc.note_id.as_str()).or_insert_with(|| {
        order.push(NoteHits::new(doc));
        order.len() - 1
    })
}

/// Merge chunk hits into ranked note results.
///
/// `base_score` is the weighted blend and never changes after this point;
/// the centrality boost only touches `final_score`.
pub fn aggregate(
    snapshot: &IndexSnapshot,
    vector_hits: &[(usize, f32)],
    keyword_hits: &[(usize, f32)],
    config: &RetrievalConfig,
) -> Vec<RetrievalResult> {
    let mut order: Vec<NoteHits> = Vec::new();
    let mut by_note: HashMap<&str, usize> = HashMap::new();

    for &(pos, similarity) in vector_hits {
        let doc = &snapshot.documents[pos];
        let score = similarity.clamp(0.0, 1.0);
        let i = slot(&mut by_note, &mut order, doc);
        let note = &mut order[i];
        note.vector = note.vector.max(score);
        note.add_chunk(doc, score);
    }

    let max_bm25 = keyword_hits.iter().map(|(_, s)| *s).fold(0.0f32, f32::max);
    if max_bm25 > 0.0 {
        let mut ranked: Vec<(usize, f32)> = keyword_hits.to_vec();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (pos, bm25) in ranked {
            let doc = &snapshot.documents[pos];
            let score = bm25 / max_bm25;
            let i = slot(&mut by_note, &mut order, doc);
            let note = &mut order[i];
            note.keyword = note.keyword.max(score);
            note.add_chunk(doc, score);
        }
    }

    let w = config.keyword_weight();
    let mut results: Vec<RetrievalResult> = order
        .into_iter()
        .map(|mut note| {
            let centrality = snapshot.centrality_of(&note.note_id);
            let base = (1.0 - w) * note.vector + w * note.keyword;
            let confidence = (0.5 * note.vector + 0.3 * note.keyword + 0.2 * centrality).clamp(0.0, 1.0);
            let final_score = if config.graph_rerank { base * (1.0 + centrality * config.boost_factor) } else { base };
            note.chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            RetrievalResult {
                note_id: note.note_id,
                note_path: note.note_path,
                note_title: note.title,
                chunks: note.chunks,
                base_score: base,
                final_score,
                confidence,
                graph_centrality: centrality,
            }
        })
        .filter(|r| r.base_score >= config.min_score)
        .collect();

    results.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(config.top_k);
    results
}
