//! Domain types shared by the chunker, the stores and the retriever.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type NoteId = String;

/// Heading that opens a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub heading: Option<ChunkHeading>,
    pub has_code_block: bool,
    /// Languages of the fenced blocks in this chunk, comma-joined in order of appearance.
    pub code_languages: Option<String>,
}

/// A contiguous span of one note's body treated as a retrievable unit.
///
/// `start_offset`/`end_offset` are UTF-16 code-unit indices into the original
/// note text (frontmatter included), so `utf16_slice(note, start, end)`
/// recovers exactly `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub index: usize,
    pub metadata: ChunkMetadata,
}

/// Note-level metadata copied onto every persisted chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub note_type: Option<String>,
    pub tags: Vec<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub connection_count: u32,
}

/// The persisted unit: one embedded chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub note_id: NoteId,
    pub note_path: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

impl VectorDocument {
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// A store search hit. `distance` is store-native; lower is closer.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub document: VectorDocument,
    pub distance: f32,
}

/// One contributing chunk inside a [`RetrievalResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub content: String,
    pub score: f32,
    pub chunk_index: usize,
}

/// Note-level aggregate returned by the retriever for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub note_id: NoteId,
    pub note_path: String,
    pub note_title: String,
    /// Sorted by score, best first.
    pub chunks: Vec<ScoredChunk>,
    /// Blend of vector and keyword scores before any centrality boost, in [0, 1].
    pub base_score: f32,
    /// Ranking score after the graph rerank; may exceed 1.
    pub final_score: f32,
    pub confidence: f32,
    pub graph_centrality: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklinkEntry {
    pub source_path: String,
    pub source_title: String,
}

/// Link structure of the corpus.
///
/// `backlinks` is keyed by normalized note title, `forward_links` by the
/// corpus-relative path of the linking note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteGraphStats {
    pub backlinks: HashMap<String, Vec<BacklinkEntry>>,
    pub forward_links: HashMap<String, Vec<String>>,
    pub note_count: usize,
}

/// Stable note identity derived from the corpus-relative path.
pub fn note_id_for(note_path: &str) -> NoteId {
    let hash = blake3::hash(note_path.as_bytes()).to_hex();
    hash.as_str()[..16].to_string()
}

pub fn document_id(note_id: &str, chunk_index: usize) -> String {
    format!("{note_id}:{chunk_index}")
}

/// Lowercase and collapse whitespace; the form used to match link targets to titles.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
