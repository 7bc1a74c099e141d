//! Immutable per-load view of the index used to answer queries.

use std::collections::{HashMap, HashSet};

use noterag_core::corpus::file_stem;
use noterag_core::types::{normalize_title, NoteGraphStats, NoteId, VectorDocument};
use noterag_text::{KeywordIndex, KeywordTokenizer};

pub struct IndexSnapshot {
    pub documents: Vec<VectorDocument>,
    pub keywords: KeywordIndex,
    pub graph: NoteGraphStats,
    pub centrality: HashMap<NoteId, f32>,
}

impl IndexSnapshot {
    pub fn build(documents: Vec<VectorDocument>, graph: NoteGraphStats, tokenizer: &KeywordTokenizer) -> Self {
        let keywords = KeywordIndex::build(tokenizer, documents.iter().map(|d| (d.note_id.as_str(), d.content.as_str())));
        let centrality = degree_centrality(&documents, &graph);
        Self { documents, keywords, graph, centrality }
    }

    /// Width of the stored vectors, taken from the first document.
    pub fn dimension(&self) -> Option<usize> {
        self.documents.first().map(VectorDocument::dimension)
    }

    pub fn centrality_of(&self, note_id: &str) -> f32 {
        self.centrality.get(note_id).copied().unwrap_or(0.0)
    }

    pub fn note_count(&self) -> usize {
        self.documents.iter().map(|d| d.note_id.as_str()).collect::<HashSet<_>>().len()
    }
}

/// In-degree (distinct notes linking to the note's title or file stem) plus
/// out-degree (its forward links), divided by the largest degree among the
/// indexed notes. All zeros when nothing links anywhere.
pub fn degree_centrality(documents: &[VectorDocument], graph: &NoteGraphStats) -> HashMap<NoteId, f32> {
    let mut degrees: HashMap<NoteId, usize> = HashMap::new();
    for doc in documents {
        if degrees.contains_key(&doc.note_id) {
            continue;
        }
        let mut keys = vec![normalize_title(&doc.metadata.title)];
        let stem = normalize_title(&file_stem(&doc.note_path));
        if !keys.contains(&stem) {
            keys.push(stem);
        }
        let sources: HashSet<&str> = keys
            .iter()
            .filter_map(|k| graph.backlinks.get(k))
            .flatten()
            .map(|entry| entry.source_path.as_str())
            .filter(|source| *source != doc.note_path)
            .collect();
        let out = graph.forward_links.get(&doc.note_path).map_or(0, Vec::len);
        degrees.insert(doc.note_id.clone(), sources.len() + out);
    }

    let max = degrees.values().copied().max().unwrap_or(0);
    degrees
        .into_iter()
        .map(|(id, degree)| {
            let c = if max == 0 { 0.0 } else { degree as f32 / max as f32 };
            (id, c)
        })
        .collect()
}
