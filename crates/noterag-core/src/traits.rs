use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{NoteGraphStats, VectorDocument, VectorHit};

/// Text to fixed-dimension vectors.
///
/// Implementations must return vectors of `dimension()` floats for every input
/// and keep `model_id()` stable for a given model, since the index records it
/// to detect model swaps.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_id(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::Error::provider("provider returned no vector for query"))
    }
}

/// Storage contract shared by the in-memory and LanceDB stores.
///
/// `search` ranks by the store's own distance (ascending); callers needing
/// scores comparable with keyword scores compute similarity themselves.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn add(&self, documents: &[VectorDocument]) -> Result<()>;
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>>;
    async fn delete(&self, ids: &[String]) -> Result<()>;
    async fn delete_by_note_path(&self, note_path: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    async fn count(&self) -> Result<usize>;
    async fn get_all_documents(&self) -> Result<Vec<VectorDocument>>;
    /// Dimensionality of the stored vectors, `None` while empty.
    async fn dimension(&self) -> Result<Option<usize>>;
}

/// Derives link structure from the corpus.
#[async_trait]
pub trait GraphAnalyzer: Send + Sync {
    /// When `reuse_cache` is set, a previous analysis of the same directory may be returned.
    async fn analyze(&self, notes_dir: &Path, reuse_cache: bool) -> Result<NoteGraphStats>;
}
