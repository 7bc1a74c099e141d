use async_trait::async_trait;
use tokio::sync::RwLock;

use noterag_core::error::{Error, Result};
use noterag_core::traits::VectorStore;
use noterag_core::types::{VectorDocument, VectorHit};

/// Cosine similarity, 0 when either vector is all zeros or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}
	let mut dot = 0f32;
	let mut na = 0f32;
	let mut nb = 0f32;
	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		na += x * x;
		nb += y * y;
	}
	if na == 0.0 || nb == 0.0 {
		return 0.0;
	}
	dot / (na.sqrt() * nb.sqrt())
}

/// Brute-force store kept entirely in memory. Used in tests and when
/// `storage.backend = "memory"`.
#[derive(Default)]
pub struct MemoryVectorStore {
	docs: RwLock<Vec<VectorDocument>>,
}

impl MemoryVectorStore {
	pub fn new() -> Self { Self::default() }
}

fn batch_dimension(documents: &[VectorDocument]) -> Result<Option<usize>> {
	let Some(first) = documents.first() else { return Ok(None) };
	let dim = first.dimension();
	if let Some(bad) = documents.iter().find(|d| d.dimension() != dim) {
		return Err(Error::DimensionMismatch { expected: dim, actual: bad.dimension() });
	}
	Ok(Some(dim))
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
	async fn initialize(&self) -> Result<()> { Ok(()) }

	async fn add(&self, documents: &[VectorDocument]) -> Result<()> {
		let Some(dim) = batch_dimension(documents)? else { return Ok(()) };
		let mut docs = self.docs.write().await;
		if let Some(existing) = docs.first() {
			if existing.dimension() != dim {
				return Err(Error::DimensionMismatch { expected: existing.dimension(), actual: dim });
			}
		}
		docs.extend_from_slice(documents);
		Ok(())
	}

	async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
		let docs = self.docs.read().await;
		if let Some(existing) = docs.first() {
			if existing.dimension() != query.len() {
				return Err(Error::DimensionMismatch { expected: existing.dimension(), actual: query.len() });
			}
		}
		let mut hits: Vec<VectorHit> = docs
			.iter()
			.map(|d| VectorHit { distance: 1.0 - cosine_similarity(query, &d.embedding), document: d.clone() })
			.collect();
		hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
		hits.truncate(top_k);
		Ok(hits)
	}

	async fn delete(&self, ids: &[String]) -> Result<()> {
		let mut docs = self.docs.write().await;
		docs.retain(|d| !ids.contains(&d.id));
		Ok(())
	}

	async fn delete_by_note_path(&self, note_path: &str) -> Result<()> {
		self.docs.write().await.retain(|d| d.note_path != note_path);
		Ok(())
	}

	async fn clear(&self) -> Result<()> {
		self.docs.write().await.clear();
		Ok(())
	}

	async fn count(&self) -> Result<usize> { Ok(self.docs.read().await.len()) }

	async fn get_all_documents(&self) -> Result<Vec<VectorDocument>> { Ok(self.docs.read().await.clone()) }

	async fn dimension(&self) -> Result<Option<usize>> {
		Ok(self.docs.read().await.first().map(VectorDocument::dimension))
	}
}
