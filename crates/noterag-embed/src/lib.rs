//! Embedding providers: the local BGE-M3 model and the deterministic hashing embedder.

use std::sync::Arc;

use tracing::info;

use noterag_core::config::{use_fake_embeddings, EmbeddingBackendKind, EmbeddingSettings};
use noterag_core::error::{Error, Result};
use noterag_core::traits::EmbeddingProvider;

pub mod device;
pub mod hashing;
pub mod local;
pub mod pool;
pub mod tokenize;

pub use hashing::HashingEmbedder;
pub use local::{resolve_model_dir, LocalEmbedder};
pub use pool::masked_mean_l2;

/// Build the provider named by `settings`. `APP_USE_FAKE_EMBEDDINGS=1` always
/// selects the hashing embedder.
pub fn provider_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    if use_fake_embeddings() || settings.backend == EmbeddingBackendKind::Hashing {
        info!(dimension = settings.dimension, "using hashing embedder");
        return Ok(Arc::new(HashingEmbedder::new(settings.dimension)));
    }
    let model_dir = resolve_model_dir(settings.model_dir.as_deref()).map_err(|e| Error::provider(format!("{e:#}")))?;
    let embedder = LocalEmbedder::load(&model_dir, settings.max_length).map_err(|e| Error::provider(format!("{e:#}")))?;
    Ok(Arc::new(embedder))
}
