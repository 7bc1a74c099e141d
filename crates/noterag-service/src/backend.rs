//! Which vector store and embedding provider the service runs on.

use std::fmt;
use std::sync::Arc;

use noterag_core::config::{use_fake_embeddings, EmbeddingBackendKind, EmbeddingSettings, RagConfig, StoreBackendKind};
use noterag_core::error::Result;
use noterag_core::traits::{EmbeddingProvider, VectorStore};
use noterag_embed::{provider_from_settings, HashingEmbedder};
use noterag_index::ProgressCallback;
use noterag_vector::{LanceVectorStore, MemoryVectorStore};

#[derive(Clone)]
pub enum StoreBackend {
    /// LanceDB under `<notes>/.noterag/vectors`.
    Lance,
    Memory,
    /// A caller-owned store, e.g. one shared between service instances in tests.
    Shared(Arc<dyn VectorStore>),
}

impl StoreBackend {
    pub fn from_kind(kind: StoreBackendKind) -> Self {
        match kind {
            StoreBackendKind::Lance => Self::Lance,
            StoreBackendKind::Memory => Self::Memory,
        }
    }

    pub fn build(&self, config: &RagConfig) -> Arc<dyn VectorStore> {
        match self {
            Self::Lance => Arc::new(LanceVectorStore::new(config.vectors_dir())),
            Self::Memory => Arc::new(MemoryVectorStore::new()),
            Self::Shared(store) => store.clone(),
        }
    }

    pub fn fingerprint(&self, config: &RagConfig) -> String {
        match self {
            Self::Lance => format!("lance:{}", config.vectors_dir().display()),
            Self::Memory => "memory".to_string(),
            Self::Shared(store) => format!("shared:{:p}", Arc::as_ptr(store)),
        }
    }
}

impl fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lance => f.write_str("Lance"),
            Self::Memory => f.write_str("Memory"),
            Self::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

#[derive(Clone)]
pub enum EmbedderBackend {
    /// The local transformer model from `embedding.model_dir`.
    Local,
    /// Deterministic hashing embedder of `embedding.dimension` floats.
    Hashing,
    Shared(Arc<dyn EmbeddingProvider>),
}

impl EmbedderBackend {
    /// Honors `APP_USE_FAKE_EMBEDDINGS`.
    pub fn from_kind(kind: EmbeddingBackendKind) -> Self {
        if use_fake_embeddings() {
            return Self::Hashing;
        }
        match kind {
            EmbeddingBackendKind::Local => Self::Local,
            EmbeddingBackendKind::Hashing => Self::Hashing,
        }
    }

    pub fn build(&self, settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
        match self {
            Self::Local => {
                let settings = EmbeddingSettings { backend: EmbeddingBackendKind::Local, ..settings.clone() };
                provider_from_settings(&settings)
            }
            Self::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimension))),
            Self::Shared(provider) => Ok(provider.clone()),
        }
    }

    /// Changes whenever the vectors this backend produces could change.
    pub fn fingerprint(&self, settings: &EmbeddingSettings) -> String {
        match self {
            Self::Local => {
                let dir = settings.model_dir.as_ref().map(|d| d.display().to_string()).unwrap_or_default();
                format!("local:{dir}:{}", settings.max_length)
            }
            Self::Hashing => format!("hashing:d{}", settings.dimension),
            Self::Shared(provider) => format!("shared:{}:d{}", provider.model_id(), provider.dimension()),
        }
    }
}

impl fmt::Debug for EmbedderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            Self::Hashing => f.write_str("Hashing"),
            Self::Shared(p) => write!(f, "Shared({})", p.model_id()),
        }
    }
}

/// Everything `RagService::initialize` needs.
#[derive(Clone)]
pub struct ServiceOptions {
    pub config: RagConfig,
    pub store: StoreBackend,
    pub embedder: EmbedderBackend,
    /// Rebuild the whole index instead of syncing changes. Not part of the fingerprint.
    pub full_rebuild: bool,
    /// Progress of the startup index run.
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("notes_dir", &self.config.notes_dir)
            .field("store", &self.store)
            .field("embedder", &self.embedder)
            .field("full_rebuild", &self.full_rebuild)
            .finish_non_exhaustive()
    }
}

impl ServiceOptions {
    /// Backends chosen by the `storage.backend` and `embedding.backend` settings.
    pub fn from_config(config: RagConfig) -> Self {
        let store = StoreBackend::from_kind(config.storage.backend);
        let embedder = EmbedderBackend::from_kind(config.embedding.backend);
        Self { config, store, embedder, full_rebuild: false, progress: None }
    }

    pub fn with_store(mut self, store: StoreBackend) -> Self {
        self.store = store;
        self
    }

    pub fn with_embedder(mut self, embedder: EmbedderBackend) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_full_rebuild(mut self, full_rebuild: bool) -> Self {
        self.full_rebuild = full_rebuild;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}",
            self.store.fingerprint(&self.config),
            self.embedder.fingerprint(&self.config.embedding)
        )
    }
}
