//! noterag-service
//!
//! Process-level entry point: one [`RagService`] per notes directory that
//! indexes on startup and answers searches once ready.

pub mod backend;
pub mod service;

pub use backend::{EmbedderBackend, ServiceOptions, StoreBackend};
pub use noterag_index::{IndexProgress, IndexReport, ProgressCallback};
pub use service::{IndexStats, RagSearchResult, RagService, SearchOptions, ServiceStatus};
