//! Shared building blocks for noterag: data model, error taxonomy, layered
//! configuration, the markdown chunker and the store/provider/graph contracts.
//!
//! Configuration uses Figment to merge `config.toml` + `config.<env>.toml` +
//! `APP_*` env vars, with helpers to expand `~` and `${VAR}` in paths.

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod frontmatter;
pub mod graph;
pub mod traits;
pub mod types;

pub use chunker::{utf16_slice, Chunker, ChunkerConfig};
pub use config::{Config, RagConfig, RetrievalConfig, SearchMode};
pub use error::{Error, Result};
pub use graph::{extract_links, WikiLinkAnalyzer};
pub use traits::{EmbeddingProvider, GraphAnalyzer, VectorStore};
pub use types::*;
