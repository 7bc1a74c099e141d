//! Builds and maintains the chunk index for a notes directory.
//!
//! A full run clears the store and embeds every note; an incremental run
//! consults the manifest and only re-embeds notes whose content changed.

pub mod indexer;
pub mod manifest;

pub use indexer::{IndexError, IndexProgress, IndexReport, Indexer, ProgressCallback};
pub use manifest::{IndexManifest, NoteEntry};
