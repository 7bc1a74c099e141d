//! Query side of noterag: vector and keyword search over an in-memory
//! snapshot of the index, merged per note and boosted by link centrality.

pub mod context;
pub mod retriever;
pub mod snapshot;

pub use retriever::{aggregate, HybridRetriever};
pub use snapshot::{degree_centrality, IndexSnapshot};
