//! Vector stores: an in-memory brute-force store and a LanceDB columnar store,
//! both behind `noterag_core::traits::VectorStore`.

pub mod lance;
pub mod memory;
pub mod schema;

pub use lance::LanceVectorStore;
pub use memory::{cosine_similarity, MemoryVectorStore};
