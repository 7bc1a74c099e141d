//! noterag-text
//!
//! Keyword side of hybrid search: a tantivy analyzer pipeline for tokens and a
//! BM25 scorer over precomputed chunk statistics.

pub mod bm25;
pub mod tokenize;

pub use bm25::{query_terms, Bm25Params, KeywordIndex};
pub use tokenize::{tokenize, KeywordTokenizer};
