//! Okapi BM25 over chunk token statistics.
//!
//! Document frequency is counted per note rather than per chunk, so a term
//! repeated across the chunks of one long note is not over-penalized.

use std::collections::{HashMap, HashSet};

use crate::tokenize::KeywordTokenizer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
	pub k1: f32,
	pub b: f32,
}

impl Default for Bm25Params {
	fn default() -> Self { Self { k1: 1.2, b: 0.75 } }
}

#[derive(Debug, Clone)]
struct ChunkTerms {
	term_freqs: HashMap<String, u32>,
	len: usize,
}

/// Precomputed token statistics for a fixed set of chunks.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
	chunks: Vec<ChunkTerms>,
	note_freqs: HashMap<String, usize>,
	note_count: usize,
	avg_len: f32,
	params: Bm25Params,
}

impl KeywordIndex {
	/// Build from `(note_id, content)` pairs; chunk positions follow input order.
	pub fn build<'a, I>(tokenizer: &KeywordTokenizer, chunks: I) -> Self
	where
		I: IntoIterator<Item = (&'a str, &'a str)>,
	{
		let mut note_terms: HashMap<&'a str, HashSet<String>> = HashMap::new();
		let mut terms = Vec::new();
		for (note_id, content) in chunks {
			let tokens = tokenizer.tokenize(content);
			let mut term_freqs: HashMap<String, u32> = HashMap::new();
			for token in &tokens {
				*term_freqs.entry(token.clone()).or_insert(0) += 1;
			}
			note_terms.entry(note_id).or_default().extend(term_freqs.keys().cloned());
			terms.push(ChunkTerms { term_freqs, len: tokens.len() });
		}

		let mut note_freqs: HashMap<String, usize> = HashMap::new();
		for set in note_terms.values() {
			for term in set {
				*note_freqs.entry(term.clone()).or_insert(0) += 1;
			}
		}
		let total: usize = terms.iter().map(|c| c.len).sum();
		let avg_len = if terms.is_empty() { 0.0 } else { total as f32 / terms.len() as f32 };
		tracing::debug!(chunks = terms.len(), notes = note_terms.len(), avg_len, "built keyword statistics");
		Self { chunks: terms, note_freqs, note_count: note_terms.len(), avg_len, params: Bm25Params::default() }
	}

	pub fn with_params(mut self, params: Bm25Params) -> Self {
		self.params = params;
		self
	}

	pub fn len(&self) -> usize { self.chunks.len() }

	pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

	pub fn note_count(&self) -> usize { self.note_count }

	fn idf(&self, term: &str) -> f32 {
		let df = self.note_freqs.get(term).copied().unwrap_or(0) as f32;
		let n = self.note_count as f32;
		(1.0 + (n - df + 0.5) / (df + 0.5)).ln()
	}

	/// BM25 score of one chunk for already-tokenized, de-duplicated query terms.
	pub fn score_chunk(&self, position: usize, query_terms: &[String]) -> f32 {
		let Some(chunk) = self.chunks.get(position) else { return 0.0 };
		if self.avg_len <= 0.0 {
			return 0.0;
		}
		let Bm25Params { k1, b } = self.params;
		let norm = 1.0 - b + b * chunk.len as f32 / self.avg_len;
		query_terms
			.iter()
			.filter_map(|term| chunk.term_freqs.get(term).map(|tf| (term, *tf as f32)))
			.map(|(term, tf)| self.idf(term) * tf * (k1 + 1.0) / (tf + k1 * norm))
			.sum()
	}

	/// Every chunk with a positive score, as `(position, score)` in chunk order.
	pub fn search(&self, tokenizer: &KeywordTokenizer, query: &str) -> Vec<(usize, f32)> {
		let terms = query_terms(tokenizer, query);
		if terms.is_empty() {
			return Vec::new();
		}
		(0..self.chunks.len())
			.map(|i| (i, self.score_chunk(i, &terms)))
			.filter(|(_, score)| *score > 0.0)
			.collect()
	}
}

/// Query tokens with duplicates removed, first occurrence kept.
pub fn query_terms(tokenizer: &KeywordTokenizer, query: &str) -> Vec<String> {
	let mut seen = HashSet::new();
	tokenizer.tokenize(query).into_iter().filter(|t| seen.insert(t.clone())).collect()
}
