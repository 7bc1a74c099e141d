use noterag_text::{query_terms, KeywordIndex, KeywordTokenizer};

fn index(chunks: &[(&'static str, &'static str)]) -> (KeywordTokenizer, KeywordIndex) {
	let tokenizer = KeywordTokenizer::new();
	let index = KeywordIndex::build(&tokenizer, chunks.iter().copied());
	(tokenizer, index)
}

#[test]
fn matching_chunks_score_and_others_do_not() {
	let (tok, idx) = index(&[
		("n1", "Solar panels charge the battery bank during the day."),
		("n2", "Rainwater is filtered through sand and charcoal."),
		("n3", "Battery maintenance checklist for winter."),
	]);
	let hits = idx.search(&tok, "battery");
	let positions: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
	assert_eq!(positions, vec![0, 2]);
	assert!(hits.iter().all(|(_, s)| *s > 0.0));
	assert!(idx.search(&tok, "volcano").is_empty());
	assert!(idx.search(&tok, "a an of").is_empty(), "short tokens are dropped");
}

#[test]
fn rarer_terms_weigh_more() {
	let (tok, idx) = index(&[
		("n1", "garden compost garden"),
		("n2", "garden tools"),
		("n3", "garden compost worms"),
		("n4", "worms"),
	]);
	let terms = query_terms(&tok, "garden");
	let garden_only = idx.score_chunk(1, &terms);
	let terms = query_terms(&tok, "tools");
	let tools_only = idx.score_chunk(1, &terms);
	assert!(tools_only > garden_only, "tools appears in one note, garden in three");
}

#[test]
fn document_frequency_counts_notes_not_chunks() {
	// the same term split over many chunks of one note counts once
	let (tok, idx) = index(&[
		("long", "pumps"),
		("long", "pumps"),
		("long", "pumps"),
		("other", "valves"),
	]);
	assert_eq!(idx.note_count(), 2);
	let (tok2, idx2) = index(&[("long", "pumps"), ("other", "valves")]);
	let a = idx.score_chunk(0, &query_terms(&tok, "pumps"));
	let b = idx2.score_chunk(0, &query_terms(&tok2, "pumps"));
	assert!((a - b).abs() < 1e-6);
}

#[test]
fn repeated_query_terms_count_once() {
	let (tok, idx) = index(&[("n1", "water filter"), ("n2", "water tank")]);
	let once = idx.search(&tok, "filter");
	let twice = idx.search(&tok, "filter filter FILTER");
	assert_eq!(once, twice);
}
