use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer, TokenStream};

/// Tokens of this many characters or fewer carry no keyword signal.
pub const MIN_TOKEN_CHARS: usize = 3;

/// Lowercasing, punctuation-stripping analyzer shared by indexing and querying.
#[derive(Clone)]
pub struct KeywordTokenizer {
	analyzer: TextAnalyzer,
}

impl Default for KeywordTokenizer {
	fn default() -> Self {
		let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(RemoveLongFilter::limit(64))
			.filter(LowerCaser)
			.build();
		Self { analyzer }
	}
}

impl KeywordTokenizer {
	pub fn new() -> Self { Self::default() }

	pub fn tokenize(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.analyzer.clone();
		let mut stream = analyzer.token_stream(text);
		let mut tokens = Vec::new();
		while stream.advance() {
			let token = &stream.token().text;
			if token.chars().count() >= MIN_TOKEN_CHARS {
				tokens.push(token.clone());
			}
		}
		tokens
	}
}

/// Convenience wrapper over a default [`KeywordTokenizer`].
pub fn tokenize(text: &str) -> Vec<String> {
	KeywordTokenizer::default().tokenize(text)
}
