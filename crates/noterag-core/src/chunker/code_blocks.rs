//! Fenced code block detection and placeholder masking.
//!
//! Every fenced block is swapped for a short unique token before sections and
//! sentences are cut, so nothing downstream can split a block or mistake a
//! `# comment` inside it for a heading. Positions in the masked text map back
//! to the original through [`MaskedText::to_original`].

use std::ops::Range;

const TOKEN_OPEN: char = '\u{E000}';
const TOKEN_CLOSE: char = '\u{E001}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CodeBlock {
    pub range: Range<usize>,
    pub language: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Placeholder {
    pub masked: Range<usize>,
    pub original: Range<usize>,
    pub language: Option<String>,
    /// Character length of the original block.
    pub char_len: usize,
}

pub(crate) struct MaskedText<'a> {
    original: &'a str,
    pub text: String,
    pub placeholders: Vec<Placeholder>,
}

impl<'a> MaskedText<'a> {
    pub(crate) fn new(original: &'a str) -> Self {
        let blocks = find_fenced_blocks(original);
        let mut text = String::with_capacity(original.len());
        let mut placeholders = Vec::with_capacity(blocks.len());
        let mut cursor = 0usize;
        for (n, block) in blocks.into_iter().enumerate() {
            text.push_str(&original[cursor..block.range.start]);
            let token = format!("{TOKEN_OPEN}CODE_BLOCK_{n}{TOKEN_CLOSE}");
            let masked_start = text.len();
            text.push_str(&token);
            placeholders.push(Placeholder {
                masked: masked_start..text.len(),
                char_len: original[block.range.clone()].chars().count(),
                original: block.range.clone(),
                language: block.language,
            });
            cursor = block.range.end;
        }
        text.push_str(&original[cursor..]);
        Self { original, text, placeholders }
    }

    /// No masking; used when code block preservation is disabled.
    pub(crate) fn plain(original: &'a str) -> Self {
        Self { original, text: original.to_string(), placeholders: Vec::new() }
    }

    pub(crate) fn original(&self) -> &'a str {
        self.original
    }

    /// Map a masked byte position to the original text. Positions never fall inside
    /// a token because tokens are atomic units.
    pub(crate) fn to_original(&self, pos: usize) -> usize {
        let mut delta: isize = 0;
        for ph in &self.placeholders {
            if pos <= ph.masked.start {
                break;
            }
            if pos < ph.masked.end {
                return ph.original.start;
            }
            delta = ph.original.end as isize - ph.masked.end as isize;
        }
        pos.saturating_add_signed(delta)
    }

    /// Character length of a masked range measured in the original text.
    pub(crate) fn char_len(&self, range: Range<usize>) -> usize {
        let start = self.to_original(range.start);
        let end = self.to_original(range.end);
        self.original.get(start..end).map_or(0, |s| s.chars().count())
    }

    pub(crate) fn placeholders_in(&self, range: &Range<usize>) -> impl Iterator<Item = &Placeholder> {
        let range = range.clone();
        self.placeholders
            .iter()
            .filter(move |ph| ph.masked.start >= range.start && ph.masked.end <= range.end)
    }

    pub(crate) fn placeholder_at(&self, pos: usize) -> Option<(usize, &Placeholder)> {
        self.placeholders.iter().enumerate().find(|(_, ph)| ph.masked.start == pos)
    }
}

struct Fence {
    marker: char,
    len: usize,
}

fn strip_indent(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    (indent <= 3).then(|| &line[indent..])
}

fn opening_fence(line: &str) -> Option<(Fence, Option<String>, usize)> {
    let rest = strip_indent(line)?;
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let info = rest[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    let language = info.split_whitespace().next().map(str::to_string);
    let indent = line.len() - rest.len();
    Some((Fence { marker, len }, language, indent))
}

fn closes(line: &str, fence: &Fence) -> bool {
    let Some(rest) = strip_indent(line) else { return false };
    let run = rest.chars().take_while(|c| *c == fence.marker).count();
    run >= fence.len && rest[run * fence.marker.len_utf8()..].trim().is_empty()
}

/// Byte ranges of fenced blocks, from the opening fence to the end of the
/// closing fence. An unclosed fence runs to the end of the text.
pub(crate) fn find_fenced_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut lines = line_spans(text).into_iter();
    while let Some((start, end)) = lines.next() {
        let Some((fence, language, indent)) = opening_fence(&text[start..end]) else { continue };
        let block_start = start + indent;
        let mut block_end = text.trim_end().len().max(block_start);
        for (s, e) in lines.by_ref() {
            let line = &text[s..e];
            if closes(line, &fence) {
                block_end = s + line.trim_end().len();
                break;
            }
        }
        blocks.push(CodeBlock { range: block_start..block_end, language });
    }
    blocks
}

/// `(start, end)` of each line, excluding the newline.
pub(crate) fn line_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            let end = if i > start && text.as_bytes()[i - 1] == b'\r' { i - 1 } else { i };
            spans.push((start, end));
            start = i + 1;
        }
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_backtick_and_tilde_blocks() {
        let text = "intro\n```rust\nfn main() {}\n```\nmid\n~~~~ python\nprint(1)\n~~~~\nend";
        let blocks = find_fenced_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(&text[blocks[0].range.clone()], "```rust\nfn main() {}\n```");
        assert_eq!(blocks[0].language.as_deref(), Some("rust"));
        assert_eq!(&text[blocks[1].range.clone()], "~~~~ python\nprint(1)\n~~~~");
        assert_eq!(blocks[1].language.as_deref(), Some("python"));
    }

    #[test]
    fn unclosed_fence_runs_to_end() {
        let text = "a\n```\nopen forever\n";
        let blocks = find_fenced_blocks(text);
        assert_eq!(&text[blocks[0].range.clone()], "```\nopen forever");
        assert_eq!(blocks[0].language, None);
    }

    #[test]
    fn masked_positions_map_back() {
        let text = "before\n```sh\n# not a heading\n```\nafter";
        let masked = MaskedText::new(text);
        assert!(!masked.text.contains("# not a heading"));
        let after = masked.text.find("after").expect("after");
        assert_eq!(&text[masked.to_original(after)..], "after");
        let ph = &masked.placeholders[0];
        assert_eq!(masked.to_original(ph.masked.start), ph.original.start);
        assert_eq!(masked.to_original(ph.masked.end), ph.original.end);
        assert_eq!(masked.char_len(0..masked.text.len()), text.chars().count());
    }
}
