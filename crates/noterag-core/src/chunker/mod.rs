//! Markdown-aware chunking.
//!
//! A note is cut into sections at headings, sections that are too long are
//! packed sentence by sentence, and fenced code blocks travel as single atomic
//! units. Offsets on the produced [`Chunk`]s are UTF-16 code units into the raw
//! note text, frontmatter included.

mod code_blocks;
mod offsets;
mod sentences;

pub use offsets::utf16_slice;

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::frontmatter::parse_note;
use crate::types::{Chunk, ChunkHeading, ChunkMetadata};
use code_blocks::{find_fenced_blocks, line_spans, MaskedText};
use offsets::Utf16Index;
use sentences::{char_units, sentence_units, Unit};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Upper bound on chunk length in characters.
    pub max_chunk_size: usize,
    /// Characters of the previous chunk repeated at the start of the next one.
    pub chunk_overlap: usize,
    pub preserve_headers: bool,
    /// Deepest heading level that opens a new section (1..=6).
    pub max_header_level: u8,
    pub preserve_sentences: bool,
    pub preserve_code_blocks: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            chunk_overlap: 200,
            preserve_headers: true,
            max_header_level: 3,
            preserve_sentences: true,
            preserve_code_blocks: true,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.max_chunk_size must be greater than 0".into()));
        }
        if self.chunk_overlap >= self.max_chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than max_chunk_size ({})",
                self.chunk_overlap, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

/// Overlap carried from a closed chunk into the next one.
struct Seed {
    start: usize,
    len: usize,
    /// First whole unit in the seed; equal to the next unit's index when the
    /// seed is a word-aligned tail of a single unit.
    first_unit: usize,
}

impl Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates sizes and clamps `max_header_level` into 1..=6.
    pub fn with_config(mut config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        config.max_header_level = config.max_header_level.clamp(1, 6);
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split a raw note into chunks. Never fails: if segmentation produces
    /// something inconsistent the whole body comes back as a single chunk.
    pub fn chunk(&self, raw: &str) -> Vec<Chunk> {
        match self.try_chunk(raw) {
            Some(chunks) => {
                debug!(chunks = chunks.len(), bytes = raw.len(), "chunked note");
                chunks
            }
            None => {
                warn!(bytes = raw.len(), "chunk offsets did not line up, falling back to whole note");
                whole_note(raw)
            }
        }
    }

    fn try_chunk(&self, raw: &str) -> Option<Vec<Chunk>> {
        let parsed = parse_note(raw);
        if parsed.body.trim().is_empty() {
            return Some(Vec::new());
        }
        let masked = if self.config.preserve_code_blocks {
            MaskedText::new(parsed.body)
        } else {
            MaskedText::plain(parsed.body)
        };

        let max = self.config.max_chunk_size;
        let mut pieces = Vec::new();
        for section in self.sections(&masked) {
            if masked.char_len(section.clone()) <= max {
                pieces.push(section);
                continue;
            }
            let units = if self.config.preserve_sentences {
                sentence_units(&masked, section, max)
            } else {
                char_units(&masked, section)
            };
            pieces.extend(self.pack(&masked, &units));
        }

        let utf16 = Utf16Index::new(raw);
        let body = masked.original();
        let mut chunks = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let start = masked.to_original(piece.start);
            let end = masked.to_original(piece.end);
            let slice = body.get(start..end)?;
            let content = slice.trim();
            if content.is_empty() {
                continue;
            }
            let abs_start = parsed.body_offset + start + (slice.len() - slice.trim_start().len());
            let abs_end = abs_start + content.len();
            if raw.get(abs_start..abs_end)? != content {
                return None;
            }
            let languages: Vec<Option<String>> = if self.config.preserve_code_blocks {
                masked.placeholders_in(&piece).map(|ph| ph.language.clone()).collect()
            } else {
                find_fenced_blocks(content).into_iter().map(|b| b.language).collect()
            };
            chunks.push(Chunk {
                content: content.to_string(),
                start_offset: utf16.to_utf16(abs_start),
                end_offset: utf16.to_utf16(abs_end),
                index: chunks.len(),
                metadata: chunk_metadata(content, languages),
            });
        }
        Some(chunks)
    }

    /// Section ranges in masked coordinates, cut at every heading up to
    /// `max_header_level` in the order headings occur.
    fn sections(&self, masked: &MaskedText<'_>) -> Vec<Range<usize>> {
        let text = &masked.text;
        if !self.config.preserve_headers {
            return vec![0..text.len()];
        }
        // only non-empty when code blocks are not masked
        let fenced = find_fenced_blocks(text);
        let mut cuts = vec![0];
        for (start, end) in line_spans(text) {
            if start == 0 || fenced.iter().any(|b| b.range.contains(&start)) {
                continue;
            }
            if let Some((level, _)) = parse_heading(&text[start..end]) {
                if level <= self.config.max_header_level {
                    cuts.push(start);
                }
            }
        }
        cuts.push(text.len());
        cuts.windows(2)
            .map(|w| w[0]..w[1])
            .filter(|r| !text[r.clone()].trim().is_empty())
            .collect()
    }

    /// Greedy packing of units into windows of at most `max_chunk_size`
    /// characters, each window after the first seeded with overlap.
    fn pack(&self, masked: &MaskedText<'_>, units: &[Unit]) -> Vec<Range<usize>> {
        let max = self.config.max_chunk_size;
        let mut pieces = Vec::new();
        let Some(head) = units.first() else { return pieces };
        let mut start = head.range.start;
        let mut len = 0usize;
        let mut first = 0usize;

        for (i, unit) in units.iter().enumerate() {
            if len > 0 && len + unit.len > max {
                pieces.push(start..units[i - 1].range.end);
                let mut seed = self.overlap_seed(masked, units, first, i);
                while let Some(s) = &seed {
                    if s.len + unit.len <= max {
                        break;
                    }
                    seed = if s.first_unit >= i {
                        None
                    } else {
                        let next = s.first_unit + 1;
                        (next < i).then(|| Seed {
                            start: units[next].range.start,
                            len: s.len - units[s.first_unit].len,
                            first_unit: next,
                        })
                    };
                }
                len = 0;
                if let Some(s) = seed {
                    start = s.start;
                    len = s.len;
                    first = s.first_unit;
                }
            }
            if len == 0 {
                start = unit.range.start;
                first = i;
            }
            len += unit.len;
        }
        if len > 0 {
            if let Some(last) = units.last() {
                pieces.push(start..last.range.end);
            }
        }
        pieces
    }

    /// The earliest whole unit whose suffix fits in the overlap budget, never
    /// reaching back past a code block. Falls back to a word-aligned tail of
    /// the last unit when no whole unit fits.
    fn overlap_seed(&self, masked: &MaskedText<'_>, units: &[Unit], first: usize, end: usize) -> Option<Seed> {
        let overlap = self.config.chunk_overlap;
        if overlap == 0 || end <= first {
            return None;
        }
        let floor = units[first..end]
            .iter()
            .rposition(|u| u.is_code)
            .map_or(first, |p| first + p + 1);

        let mut best = None;
        let mut suffix = 0usize;
        for k in (floor..end).rev() {
            suffix += units[k].len;
            if suffix > overlap {
                break;
            }
            best = Some(Seed { start: units[k].range.start, len: suffix, first_unit: k });
        }
        if best.is_some() {
            return best;
        }

        let last = &units[end - 1];
        if last.is_code {
            return None;
        }
        word_tail(&masked.text, last, overlap).map(|(start, len)| Seed { start, len, first_unit: end })
    }
}

/// Start of the first word in `unit` whose tail, to the end of the unit, is at
/// most `budget` characters.
fn word_tail(text: &str, unit: &Unit, budget: usize) -> Option<(usize, usize)> {
    let span = text.get(unit.range.clone())?;
    let total = span.chars().count();
    let mut prev_ws = false;
    for (seen, (i, c)) in span.char_indices().enumerate() {
        let remaining = total - seen;
        if prev_ws && !c.is_whitespace() && remaining <= budget {
            return Some((unit.range.start + i, remaining));
        }
        prev_ws = c.is_whitespace();
    }
    None
}

/// ATX heading: up to three spaces, 1-6 `#`, then whitespace or end of line.
fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let rest = line.trim_end();
    let indent = rest.len() - rest.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &rest[indent..];
    let hashes = rest.bytes().take_while(|b| *b == b'#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let after = &rest[hashes..];
    if !after.is_empty() && !after.starts_with([' ', '\t']) {
        return None;
    }
    let text = after.trim().trim_end_matches('#').trim_end();
    Some((hashes as u8, text))
}

fn chunk_metadata(content: &str, languages: Vec<Option<String>>) -> ChunkMetadata {
    let heading = content
        .lines()
        .next()
        .and_then(parse_heading)
        .filter(|(_, text)| !text.is_empty())
        .map(|(level, text)| ChunkHeading { level, text: text.to_string() });

    let has_code_block = !languages.is_empty();
    let mut seen: Vec<String> = Vec::new();
    for lang in languages.into_iter().flatten() {
        if !seen.contains(&lang) {
            seen.push(lang);
        }
    }
    ChunkMetadata {
        heading,
        has_code_block,
        code_languages: (!seen.is_empty()).then(|| seen.join(",")),
    }
}

/// `text` with every fenced code block replaced by a newline.
pub(crate) fn without_code_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for block in find_fenced_blocks(text) {
        out.push_str(&text[cursor..block.range.start]);
        out.push('\n');
        cursor = block.range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn whole_note(raw: &str) -> Vec<Chunk> {
    let parsed = parse_note(raw);
    let content = parsed.body.trim();
    if content.is_empty() {
        return Vec::new();
    }
    let start = parsed.body_offset + (parsed.body.len() - parsed.body.trim_start().len());
    let utf16 = Utf16Index::new(raw);
    let languages = find_fenced_blocks(content).into_iter().map(|b| b.language).collect();
    vec![Chunk {
        content: content.to_string(),
        start_offset: utf16.to_utf16(start),
        end_offset: utf16.to_utf16(start + content.len()),
        index: 0,
        metadata: chunk_metadata(content, languages),
    }]
}
