//! Conversions between UTF-8 byte offsets and UTF-16 code-unit offsets.

/// Byte → UTF-16 lookup for one text, built once per note.
pub(crate) struct Utf16Index {
    /// `(byte_offset, utf16_offset)` at the start of every char.
    starts: Vec<(usize, usize)>,
    total_bytes: usize,
    total_utf16: usize,
}

impl Utf16Index {
    pub(crate) fn new(text: &str) -> Self {
        let mut starts = Vec::with_capacity(text.len());
        let mut utf16 = 0usize;
        for (byte, ch) in text.char_indices() {
            starts.push((byte, utf16));
            utf16 += ch.len_utf16();
        }
        Self { starts, total_bytes: text.len(), total_utf16: utf16 }
    }

    /// UTF-16 offset of a byte offset; offsets inside a char resolve to that char's start.
    pub(crate) fn to_utf16(&self, byte: usize) -> usize {
        if byte >= self.total_bytes {
            return self.total_utf16;
        }
        let idx = self.starts.partition_point(|(b, _)| *b <= byte);
        idx.checked_sub(1).map_or(0, |i| self.starts[i].1)
    }
}

/// Slice `text` by UTF-16 code-unit offsets, as stored on a [`crate::types::Chunk`].
///
/// Returns `None` when an offset is past the end or splits a surrogate pair.
pub fn utf16_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let start_byte = utf16_to_byte(text, start)?;
    let end_byte = utf16_to_byte(text, end)?;
    text.get(start_byte..end_byte)
}

fn utf16_to_byte(text: &str, target: usize) -> Option<usize> {
    let mut utf16 = 0usize;
    for (byte, ch) in text.char_indices() {
        if utf16 == target {
            return Some(byte);
        }
        if utf16 > target {
            return None;
        }
        utf16 += ch.len_utf16();
    }
    (utf16 == target).then_some(text.len())
}
