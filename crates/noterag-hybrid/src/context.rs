use std::path::Path;

use tracing::debug;

use noterag_core::frontmatter::parse_note;

/// Byte range of `[start, end)` widened to whole lines plus `lines` lines on each side.
pub fn widen_to_lines(body: &str, start: usize, end: usize, lines: usize) -> (usize, usize) {
    let mut from = body[..start].rfind('\n').map_or(0, |i| i + 1);
    for _ in 0..lines {
        if from == 0 {
            break;
        }
        from = body[..from - 1].rfind('\n').map_or(0, |i| i + 1);
    }
    let mut to = body[end..].find('\n').map_or(body.len(), |i| end + i);
    for _ in 0..lines {
        if to >= body.len() {
            break;
        }
        to = body[to + 1..].find('\n').map_or(body.len(), |i| to + 1 + i);
    }
    (from, to)
}

/// The chunk plus its surrounding lines, or `None` when the note cannot be
/// read, the chunk is no longer in it, or widening adds nothing.
pub async fn expand_chunk(notes_dir: &Path, note_path: &str, chunk: &str, lines: usize) -> Option<String> {
    let text = match tokio::fs::read_to_string(notes_dir.join(note_path)).await {
        Ok(text) => text,
        Err(err) => {
            debug!(path = %note_path, error = %err, "context expansion skipped");
            return None;
        }
    };
    let body = parse_note(&text).body;
    let core = chunk.trim();
    if core.is_empty() {
        return None;
    }
    let start = body.find(chunk)? + (chunk.len() - chunk.trim_start().len());
    let (from, to) = widen_to_lines(body, start, start + core.len(), lines);
    let widened = body[from..to].trim();
    (widened.chars().count() > chunk.chars().count()).then(|| widened.to_string())
}
