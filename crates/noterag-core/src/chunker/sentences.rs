//! Sentence segmentation over masked text.

use std::ops::Range;

use super::code_blocks::MaskedText;

/// Korean sentence-final endings, matched as literal suffixes.
const KOREAN_SENTENCE_ENDINGS: &[&str] = &[
    // declarative
    "습니다.", "니다.", "어요.", "아요.", "에요.", "예요.", "이다.", "는다.", "였다.", "었다.", "았다.",
    "다.", "요.", "죠.",
    // interrogative
    "습니까?", "니까?", "나요?", "가요?", "까요?", "을까?", "는가?", "니?", "까?", "요?", "죠?",
    // imperative
    "십시오.", "세요.", "하라.", "거라.", "어라.", "아라.", "라.",
    // exclamatory
    "는구나!", "군요!", "네요!", "구나!", "도다!", "요!", "다!",
];

fn is_latin_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn ends_with_korean_ending(prefix: &str) -> bool {
    KOREAN_SENTENCE_ENDINGS.iter().any(|ending| prefix.ends_with(ending))
}

/// One atomic packing unit: a sentence, a word-split piece of a long sentence,
/// a single character, or a code block placeholder.
#[derive(Debug, Clone)]
pub(crate) struct Unit {
    pub range: Range<usize>,
    /// Length in characters of the original text this unit covers.
    pub len: usize,
    pub is_code: bool,
}

/// Split `range` of the masked text into contiguous sentence spans that cover it.
pub(crate) fn sentence_spans(masked: &MaskedText<'_>, range: Range<usize>) -> Vec<Range<usize>> {
    let text = &masked.text;
    let mut cuts = vec![range.start];
    let mut iter = text[range.clone()].char_indices().peekable();
    while let Some((rel, c)) = iter.next() {
        let pos = range.start + rel;
        if let Some((_, ph)) = masked.placeholder_at(pos) {
            cuts.push(pos);
            cuts.push(ph.masked.end);
            while iter.peek().is_some_and(|(r, _)| range.start + r < ph.masked.end) {
                iter.next();
            }
            continue;
        }
        let after = pos + c.len_utf8();
        if c == '\n' {
            cuts.push(after);
        } else if is_latin_terminator(c) {
            if ends_with_korean_ending(&text[range.start..after]) {
                cuts.push(after);
                continue;
            }
            let next = iter.peek().map(|(_, n)| *n);
            let closes_sentence = match next {
                None => true,
                Some(n) => n.is_whitespace(),
            };
            if closes_sentence {
                cuts.push(after);
            }
        }
    }
    cuts.push(range.end);
    cuts.dedup();

    let mut spans: Vec<Range<usize>> = Vec::new();
    for pair in cuts.windows(2) {
        let span = pair[0]..pair[1];
        if span.is_empty() {
            continue;
        }
        let blank = text[span.clone()].trim().is_empty();
        match spans.last_mut() {
            // whitespace-only runs ride along with the previous sentence
            Some(last) if blank && !is_placeholder(masked, last) => last.end = span.end,
            _ => spans.push(span),
        }
    }
    spans
}

fn is_placeholder(masked: &MaskedText<'_>, span: &Range<usize>) -> bool {
    masked.placeholder_at(span.start).is_some_and(|(_, ph)| ph.masked.end == span.end)
}

/// Sentence units for a section, with over-long sentences split at word boundaries.
pub(crate) fn sentence_units(masked: &MaskedText<'_>, range: Range<usize>, max_len: usize) -> Vec<Unit> {
    let mut units = Vec::new();
    for span in sentence_spans(masked, range) {
        if is_placeholder(masked, &span) {
            units.push(Unit { len: masked.char_len(span.clone()), range: span, is_code: true });
            continue;
        }
        let len = masked.char_len(span.clone());
        if len <= max_len {
            units.push(Unit { range: span, len, is_code: false });
        } else {
            units.extend(word_pieces(masked, span, max_len));
        }
    }
    units
}

/// Greedy word-boundary split of one long sentence. A single word longer than
/// `max_len` stays whole.
fn word_pieces(masked: &MaskedText<'_>, span: Range<usize>, max_len: usize) -> Vec<Unit> {
    let text = &masked.text[span.clone()];
    let mut word_starts = vec![0usize];
    let mut prev_ws = false;
    for (i, c) in text.char_indices() {
        if prev_ws && !c.is_whitespace() && i > 0 {
            word_starts.push(i);
        }
        prev_ws = c.is_whitespace();
    }
    word_starts.push(text.len());

    let mut pieces = Vec::new();
    let mut piece_start = 0usize;
    let mut piece_len = 0usize;
    for pair in word_starts.windows(2) {
        let word_len = text[pair[0]..pair[1]].chars().count();
        if piece_len > 0 && piece_len + word_len > max_len {
            pieces.push(Unit {
                range: span.start + piece_start..span.start + pair[0],
                len: piece_len,
                is_code: false,
            });
            piece_start = pair[0];
            piece_len = 0;
        }
        piece_len += word_len;
    }
    if piece_len > 0 {
        pieces.push(Unit { range: span.start + piece_start..span.end, len: piece_len, is_code: false });
    }
    pieces
}

/// One unit per character, with placeholders kept atomic. Used when sentence
/// preservation is off.
pub(crate) fn char_units(masked: &MaskedText<'_>, range: Range<usize>) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut iter = masked.text[range.clone()].char_indices().peekable();
    while let Some((rel, c)) = iter.next() {
        let pos = range.start + rel;
        if let Some((_, ph)) = masked.placeholder_at(pos) {
            units.push(Unit { range: ph.masked.clone(), len: ph.char_len, is_code: true });
            while iter.peek().is_some_and(|(r, _)| range.start + r < ph.masked.end) {
                iter.next();
            }
            continue;
        }
        units.push(Unit { range: pos..pos + c.len_utf8(), len: 1, is_code: false });
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(text: &str) -> Vec<String> {
        let masked = MaskedText::plain(text);
        sentence_spans(&masked, 0..text.len())
            .into_iter()
            .map(|r| text[r].trim().to_string())
            .collect()
    }

    #[test]
    fn latin_terminators_need_whitespace() {
        assert_eq!(
            sentences("Version 1.2 shipped. Did it work? Yes!"),
            vec!["Version 1.2 shipped.", "Did it work?", "Yes!"]
        );
    }

    #[test]
    fn korean_endings_split_without_space() {
        assert_eq!(
            sentences("회의가 끝났습니다.다음 안건은 무엇인가요?확인해 주세요."),
            vec!["회의가 끝났습니다.", "다음 안건은 무엇인가요?", "확인해 주세요."]
        );
    }

    #[test]
    fn newlines_are_boundaries() {
        assert_eq!(sentences("- item one\n- item two"), vec!["- item one", "- item two"]);
    }

    #[test]
    fn long_sentence_splits_on_words() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let masked = MaskedText::plain(text);
        let units = sentence_units(&masked, 0..text.len(), 12);
        assert!(units.len() > 1);
        assert!(units.iter().all(|u| u.len <= 12));
        assert_eq!(units.first().map(|u| u.range.start), Some(0));
        assert_eq!(units.last().map(|u| u.range.end), Some(text.len()));
    }
}
