use noterag_core::chunker::{utf16_slice, Chunker, ChunkerConfig};
use noterag_core::types::Chunk;

fn chunker(max: usize, overlap: usize) -> Chunker {
    Chunker::with_config(ChunkerConfig { max_chunk_size: max, chunk_overlap: overlap, ..ChunkerConfig::default() })
        .unwrap()
}

fn assert_offsets_round_trip(raw: &str, chunks: &[Chunk]) {
    for chunk in chunks {
        let slice = utf16_slice(raw, chunk.start_offset, chunk.end_offset)
            .unwrap_or_else(|| panic!("chunk {} offsets out of range", chunk.index));
        assert_eq!(slice, chunk.content, "chunk {} does not match its source span", chunk.index);
    }
}

fn paragraph_1100() -> String {
    let sentences: Vec<String> = (0..22)
        .map(|i| {
            if i == 21 {
                "Sentence 21 of the paragraph carries filler words.".to_string()
            } else {
                format!("Sentence {i:02} of the paragraph carries filler word.")
            }
        })
        .collect();
    sentences.join(" ")
}

#[test]
fn empty_body_yields_no_chunks() {
    let c = Chunker::new();
    assert!(c.chunk("").is_empty());
    assert!(c.chunk("---\ntitle: Empty\n---\n\n   \n").is_empty());
}

#[test]
fn small_note_is_one_chunk_after_frontmatter() {
    let raw = "---\ntitle: Offsets\ntags: [a]\n---\nBody starts here.\n";
    let chunks = Chunker::new().chunk(raw);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "Body starts here.");
    assert_eq!(chunks[0].start_offset, raw.find("Body").unwrap());
    assert_eq!(chunks[0].index, 0);
    assert_offsets_round_trip(raw, &chunks);
}

#[test]
fn eleven_hundred_char_paragraph_splits_in_two_with_overlap() {
    let raw = paragraph_1100();
    assert_eq!(raw.chars().count(), 1100);

    let chunks = Chunker::new().chunk(&raw);
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.content.chars().count() <= 1000));

    let (first, second) = (&chunks[0], &chunks[1]);
    assert!(second.start_offset < first.end_offset, "second chunk must start inside the first");
    let shared = &raw[second.start_offset..first.end_offset];
    assert!(!shared.trim().is_empty());
    assert!(first.content.ends_with(shared));
    assert!(second.content.starts_with(shared));
    assert!(second.content.starts_with("Sentence"), "overlap snaps to a sentence start");
    assert_offsets_round_trip(&raw, &chunks);
}

#[test]
fn consecutive_chunks_of_a_split_section_overlap() {
    let raw: String = (0..40)
        .map(|i| format!("Point {i} explains one more detail about the garden. "))
        .collect();
    let chunks = chunker(300, 80).chunk(&raw);
    assert!(chunks.len() > 2);
    for pair in chunks.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(b.start_offset < a.end_offset, "chunks {} and {} do not overlap", a.index, b.index);
        assert!(b.start_offset > a.start_offset, "no forward progress at chunk {}", b.index);
        let shared = &raw[b.start_offset..a.end_offset];
        assert!(shared.chars().count() <= 80);
    }
    assert_offsets_round_trip(&raw, &chunks);
}

#[test]
fn long_sentence_without_terminators_still_overlaps_on_words() {
    let raw = "word ".repeat(260);
    let chunks = Chunker::new().chunk(&raw);
    assert_eq!(chunks.len(), 2);
    assert!(chunks[1].start_offset < chunks[0].end_offset);
    assert!(chunks[1].content.starts_with("word"));
    assert_offsets_round_trip(&raw, &chunks);
}

#[test]
fn size_bound_holds_except_for_atomic_units() {
    let code_body: String = (0..30).map(|i| format!("    let value_{i} = compute({i});\n")).collect();
    let code = format!("```rust\nfn main() {{\n{code_body}}}\n```");
    let raw = format!(
        "Intro text explains the setup. It has a few sentences. Then we show code.\n{code}\nAfter the code we keep going. {} And {} ends it.",
        "More prose follows here. ".repeat(12),
        "x".repeat(250)
    );
    let max = 200;
    let chunks = chunker(max, 40).chunk(&raw);
    for chunk in &chunks {
        let len = chunk.content.chars().count();
        if len > max {
            let atomic = chunk.content.contains(&code) || chunk.content.contains(&"x".repeat(250));
            assert!(atomic, "chunk {} exceeds {max} chars without an atomic unit: {len}", chunk.index);
        }
    }
    assert_offsets_round_trip(&raw, &chunks);
}

#[test]
fn code_block_appears_in_exactly_one_chunk() {
    let code_body: String = (0..40).map(|i| format!("print('line {i}')\n")).collect();
    let code = format!("~~~python\n{code_body}~~~");
    let prose = "This paragraph talks about scripts. It is long enough to matter. ".repeat(6);
    let raw = format!("# Scripts\n{prose}\n{code}\n{prose}");

    let chunks = chunker(250, 60).chunk(&raw);
    let holders: Vec<&Chunk> = chunks.iter().filter(|c| c.content.contains(&code)).collect();
    assert_eq!(holders.len(), 1);
    assert!(holders[0].metadata.has_code_block);
    assert_eq!(holders[0].metadata.code_languages.as_deref(), Some("python"));

    let fragments = chunks.iter().filter(|c| c.content.contains("print('line 20')")).count();
    assert_eq!(fragments, 1, "code lines never leak into overlap windows");
    assert!(chunks.iter().all(|c| !c.content.contains('\u{E000}')));
    assert_offsets_round_trip(&raw, &chunks);
}

#[test]
fn sections_follow_heading_order_up_to_max_level() {
    let raw = "# Title\nintro\n## A\nbody a\n#### Deep\nbody deep\n## B\nbody b\n";
    let chunks = Chunker::new().chunk(raw);
    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["# Title\nintro", "## A\nbody a\n#### Deep\nbody deep", "## B\nbody b"]);

    let heading = chunks[1].metadata.heading.as_ref().unwrap();
    assert_eq!((heading.level, heading.text.as_str()), (2, "A"));
    assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn headings_inside_code_do_not_open_sections() {
    let raw = "intro\n```md\n# not a heading\n```\n## Real\ntext";
    let chunks = Chunker::new().chunk(raw);
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].content.contains("# not a heading"));
    assert!(chunks[0].metadata.has_code_block);
    assert_eq!(chunks[0].metadata.code_languages.as_deref(), Some("md"));
    assert_eq!(chunks[1].metadata.heading.as_ref().map(|h| h.text.as_str()), Some("Real"));
}

#[test]
fn mixed_scripts_keep_utf16_offsets() {
    let body = "# 회의 😀\n오늘 회의가 시작되었습니다.다음 안건을 검토해야 하나요?모두 참석해 주세요.\n\
                Emoji 🎉 notes follow. They are short! Are they? Yes.\n"
        .repeat(3);
    let raw = format!("---\ntitle: 회의록\n---\n{body}");
    let chunks = chunker(60, 15).chunk(&raw);
    assert!(chunks.len() > 3);
    assert_offsets_round_trip(&raw, &chunks);
    assert!(chunks.iter().all(|c| c.content.chars().count() <= 60));
}

#[test]
fn character_windows_always_progress() {
    let raw = "abcdefghij".repeat(25);
    let config = ChunkerConfig {
        max_chunk_size: 100,
        chunk_overlap: 30,
        preserve_sentences: false,
        ..ChunkerConfig::default()
    };
    let chunks = Chunker::with_config(config).unwrap().chunk(&raw);
    let starts: Vec<usize> = chunks.iter().map(|c| c.start_offset).collect();
    assert_eq!(starts, vec![0, 70, 140, 210]);
    assert_eq!(chunks.last().unwrap().end_offset, 250);
    assert!(chunks.iter().all(|c| c.content.chars().count() <= 100));
}

#[test]
fn unsplittable_run_stays_whole() {
    let raw = "x".repeat(500);
    let chunks = chunker(100, 20).chunk(&raw);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content.len(), 500);
}

#[test]
fn header_preservation_can_be_disabled() {
    let raw = "# One\nfirst\n## Two\nsecond";
    let config = ChunkerConfig { preserve_headers: false, ..ChunkerConfig::default() };
    let chunks = Chunker::with_config(config).unwrap().chunk(raw);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, raw);
    assert_eq!(chunks[0].metadata.heading.as_ref().map(|h| h.level), Some(1));
}
