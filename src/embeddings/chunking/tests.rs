use super::*;

fn config(chunk_size: usize, overlap: usize) -> ChunkingConfig {
    ChunkingConfig {
        chunk_size,
        overlap,
    }
}

fn sample_text(len: usize) -> String {
    "The quick brown fox jumps over the lazy dog. "
        .chars()
        .cycle()
        .take(len)
        .collect()
}

#[test]
fn default_config_matches_documented_values() {
    let config = ChunkingConfig::default();
    assert_eq!(config.chunk_size, 800);
    assert_eq!(config.overlap, 200);
    assert_eq!(config.stride(), 600);
}

#[test]
fn empty_text_yields_no_chunks() {
    let chunks = chunk_text("", &ChunkingConfig::default()).expect("empty text is valid input");
    assert!(chunks.is_empty());

    let spans = chunk_spans("", &ChunkingConfig::default()).expect("empty text is valid input");
    assert!(spans.is_empty());
}

#[test]
fn short_text_is_a_single_chunk() {
    let chunks = chunk_text("  hello world  ", &ChunkingConfig::default())
        .expect("chunk_text should succeed");
    assert_eq!(chunks, vec!["hello world".to_string()]);
}

#[test]
fn window_starts_advance_by_stride() {
    let text = sample_text(2000);
    let spans = chunk_spans(&text, &ChunkingConfig::default()).expect("chunking should succeed");

    let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![0, 600, 1200, 1800]);
    assert_eq!(spans.last().map(|s| s.end), Some(2000));
}

#[test]
fn adjacent_full_windows_share_exactly_overlap_characters() {
    let text = sample_text(5_321);
    for (size, overlap) in [(800, 200), (100, 0), (64, 63), (50, 10)] {
        let config = config(size, overlap);
        let spans = chunk_spans(&text, &config).expect("chunking should succeed");
        assert!(spans.len() > 1);

        for pair in spans.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            assert_eq!(right.start - left.start, size - overlap);
            if left.char_len() == size && right.char_len() == size {
                let left_tail: String = left.text.chars().skip(size - overlap).collect();
                let right_head: String = right.text.chars().take(overlap).collect();
                assert_eq!(left_tail, right_head);
            }
        }
    }
}

#[test]
fn chunks_never_exceed_chunk_size() {
    let text = sample_text(3_000);
    let config = config(120, 30);
    let chunks = chunk_text(&text, &config).expect("chunking should succeed");

    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 120);
        assert_eq!(chunk.trim(), chunk);
    }
}

#[test]
fn window_reaching_the_end_is_followed_by_its_overlap_tail() {
    let config = ChunkingConfig::default();
    for (len, expected) in [(599, 1), (600, 1), (601, 2), (800, 2), (1300, 3), (2000, 4)] {
        let spans = chunk_spans(&sample_text(len), &config).expect("chunking should succeed");
        assert_eq!(spans.len(), expected, "text of {len} characters");
    }

    let spans = chunk_spans(&sample_text(800), &config).expect("chunking should succeed");
    assert_eq!((spans[0].start, spans[0].end), (0, 800));
    assert_eq!((spans[1].start, spans[1].end), (600, 800));
}

#[test]
fn carriage_returns_become_spaces() {
    let chunks = chunk_text("line one\r\nline two", &ChunkingConfig::default())
        .expect("chunk_text should succeed");
    assert_eq!(chunks, vec!["line one \nline two".to_string()]);
}

#[test]
fn blank_windows_are_skipped() {
    let mut text = "a".repeat(10);
    text.push_str(&" ".repeat(40));
    text.push_str(&"b".repeat(10));

    let spans = chunk_spans(&text, &config(10, 0)).expect("chunking should succeed");
    assert_eq!(spans.len(), 6);
    assert_eq!(spans.iter().filter(|s| s.is_blank()).count(), 4);

    let chunks = chunk_text(&text, &config(10, 0)).expect("chunking should succeed");
    assert_eq!(chunks, vec!["a".repeat(10), "b".repeat(10)]);
}

#[test]
fn multibyte_text_splits_on_character_boundaries() {
    let text = "héllo wörld ünïcode ✓✓✓ ".repeat(20);
    let config = config(7, 2);
    let spans = chunk_spans(&text, &config).expect("chunking should succeed");

    let total_chars = text.chars().count();
    assert_eq!(spans.last().map(|s| s.end), Some(total_chars));
    for span in &spans {
        assert_eq!(span.text.chars().count(), span.char_len());
        assert!(span.char_len() <= 7);
    }
}

#[test]
fn invalid_configuration_is_rejected() {
    let result = chunk_text("some text", &config(0, 0));
    assert!(matches!(result, Err(DocsError::Config(_))));

    let result = chunk_text("some text", &config(100, 100));
    assert!(matches!(result, Err(DocsError::Config(_))));

    let result = chunk_text("some text", &config(100, 150));
    assert!(matches!(result, Err(DocsError::Config(_))));
}

#[test]
fn chunking_is_deterministic() {
    let text = sample_text(4_000);
    let first = chunk_text(&text, &ChunkingConfig::default()).expect("chunking should succeed");
    let second = chunk_text(&text, &ChunkingConfig::default()).expect("chunking should succeed");
    assert_eq!(first, second);
}
