use super::*;

fn config(chunk_size: usize, overlap: usize) -> ChunkingConfig {
    ChunkingConfig {
        chunk_size,
        overlap,
    }
}

#[test]
fn default_config() {
    let config = ChunkingConfig::default();
    assert_eq!(config.chunk_size, 1500);
    assert_eq!(config.overlap, 200);
    assert_eq!(config.stride(), 1300);
}

#[test]
fn empty_text_yields_no_chunks() {
    assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
    assert_eq!(expected_chunk_count(0, &ChunkingConfig::default()), 0);
}

#[test]
fn short_text_is_single_chunk() {
    let chunks = chunk_text("hello world", &ChunkingConfig::default());
    assert_eq!(chunks, vec!["hello world".to_string()]);
}

#[test]
fn document_of_2600_chars() {
    let text: String = (0..2600)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();
    let chunks = chunk_text(&text, &config(1500, 200));

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chars().count(), 1500);
    assert_eq!(chunks[1].chars().count(), 1300);
    assert_eq!(chunks[0], text.chars().take(1500).collect::<String>());
    assert_eq!(chunks[1], text.chars().skip(1300).collect::<String>());
}

#[test]
fn consecutive_chunks_share_overlap() {
    let text = "abcdefghijklmnopqrstuvwxyz".repeat(4);
    let chunks = chunk_text(&text, &config(10, 3));

    for pair in chunks.windows(2) {
        if pair[1].chars().count() < 3 {
            continue;
        }
        let tail: String = pair[0].chars().skip(7).collect();
        let head: String = pair[1].chars().take(3).collect();
        assert_eq!(tail, head);
    }
}

#[test]
fn chunk_count_matches_formula() {
    for (chunk_size, overlap) in [(10, 0), (10, 3), (7, 6), (1500, 200), (1, 0)] {
        let config = config(chunk_size, overlap);
        for len in [1, 2, 9, 10, 11, 13, 50, 99, 100, 101, 2600] {
            let text = "x".repeat(len);
            assert_eq!(
                chunk_text(&text, &config).len(),
                expected_chunk_count(len, &config),
                "len={len} chunk_size={chunk_size} overlap={overlap}"
            );
        }
    }
}

#[test]
fn chunking_is_deterministic() {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
    let config = config(64, 16);
    assert_eq!(chunk_text(&text, &config), chunk_text(&text, &config));
}

#[test]
fn multibyte_characters_are_not_split() {
    let text = "héllo wörld ünïcode ✓✓✓ 日本語のテキスト".repeat(3);
    let chunks = chunk_text(&text, &config(7, 2));

    assert!(chunks.iter().all(|c| c.chars().count() <= 7));
    let rebuilt: String = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.clone()
            } else {
                c.chars().skip(2).collect()
            }
        })
        .collect();
    assert_eq!(rebuilt, text);
}
