//! Fixed-window text chunker.
//!
//! Splits summarized text into windows of `chunking.size` units with
//! `chunking.overlap` units shared between neighbours. The unit is either
//! characters or approximate model tokens. A window prefers to end on a
//! paragraph break, then a line break, then a space, as long as that
//! boundary falls in the second half of the window; otherwise it is cut
//! at the hard limit.

use sha2::{Digest, Sha256};

use crate::config::{ChunkUnit, ChunkingConfig};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// One window of a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Contiguous from 0.
    pub index: i64,
    /// Character offset of the first character of `text` in the source.
    pub offset: usize,
    pub text: String,
}

/// Split `text` into windows. Whitespace-only windows are dropped; an empty
/// text yields no chunks.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let scale = match config.unit {
        ChunkUnit::Characters => 1,
        ChunkUnit::Tokens => CHARS_PER_TOKEN,
    };
    let max_chars = (config.size * scale).max(1);
    let overlap = (config.overlap * scale).min(max_chars - 1);

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());
        let end = if hard_end < chars.len() {
            soft_boundary(&chars, start + max_chars / 2, hard_end).unwrap_or(hard_end)
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            let leading = piece.chars().take_while(|c| c.is_whitespace()).count();
            chunks.push(TextChunk {
                index: chunks.len() as i64,
                offset: start + leading,
                text: trimmed.to_string(),
            });
        }

        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Position just past the last preferred separator in `chars[lo..hi]`.
fn soft_boundary(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    let window = &chars[lo..hi];
    let paragraph = window
        .windows(2)
        .rposition(|w| w[0] == '\n' && w[1] == '\n')
        .map(|i| lo + i + 2);
    paragraph
        .or_else(|| window.iter().rposition(|c| *c == '\n').map(|i| lo + i + 1))
        .or_else(|| window.iter().rposition(|c| *c == ' ').map(|i| lo + i + 1))
}

/// SHA-256 of the chunk text, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            unit: ChunkUnit::Characters,
            size,
            overlap,
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", &chars(600, 0));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", &chars(600, 0)).is_empty());
        assert!(chunk_text("  \n\n ", &chars(600, 0)).is_empty());
    }

    #[test]
    fn test_hard_split_without_separators() {
        let text = "a".repeat(1500);
        let chunks = chunk_text(&text, &chars(600, 0));
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.offset).collect::<Vec<_>>(),
            vec![0, 600, 1200]
        );
        assert_eq!(chunks[2].text.len(), 300);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let first = "x".repeat(400);
        let second = "y".repeat(400);
        let text = format!("{}\n\n{}", first, second);
        let chunks = chunk_text(&text, &chars(600, 0));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, first);
        assert_eq!(chunks[1].text, second);
        assert_eq!(chunks[1].offset, 402);
    }

    #[test]
    fn test_boundary_in_first_half_is_ignored() {
        let text = format!("ab {}", "c".repeat(1000));
        let chunks = chunk_text(&text, &chars(600, 0));
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[1].offset, 600);
    }

    #[test]
    fn test_overlap_shares_characters() {
        let text = "a".repeat(1000);
        let chunks = chunk_text(&text, &chars(600, 100));
        assert_eq!(
            chunks.iter().map(|c| c.offset).collect::<Vec<_>>(),
            vec![0, 500]
        );
    }

    #[test]
    fn test_offset_points_at_trimmed_text() {
        let chunks = chunk_text("   Hello", &chars(600, 0));
        assert_eq!(chunks[0].offset, 3);

        // With one character of overlap every window after the first starts
        // on the space that ended its predecessor.
        let text = "word ".repeat(60);
        let all: Vec<char> = text.chars().collect();
        let chunks = chunk_text(&text, &chars(50, 1));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            let len = chunk.text.chars().count();
            let at: String = all[chunk.offset..chunk.offset + len].iter().collect();
            assert_eq!(at, chunk.text);
        }
        assert_eq!(chunks[1].offset % 5, 0);
    }

    #[test]
    fn test_token_unit_scales_window() {
        let text = "a".repeat(1000);
        let cfg = ChunkingConfig {
            unit: ChunkUnit::Tokens,
            size: 100,
            overlap: 0,
        };
        let chunks = chunk_text(&text, &cfg);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].offset, 400);
    }

    #[test]
    fn test_offsets_count_characters_not_bytes() {
        let text = "é".repeat(700);
        let chunks = chunk_text(&text, &chars(600, 0));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].offset, 600);
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(content_hash("same"), content_hash("same"));
        assert_ne!(content_hash("one"), content_hash("two"));
        assert_eq!(content_hash("x").len(), 64);
    }
}
