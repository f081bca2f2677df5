//! Character-window chunking with overlap.
//!
//! Chunks are exact byte spans of the source text. A window holds at most
//! `max_chars` characters and prefers to end after a paragraph break, then a
//! newline, then any whitespace, falling back to a hard cut. Each following
//! window starts `overlap_chars` characters before the previous one ended.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: 500, overlap_chars: 50 }
    }
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> anyhow::Result<Self> {
        if max_chars == 0 {
            return Err(Error::InvalidConfig("chunk size must be greater than 0".into()).into());
        }
        if overlap_chars >= max_chars {
            return Err(Error::InvalidConfig(format!(
                "chunk overlap ({overlap_chars}) must be smaller than chunk size ({max_chars})"
            ))
            .into());
        }
        Ok(Self { max_chars, overlap_chars })
    }
}

/// A byte range `[start, end)` of the chunked text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Split `text` into overlapping spans.
///
/// Empty text yields no spans; text of at most `max_chars` characters yields
/// exactly one span covering all of it.
pub fn split_spans(text: &str, config: &ChunkingConfig) -> Vec<Span> {
    if text.is_empty() {
        return Vec::new();
    }
    // Byte offset of every char plus the end sentinel, so spans map back to &str.
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n <= config.max_chars {
        return vec![Span { start: 0, end: text.len() }];
    }

    let mut spans = Vec::new();
    let mut start = 0usize;
    loop {
        let window_end = (start + config.max_chars).min(n);
        let end = if window_end == n { n } else { find_break(&chars, start + config.overlap_chars + 1, window_end) };
        spans.push(Span { start: offsets[start], end: offsets[end] });
        if end == n {
            break;
        }
        start = end - config.overlap_chars;
    }
    spans
}

/// Pick a break in `chars[..window_end]` at or after `min_end`.
///
/// Returns the char index one past the separator.
fn find_break(chars: &[char], min_end: usize, window_end: usize) -> usize {
    let candidates = min_end..=window_end;
    let paragraph = candidates
        .clone()
        .rev()
        .find(|&end| end >= 2 && chars[end - 1] == '\n' && chars[end - 2] == '\n');
    if let Some(end) = paragraph {
        return end;
    }
    let newline = candidates.clone().rev().find(|&end| chars[end - 1] == '\n');
    if let Some(end) = newline {
        return end;
    }
    candidates.rev().find(|&end| chars[end - 1].is_whitespace()).unwrap_or(window_end)
}

/// Rebuild the original text from its spans by dropping each overlap.
pub fn reassemble(text_chunks: &[(Span, &str)]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for (span, content) in text_chunks {
        let skip = covered.saturating_sub(span.start);
        out.push_str(&content[skip..]);
        covered = span.end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig::new(max, overlap).expect("valid config")
    }

    fn split_text<'a>(text: &'a str, config: &ChunkingConfig) -> Vec<&'a str> {
        split_spans(text, config).into_iter().map(|s| &text[s.start..s.end]).collect()
    }

    fn roundtrip(text: &str, config: &ChunkingConfig) -> String {
        let spans = split_spans(text, config);
        let pairs: Vec<(Span, &str)> = spans.iter().map(|s| (*s, &text[s.start..s.end])).collect();
        reassemble(&pairs)
    }

    #[test]
    fn short_text_is_one_chunk() {
        let text = "The capital of France is Paris.";
        assert_eq!(split_text(text, &cfg(500, 50)), vec![text]);
        let exact: String = "x".repeat(500);
        assert_eq!(split_text(&exact, &cfg(500, 50)), vec![exact.as_str()]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(split_text("", &cfg(10, 2)).is_empty());
    }

    #[test]
    fn chunks_respect_max_chars_and_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi omicron pi rho";
        let config = cfg(20, 5);
        let spans = split_spans(text, &config);
        assert!(spans.len() > 1);
        for pair in spans.windows(2) {
            let prev = pair[0];
            let next = pair[1];
            let overlap = text[next.start..prev.end].chars().count();
            assert_eq!(overlap, 5, "adjacent chunks share exactly the configured overlap");
        }
        for span in &spans {
            assert!(text[span.start..span.end].chars().count() <= 20);
        }
    }

    #[test]
    fn prefers_paragraph_then_line_then_word_breaks() {
        let text = "first para\n\nsecond para that runs on";
        let chunks = split_text(text, &cfg(20, 2));
        assert_eq!(chunks[0], "first para\n\n");

        let text = "line one\nline two and more";
        let chunks = split_text(text, &cfg(14, 2));
        assert_eq!(chunks[0], "line one\n");

        let text = "words only here please";
        let chunks = split_text(text, &cfg(12, 2));
        assert_eq!(chunks[0], "words only ");
    }

    #[test]
    fn hard_cut_when_no_whitespace() {
        let text = "a".repeat(25);
        let chunks = split_text(&text, &cfg(10, 3));
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(roundtrip(&text, &cfg(10, 3)), text);
    }

    #[test]
    fn reassembly_reconstructs_original_text() {
        let base = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n\nSed do eiusmod tempor\nincididunt ut labore et dolore magna aliqua. ";
        let text = base.repeat(12);
        for (max, overlap) in [(500, 50), (100, 20), (37, 0), (64, 63), (8, 3)] {
            let config = cfg(max, overlap);
            assert_eq!(roundtrip(&text, &config), text, "max={max} overlap={overlap}");
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "日本語のテキストを分割します。".repeat(10);
        let config = cfg(16, 4);
        for chunk in split_text(&text, &config) {
            assert!(chunk.chars().count() <= 16);
        }
        assert_eq!(roundtrip(&text, &config), text);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(ChunkingConfig::new(10, 10).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
    }
}
