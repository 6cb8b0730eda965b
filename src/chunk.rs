//! Separator-based text splitter with overlapping windows.
//!
//! Text is cut on a separator (a newline by default) and the pieces are
//! greedily merged into chunks of at most `chunk_size` tokens. Consecutive
//! chunks share up to `chunk_overlap` tokens of trailing context.
//!
//! Tokens are counted with the GPT-2 byte-pair encoding (`r50k_base`), so
//! `chunk_size = 600` means 600 real model tokens for English and CJK text
//! alike. The splitter is a pure function of the text and the
//! [`ChunkingConfig`]: the same input always yields the same chunk sequence,
//! in source order.

use std::collections::VecDeque;
use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Chars-per-token ratio used only if the BPE tables fail to load.
const CHARS_PER_TOKEN: usize = 4;

static GPT2: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn gpt2() -> Option<&'static CoreBPE> {
    GPT2.get_or_init(|| match tiktoken_rs::r50k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!(error = %e, "failed to load GPT-2 encoding, estimating tokens from chars");
            None
        }
    })
    .as_ref()
}

/// Number of GPT-2 tokens in `text`.
pub fn count_tokens(text: &str) -> usize {
    match gpt2() {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        None => text.chars().count().div_ceil(CHARS_PER_TOKEN),
    }
}

/// Split text into overlapping chunks. Returns chunks with contiguous
/// indices starting at 0; empty or whitespace-only text yields no chunks.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    split_text_with(text, config, count_tokens)
}

/// [`split_text`] with a caller-supplied token counter.
pub fn split_text_with(
    text: &str,
    config: &ChunkingConfig,
    count: impl Fn(&str) -> usize,
) -> Vec<Chunk> {
    let separator = config.separator.as_str();
    let sep_len = count(separator);

    let pieces = text.split(separator).filter(|p| !p.is_empty());

    let mut chunks = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = count(piece);
        let joiner = if window.is_empty() { 0 } else { sep_len };

        if total + len + joiner > config.chunk_size {
            if total > config.chunk_size {
                tracing::warn!(
                    tokens = total,
                    chunk_size = config.chunk_size,
                    "created a chunk larger than the configured chunk size"
                );
            }
            if !window.is_empty() {
                push_chunk(&mut chunks, &window, separator);

                // Keep a tail of the window as overlap for the next chunk.
                while total > config.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { sep_len }
                            > config.chunk_size)
                {
                    let Some((_, front_len)) = window.pop_front() else {
                        break;
                    };
                    total -= front_len + if window.is_empty() { 0 } else { sep_len };
                }
            }
        }

        let joiner = if window.is_empty() { 0 } else { sep_len };
        window.push_back((piece, len));
        total += len + joiner;
    }

    if !window.is_empty() {
        if total > config.chunk_size {
            tracing::warn!(
                tokens = total,
                chunk_size = config.chunk_size,
                "created a chunk larger than the configured chunk size"
            );
        }
        push_chunk(&mut chunks, &window, separator);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, window: &VecDeque<(&str, usize)>, separator: &str) {
    let joined = window
        .iter()
        .map(|(piece, _)| *piece)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(Chunk::new(chunks.len(), trimmed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            separator: "\n".to_string(),
            chunk_size,
            chunk_overlap,
        }
    }

    /// One token per four chars, so the merge arithmetic below is easy to follow.
    fn quarter_chars(text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    #[test]
    fn test_count_tokens_uses_gpt2_encoding() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("\n"), 1);
        assert_eq!(count_tokens("hello world"), 2);
        // Hangul is split into byte-level pieces, well above a chars/4 guess.
        assert!(count_tokens("안녕하세요") > 2);
    }

    #[test]
    fn test_korean_text_is_chunked_by_real_tokens() {
        let line = "안녕하세요 반갑습니다";
        let text = vec![line; 20].join("\n");
        let chunks = split_text(&text, &cfg(count_tokens(line) * 2 + 1, 0));
        assert_eq!(chunks.len(), 10);
        assert_eq!(chunks[0].text, format!("{}\n{}", line, line));
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("hello world", &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "hello world");
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(split_text("", &ChunkingConfig::default()).is_empty());
        assert!(split_text("\n\n  \n", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_lines_are_merged_up_to_chunk_size() {
        // Each line is 2 tokens, the separator 1: three lines = 2+1+2+1+2 = 8.
        let text = "aaaaaaaa\nbbbbbbbb\ncccccccc\ndddddddd";
        let chunks = split_text_with(text, &cfg(8, 0), quarter_chars);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaaaaaa\nbbbbbbbb\ncccccccc", "dddddddd"]);
    }

    #[test]
    fn test_overlap_carries_trailing_lines() {
        let text = "aaaaaaaa\nbbbbbbbb\ncccccccc\ndddddddd\neeeeeeee";
        let chunks = split_text_with(text, &cfg(8, 3), quarter_chars);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "aaaaaaaa\nbbbbbbbb\ncccccccc",
                "cccccccc\ndddddddd\neeeeeeee",
            ]
        );
    }

    #[test]
    fn test_oversized_line_becomes_its_own_chunk() {
        let long = "x".repeat(100);
        let text = format!("short\n{}\ntail", long);
        let chunks = split_text_with(&text, &cfg(10, 2), quarter_chars);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["short", long.as_str(), "tail"]);
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..200)
            .map(|i| format!("Line number {} of the document.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_text(&text, &cfg(40, 10));
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i, "Index mismatch at position {}", i);
            assert!(count_tokens(&c.text) <= 40);
        }
    }

    #[test]
    fn test_chunks_preserve_source_order() {
        let text = (0..50)
            .map(|i| format!("line-{:03}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_text_with(&text, &cfg(12, 4), quarter_chars);
        let firsts: Vec<&str> = chunks
            .iter()
            .map(|c| c.text.lines().next().unwrap())
            .collect();
        let mut sorted = firsts.clone();
        sorted.sort();
        assert_eq!(firsts, sorted);
        assert!(chunks.last().unwrap().text.ends_with("line-049"));
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\nBeta\nGamma\nDelta\nEpsilon\nZeta\nEta\nTheta";
        let c1 = split_text(text, &cfg(5, 2));
        let c2 = split_text(text, &cfg(5, 2));
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_custom_separator() {
        let config = ChunkingConfig {
            separator: "\n\n".to_string(),
            chunk_size: 600,
            chunk_overlap: 100,
        };
        let chunks = split_text("para one\n\npara two", &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "para one\n\npara two");
    }
}
