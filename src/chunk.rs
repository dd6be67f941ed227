//! Boundary-aware overlapping text chunker.
//!
//! Splits a source document into chunks of at most `max_chars` characters
//! (characters, not bytes, so multibyte text gets full-size chunks), with a
//! configurable overlap between consecutive chunks. Split points are chosen by
//! priority: paragraph break (`\n\n`), then sentence end, then whitespace, then
//! a hard cut. Each chunk carries a SHA-256 hash of its text for staleness
//! detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A bounded-size slice of a source document, the unit of retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    /// Filename of the originating document.
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Split `text` into overlapping chunks. Returns at least one chunk and
/// contiguous indices starting at 0. Deterministic for equal input apart from
/// the generated chunk ids.
pub fn chunk_text(source: &str, text: &str, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let text = text.trim();

    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut start = 0usize;

    while start < text.len() {
        let remaining = &text[start..];

        let window_end = byte_offset_of_char(remaining, max_chars);
        if window_end >= remaining.len() {
            push_trimmed(&mut chunks, source, &mut chunk_index, remaining);
            break;
        }
        let window = &remaining[..window_end];

        let split = split_point(window);
        let piece = &remaining[..split];
        push_trimmed(&mut chunks, source, &mut chunk_index, piece);

        // Overlap the next window with the tail of this one, but always make
        // forward progress.
        let advance = piece.chars().count().saturating_sub(overlap_chars).max(1);
        start += byte_offset_of_char(remaining, advance);
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(source, 0, text));
    }

    chunks
}

/// Pick a split point inside the window: paragraph break, sentence end,
/// whitespace, or the full window as a last resort.
fn split_point(window: &str) -> usize {
    if let Some(pos) = window.rfind("\n\n") {
        if pos > 0 {
            return pos + 2;
        }
    }
    if let Some(pos) = last_sentence_end(window) {
        if pos > 0 {
            return pos;
        }
    }
    if let Some(pos) = window.rfind(char::is_whitespace) {
        if pos > 0 {
            return pos + 1;
        }
    }
    window.len()
}

/// Byte offset just past the last `.`, `!`, `?`, or newline that is followed
/// by whitespace (or ends a line).
fn last_sentence_end(window: &str) -> Option<usize> {
    let mut last = None;
    let mut prev: Option<(usize, char)> = None;
    for (i, c) in window.char_indices() {
        if let Some((pi, pc)) = prev {
            if matches!(pc, '.' | '!' | '?') && c.is_whitespace() {
                last = Some(pi + pc.len_utf8() + c.len_utf8());
            }
        }
        if c == '\n' {
            last = Some(i + 1);
        }
        prev = Some((i, c));
    }
    last
}

fn push_trimmed(chunks: &mut Vec<Chunk>, source: &str, chunk_index: &mut i64, piece: &str) {
    let trimmed = piece.trim();
    if trimmed.is_empty() {
        return;
    }
    chunks.push(make_chunk(source, *chunk_index, trimmed));
    *chunk_index += 1;
}

/// Byte offset of the `n`-th character, or the string's length when it has
/// fewer than `n` characters.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
