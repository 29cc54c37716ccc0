//! Fixed-size overlapping-window chunker.
//!
//! Splits article body text into [`Chunk`]s of at most `max_chars`
//! characters, snapping window ends to paragraph (`\n\n`), newline, or space
//! boundaries so chunks stay readable. Consecutive windows overlap by
//! `overlap_chars` to avoid losing context at the seams; windows shorter
//! than `min_chars` are discarded, except that a non-empty article always
//! yields at least one chunk.
//!
//! Each chunk receives a SHA-256 hash of its text and a deterministic
//! UUIDv5 id derived from `(article_id, start_offset, content_hash)`, so
//! re-chunking identical text produces identical ids.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Split an article body into chunks per the configured policy.
///
/// Returned offsets are byte positions into `text`, always on UTF-8
/// character boundaries, and satisfy `&text[start..end] == chunk.text`.
pub fn chunk_article(article_id: i64, text: &str, cfg: &ChunkingConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let remaining = &text[start..];
        let window = byte_len_of_chars(remaining, cfg.max_chars);

        let end = if window == remaining.len() {
            text.len()
        } else {
            start + split_point(remaining, window)
        };

        if end <= start {
            break;
        }

        if let Some(chunk) = make_chunk(article_id, text, start, end) {
            if chunk.text.chars().count() >= cfg.min_chars {
                chunks.push(chunk);
            }
        }

        if end >= text.len() {
            break;
        }

        let mut next = back_chars(text, end, cfg.overlap_chars);
        if next <= start {
            next = end;
        }
        start = next;
    }

    // Articles shorter than the minimum still index as one whole-body chunk.
    if chunks.is_empty() {
        if let Some(chunk) = make_chunk(article_id, text, 0, text.len()) {
            chunks.push(chunk);
        }
    }

    chunks
}

/// Byte length of the first `max_chars` characters of `s`.
fn byte_len_of_chars(s: &str, max_chars: usize) -> usize {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => idx,
        None => s.len(),
    }
}

/// Pick a split position within `s[..window]`, preferring a paragraph
/// break, then a newline, then a space, provided the boundary lands in the
/// second half of the window. Falls back to a hard split at `window`.
fn split_point(s: &str, window: usize) -> usize {
    let head = &s[..window];
    let floor = window / 2;

    if let Some(pos) = head.rfind("\n\n") {
        if pos >= floor {
            return pos + 2;
        }
    }
    if let Some(pos) = head.rfind('\n') {
        if pos >= floor {
            return pos + 1;
        }
    }
    if let Some(pos) = head.rfind(' ') {
        if pos >= floor {
            return pos + 1;
        }
    }
    window
}

/// Walk back `n` characters from byte position `end`, staying on a char
/// boundary.
fn back_chars(s: &str, end: usize, n: usize) -> usize {
    let mut idx = end;
    let mut count = 0;
    while count < n && idx > 0 {
        idx -= 1;
        while idx > 0 && !s.is_char_boundary(idx) {
            idx -= 1;
        }
        count += 1;
    }
    idx
}

/// Build a chunk from the span `[start, end)`, trimming surrounding
/// whitespace and adjusting offsets to the trimmed text. Returns `None` for
/// whitespace-only spans.
fn make_chunk(article_id: i64, text: &str, start: usize, end: usize) -> Option<Chunk> {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lead = raw.len() - raw.trim_start().len();
    let start_offset = start + lead;
    let end_offset = start_offset + trimmed.len();

    let mut hasher = Sha256::new();
    hasher.update(trimmed.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{article_id}:{start_offset}:{content_hash}").as_bytes(),
    )
    .to_string();

    Some(Chunk {
        id,
        article_id,
        text: trimmed.to_string(),
        start_offset,
        end_offset,
        content_hash,
    })
}
