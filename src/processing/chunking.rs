//! Boundary-aware text chunking.
//!
//! The chunker walks cleaned text with a sliding window of `chunk_size`
//! characters and prefers to cut at natural language boundaries, searching
//! backward from the naive window end in priority order: sentence end,
//! paragraph break, line break, any whitespace. Only when no boundary exists
//! does it cut mid-word. Adjacent chunks overlap by up to `overlap`
//! characters, and the window start is guaranteed to advance by at least one
//! character per step regardless of configuration.

use super::types::{ChunkingError, TextChunk};
use futures_core::Stream;
use serde_json::Value;

/// How far back from the naive window end the boundary search reaches.
const BOUNDARY_SEARCH_SPAN: usize = 200;

/// Normalize whitespace and strip control characters from raw extracted text.
///
/// - `\r\n` and lone `\r` become `\n`.
/// - Runs of horizontal whitespace collapse to a single space.
/// - Runs of newlines are capped at two, preserving paragraph breaks.
/// - Control characters are dropped; leading and trailing whitespace is trimmed.
pub fn clean_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut cleaned = String::with_capacity(normalized.len());
    let mut pending_newlines = 0usize;
    let mut pending_space = false;

    for c in normalized.chars() {
        if c == '\n' || c == '\r' {
            pending_newlines += 1;
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_control() {
            continue;
        }
        if !cleaned.is_empty() {
            if pending_newlines > 0 {
                for _ in 0..pending_newlines.min(2) {
                    cleaned.push('\n');
                }
            } else if pending_space {
                cleaned.push(' ');
            }
        }
        pending_newlines = 0;
        pending_space = false;
        cleaned.push(c);
    }

    cleaned
}

/// Split `text` into ordered, overlapping chunks at natural boundaries.
///
/// `chunk_size` and `overlap` are character counts. Empty or whitespace-only
/// input yields an empty sequence; `chunk_size == 0` is rejected. `metainfo`
/// is attached verbatim to every produced chunk.
pub fn create_chunks(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    metainfo: Value,
) -> Result<Vec<TextChunk>, ChunkingError> {
    Ok(chunk_iter(text, chunk_size, overlap, metainfo)?.collect())
}

/// Build the chunk iterator backing [`create_chunks`] and [`chunk_stream`].
pub fn chunk_iter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    metainfo: Value,
) -> Result<ChunkIter, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    Ok(ChunkIter {
        chars: clean_text(text).chars().collect(),
        chunk_size,
        overlap,
        metainfo,
        start: 0,
        next_index: 0,
        finished: false,
    })
}

/// Lazy chunking variant for very large inputs.
///
/// Produces the same chunks as [`create_chunks`] but yields control to the
/// runtime between chunks so concurrent tasks keep making progress. There is
/// no internal memory-pressure probe: the iterator holds only the cleaned
/// text and per-chunk state, so how fast the consumer polls is the bounding
/// mechanism.
pub fn chunk_stream(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    metainfo: Value,
) -> Result<impl Stream<Item = TextChunk>, ChunkingError> {
    let iter = chunk_iter(text, chunk_size, overlap, metainfo)?;
    Ok(async_stream::stream! {
        for chunk in iter {
            yield chunk;
            tokio::task::yield_now().await;
        }
    })
}

/// Iterator over the chunks of one cleaned document.
pub struct ChunkIter {
    chars: Vec<char>,
    chunk_size: usize,
    overlap: usize,
    metainfo: Value,
    start: usize,
    next_index: usize,
    finished: bool,
}

impl Iterator for ChunkIter {
    type Item = TextChunk;

    fn next(&mut self) -> Option<TextChunk> {
        let len = self.chars.len();
        loop {
            if self.finished || self.start >= len {
                return None;
            }

            let naive_end = self.start.saturating_add(self.chunk_size).min(len);
            let end = if naive_end < len {
                find_break(&self.chars, self.start, naive_end)
            } else {
                naive_end
            };

            // Trim surrounding whitespace off the emitted chunk.
            let mut content_start = self.start;
            let mut content_end = end;
            while content_start < content_end && self.chars[content_start].is_whitespace() {
                content_start += 1;
            }
            while content_end > content_start && self.chars[content_end - 1].is_whitespace() {
                content_end -= 1;
            }
            let emit = content_end > content_start;

            // Forward progress even when overlap >= chunk_size.
            let mut next_start = (self.start + 1).max(end.saturating_sub(self.overlap));
            // If the overlapped start lands mid-word, snap forward to the next
            // word boundary inside the overlap region.
            if next_start > 0
                && next_start < len
                && !self.chars[next_start].is_whitespace()
                && !self.chars[next_start - 1].is_whitespace()
            {
                let snap_limit = end.min(len - 1);
                if let Some(ws) =
                    (next_start..=snap_limit).find(|&i| self.chars[i].is_whitespace())
                {
                    next_start = ws + 1;
                }
            }
            if emit {
                // Starts must be strictly increasing across emitted chunks.
                next_start = next_start.max(content_start + 1);
            }
            self.start = next_start;
            if end >= len {
                self.finished = true;
            }

            if emit {
                let content: String = self.chars[content_start..content_end].iter().collect();
                let chunk = TextChunk {
                    content,
                    start_char: content_start,
                    end_char: content_end,
                    chunk_index: self.next_index,
                    metainfo: self.metainfo.clone(),
                };
                self.next_index += 1;
                return Some(chunk);
            }
        }
    }
}

/// Pick the cut position for a window that does not reach the end of text.
///
/// Searches backward from `naive_end` within the last [`BOUNDARY_SEARCH_SPAN`]
/// characters of the window. Falls through boundary categories in priority
/// order and returns `naive_end` (a hard mid-word cut) when none match.
fn find_break(chars: &[char], start: usize, naive_end: usize) -> usize {
    let low = naive_end.saturating_sub(BOUNDARY_SEARCH_SPAN).max(start + 1);

    // Sentence end: terminal punctuation followed by whitespace.
    if let Some(i) = (low..naive_end)
        .rev()
        .find(|&i| matches!(chars[i - 1], '.' | '!' | '?') && chars[i].is_whitespace())
    {
        return i;
    }
    // Paragraph break: blank line.
    if let Some(i) = (low..naive_end)
        .rev()
        .find(|&i| chars[i] == '\n' && i + 1 < chars.len() && chars[i + 1] == '\n')
    {
        return i;
    }
    // Any line break.
    if let Some(i) = (low..naive_end).rev().find(|&i| chars[i] == '\n') {
        return i;
    }
    // Any whitespace.
    if let Some(i) = (low..naive_end).rev().find(|&i| chars[i].is_whitespace()) {
        return i;
    }

    naive_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;

    fn chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
        create_chunks(text, chunk_size, overlap, Value::Null).expect("chunking succeeded")
    }

    #[test]
    fn splits_at_sentence_boundary_not_mid_word() {
        let produced = chunks("Hello world. This is a test.", 15, 3);
        assert_eq!(produced.len(), 2);
        assert_eq!(produced[0].content, "Hello world.");
        assert_eq!((produced[0].start_char, produced[0].end_char), (0, 12));
        assert_eq!(produced[1].content, "This is a test.");
        // Chunk 1 starts at or after the overlap window behind chunk 0's end.
        assert!(produced[1].start_char >= produced[0].end_char - 3);
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        assert!(chunks("", 10, 2).is_empty());
        assert!(chunks("   \n\t  ", 10, 2).is_empty());
    }

    #[test]
    fn single_character_text() {
        let produced = chunks("a", 10, 2);
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].content, "a");
        assert_eq!((produced[0].start_char, produced[0].end_char), (0, 1));
    }

    #[test]
    fn text_shorter_than_window_is_one_chunk() {
        let produced = chunks("short text", 100, 10);
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].content, "short text");
    }

    #[test]
    fn boundaryless_text_falls_back_to_hard_cuts() {
        let text = "x".repeat(50);
        let produced = chunks(&text, 20, 5);
        assert_eq!(produced.len(), 3);
        let starts: Vec<usize> = produced.iter().map(|c| c.start_char).collect();
        assert_eq!(starts, vec![0, 15, 30]);
        assert_eq!(produced[0].content.len(), 20);
    }

    #[test]
    fn paragraph_break_beats_plain_whitespace() {
        let produced = chunks("first part\n\nsecond part here", 20, 0);
        assert_eq!(produced.len(), 2);
        assert_eq!(produced[0].content, "first part");
        assert_eq!(produced[1].content, "second part here");
    }

    #[test]
    fn terminates_even_when_overlap_exceeds_chunk_size() {
        let text: String = ('a'..='z').collect();
        let produced = chunks(&text, 4, 10);
        assert!(produced.len() <= text.len());
        for pair in produced.windows(2) {
            assert!(pair[1].start_char > pair[0].start_char);
        }
    }

    #[test]
    fn indices_and_starts_are_monotonic() {
        let text = "One sentence here. Another sentence follows. And a third one ends it. \
                    Then some trailing words without punctuation";
        let produced = chunks(text, 30, 8);
        for (i, chunk) in produced.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert!(chunk.end_char > chunk.start_char);
        }
        for pair in produced.windows(2) {
            assert!(pair[1].start_char > pair[0].start_char);
            // Overlap never reaches further back than the configured width.
            assert!(pair[1].start_char >= pair[0].end_char.saturating_sub(8));
        }
    }

    #[test]
    fn chunks_cover_every_non_whitespace_character() {
        let text = "Alpha beta gamma. Delta epsilon zeta eta!\n\nTheta iota kappa lambda, \
                    mu nu xi omicron pi rho sigma tau.";
        let cleaned: Vec<char> = clean_text(text).chars().collect();
        let produced = chunks(text, 25, 6);

        let mut covered = vec![false; cleaned.len()];
        for chunk in &produced {
            for flag in &mut covered[chunk.start_char..chunk.end_char] {
                *flag = true;
            }
        }
        for (i, c) in cleaned.iter().enumerate() {
            if !c.is_whitespace() {
                assert!(covered[i], "character {i:?} ({c:?}) not covered by any chunk");
            }
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let error = create_chunks("hello", 0, 0, Value::Null).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn metainfo_is_attached_to_every_chunk() {
        let meta = json!({"document_id": "doc-1", "language": "en"});
        let produced =
            create_chunks("Hello world. This is a test.", 15, 3, meta.clone()).unwrap();
        assert!(produced.iter().all(|c| c.metainfo == meta));
    }

    #[tokio::test]
    async fn stream_variant_matches_eager_chunking() {
        let text = "One sentence here. Another sentence follows. And a third one ends it.";
        let eager = chunks(text, 30, 5);
        let lazy: Vec<TextChunk> = chunk_stream(text, 30, 5, Value::Null)
            .unwrap()
            .collect()
            .await;

        assert_eq!(eager.len(), lazy.len());
        for (a, b) in eager.iter().zip(lazy.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.start_char, b.start_char);
            assert_eq!(a.end_char, b.end_char);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }

    #[test]
    fn clean_text_normalizes_whitespace_and_control_characters() {
        assert_eq!(clean_text("a\u{0}b"), "ab");
        assert_eq!(clean_text("a\r\nb"), "a\nb");
        assert_eq!(clean_text("a \t  b"), "a b");
        assert_eq!(clean_text("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean_text("  padded  "), "padded");
    }
}
