//! Boundary-aware reply chunking.
//!
//! Chat transports cap the size of a single message (Discord: 2000
//! characters). This module splits long replies into ordered chunks, cutting
//! at the best boundary available inside each window:
//!
//! 1. paragraph break (`\n\n`)
//! 2. line break (`\n`)
//! 3. sentence end (`. `, the period stays with the chunk)
//! 4. word gap (` `)
//! 5. hard cut at the limit
//!
//! The separator consumed at a cut is recorded, so concatenating every chunk
//! with its separator yields the original text. Lengths are counted in
//! characters, never bytes, and cuts always land on UTF-8 boundaries.

/// Default split threshold (leaves headroom under Discord's 2000 limit).
pub const DEFAULT_MAX_LEN: usize = 1950;

/// One chunk plus the separator elided after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// Boundary characters dropped between this chunk and the next one.
    /// Empty for hard cuts and for the final chunk.
    pub separator: &'static str,
}

/// Split `text` into chunks of at most `max_len` characters.
///
/// `max_len` is clamped to at least 1. Text that already fits is returned as
/// a single chunk, including the empty string.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    chunk_segments(text, max_len)
        .into_iter()
        .map(|segment| segment.text)
        .collect()
}

/// Like [`chunk_message`], but keeps the separator consumed at every cut.
pub fn chunk_segments(text: &str, max_len: usize) -> Vec<Segment> {
    let limit = max_len.max(1);
    let mut segments = Vec::new();
    let mut remaining = text;

    // `window_end` only exists while more than `limit` characters remain.
    while let Some(window_end) = byte_offset_of_char(remaining, limit) {
        let split = find_split_point(&remaining[..window_end]);
        segments.push(Segment {
            text: remaining[..split.chunk_end].to_string(),
            separator: split.separator,
        });
        remaining = &remaining[split.chunk_end + split.separator.len()..];
    }

    segments.push(Segment {
        text: remaining.to_string(),
        separator: "",
    });
    segments
}

struct SplitPoint {
    chunk_end: usize,
    separator: &'static str,
}

/// Pick the cut inside `window`; the returned chunk is never empty.
fn find_split_point(window: &str) -> SplitPoint {
    if let Some(pos) = window.rfind("\n\n")
        && pos > 0
    {
        return SplitPoint {
            chunk_end: pos,
            separator: "\n\n",
        };
    }

    if let Some(pos) = window.rfind('\n')
        && pos > 0
    {
        return SplitPoint {
            chunk_end: pos,
            separator: "\n",
        };
    }

    if let Some(pos) = window.rfind(". ") {
        return SplitPoint {
            chunk_end: pos + 1,
            separator: " ",
        };
    }

    if let Some(pos) = window.rfind(' ')
        && pos > 0
    {
        return SplitPoint {
            chunk_end: pos,
            separator: " ",
        };
    }

    SplitPoint {
        chunk_end: window.len(),
        separator: "",
    }
}

/// Byte offset of the character at index `n`, or `None` when `text` has at
/// most `n` characters.
fn byte_offset_of_char(text: &str, n: usize) -> Option<usize> {
    text.char_indices().nth(n).map(|(offset, _)| offset)
}
