//! Segment extraction and changed-segment detection.
//!
//! A segment is a maximal run of non-newline tokens between `"\n"` markers.
//! For change detection each segment is reduced to a collapsed string so
//! whitespace-only edits do not count as changes.

use std::collections::BTreeSet;

use scribe_core::Token;

/// Collapsed per-segment strings: tokens joined with single spaces after
/// CR removal, NBSP replacement, and whitespace-run collapsing.
pub fn segment_texts(words: &[Token]) -> Vec<String> {
    let mut segments = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();

    let flush = |buffer: &[&str]| -> String {
        let joined: String = buffer.join(" ").replace('\r', "").replace('\u{00A0}', " ");
        joined.split_whitespace().collect::<Vec<_>>().join(" ")
    };

    for token in words {
        if token.is_newline() {
            segments.push(flush(&buffer));
            buffer.clear();
            continue;
        }
        buffer.push(token.word.as_str());
    }
    if !buffer.is_empty() {
        segments.push(flush(&buffer));
    }
    segments
}

/// Indices of segments whose collapsed text differs between the previous and
/// new token lists. Segments present only in `new` are all reported.
pub fn detect_changed_segments(prev_words: &[Token], new_words: &[Token]) -> BTreeSet<usize> {
    let prev_segments = segment_texts(prev_words);
    let new_segments = segment_texts(new_words);

    let mut changed = BTreeSet::new();
    let common = prev_segments.len().min(new_segments.len());
    for idx in 0..common {
        if prev_segments[idx] != new_segments[idx] {
            changed.insert(idx);
        }
    }
    for idx in common..new_segments.len() {
        changed.insert(idx);
    }
    changed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
