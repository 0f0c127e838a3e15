//! Timing normalization: every stored or served token ends up with a
//! monotone, non-zero-duration interval within its segment.

use scribe_core::{Token, WordRow};

/// Floor duration applied when a token's end cannot be derived from its
/// neighbors.
pub const MIN_TOKEN_DURATION_SEC: f64 = 0.20;

// ---------------------------------------------------------------------------
// Write-side: per-word rows
// ---------------------------------------------------------------------------

/// Compute `(start, end, word_index)` updates that bring the rows of one
/// version into normal form. Rows are expected in `word_index` order;
/// normalization is scoped per `segment_index`.
///
/// Rules, per segment:
/// - a missing start inherits the previous token's end (0 at segment head);
/// - a start before the previous end is raised to it;
/// - a missing or non-positive-duration end takes the next strictly greater
///   start in the segment, else `start + min_dur`;
/// - rows with neither start nor end are left untouched.
///
/// Only rows whose values actually change are returned.
pub fn normalize_row_timings(rows: &[WordRow], min_dur: f64) -> Vec<(f64, f64, i64)> {
    let mut updates = Vec::new();

    let mut idx = 0;
    while idx < rows.len() {
        let segment = rows[idx].segment_index;
        let mut end_idx = idx;
        while end_idx < rows.len() && rows[end_idx].segment_index == segment {
            end_idx += 1;
        }
        normalize_segment_rows(&rows[idx..end_idx], min_dur, &mut updates);
        idx = end_idx;
    }

    updates
}

fn normalize_segment_rows(segment: &[WordRow], min_dur: f64, updates: &mut Vec<(f64, f64, i64)>) {
    let mut prev_end: Option<f64> = None;

    for (idx, row) in segment.iter().enumerate() {
        if row.start.is_none() && row.end.is_none() {
            continue;
        }

        let mut start = row.start.unwrap_or_else(|| prev_end.unwrap_or(0.0));
        if let Some(pe) = prev_end {
            if start < pe {
                start = pe;
            }
        }

        let next_start = segment[idx + 1..]
            .iter()
            .filter_map(|r| r.start)
            .find(|&s| s > start);

        let end = match row.end {
            Some(e) if e > start => e,
            _ => next_start.unwrap_or(start + min_dur),
        };
        prev_end = Some(end);

        if row.start != Some(start) || row.end != Some(end) {
            updates.push((start, end, row.word_index));
        }
    }
}

// ---------------------------------------------------------------------------
// Read-side: in-memory token lists
// ---------------------------------------------------------------------------

fn normalize_segment_tokens(tokens: &mut [Token], min_dur: f64) {
    let mut prev_end: Option<f64> = None;

    for idx in 0..tokens.len() {
        let mut start = tokens[idx]
            .start
            .unwrap_or_else(|| prev_end.unwrap_or(0.0));
        if let Some(pe) = prev_end {
            if start < pe {
                start = pe;
            }
        }

        let next_start = tokens[idx + 1..]
            .iter()
            .filter_map(|t| t.start)
            .find(|&s| s > start);

        let end = match tokens[idx].end {
            Some(e) if e > start => e,
            _ => next_start.unwrap_or(start + min_dur),
        };

        tokens[idx].start = Some(start);
        tokens[idx].end = Some(end);
        prev_end = Some(end);
    }
}

/// Convert stored rows into response tokens: each segment normalized, with a
/// synthetic `{"\n", prev_end, prev_end}` marker between segments.
pub fn rows_to_tokens_normalized(rows: &[WordRow], min_dur: f64) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(rows.len());
    let mut segment_buffer: Vec<Token> = Vec::new();
    let mut current_segment: Option<i64> = None;

    let flush = |buffer: &mut Vec<Token>, out: &mut Vec<Token>, min_dur: f64| {
        normalize_segment_tokens(buffer, min_dur);
        out.append(buffer);
    };

    for row in rows {
        if current_segment.is_some() && current_segment != Some(row.segment_index) {
            flush(&mut segment_buffer, &mut out, min_dur);
            let prev_end = out.last().and_then(|t| t.end).unwrap_or(0.0);
            out.push(Token::newline(prev_end));
        }
        segment_buffer.push(Token {
            word: row.word.clone(),
            start: row.start,
            end: row.end,
            probability: row.probability,
        });
        current_segment = Some(row.segment_index);
    }
    if !segment_buffer.is_empty() {
        flush(&mut segment_buffer, &mut out, min_dur);
    }
    out
}

/// Normalize a stored JSON token list for a response, applying the same
/// per-segment rules and replacing each `"\n"` token with a synthetic marker
/// pinned to the previous token's end.
pub fn normalize_words_json(words: &[Token], min_dur: f64) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(words.len());
    let mut segment_buffer: Vec<Token> = Vec::new();

    for token in words {
        if token.is_newline() {
            normalize_segment_tokens(&mut segment_buffer, min_dur);
            out.append(&mut segment_buffer);
            let prev_end = out.last().and_then(|t| t.end).unwrap_or(0.0);
            out.push(Token::newline(prev_end));
            continue;
        }
        segment_buffer.push(token.clone());
    }
    normalize_segment_tokens(&mut segment_buffer, min_dur);
    out.append(&mut segment_buffer);
    out
}

/// Slice a stored JSON token list to segments `[seg, end_seg]`, preserving
/// the newline tokens between included segments. The slice is raw; callers
/// normalize it afterwards.
pub fn slice_words_json(words: &[Token], seg: usize, end_seg: usize) -> Vec<Token> {
    let mut out = Vec::new();
    let mut current = 0usize;
    let mut started = false;

    for token in words {
        if token.is_newline() {
            if started && current >= end_seg {
                break;
            }
            current += 1;
            if started && current <= end_seg {
                out.push(token.clone());
            }
            continue;
        }
        if current < seg {
            continue;
        }
        started = true;
        out.push(token.clone());
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
