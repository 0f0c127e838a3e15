//! Mapping of aligner responses back onto local token indices.
//!
//! The aligner sees only the windowed transcript; its word sequence can
//! drift from the local tokens (merged words, dropped fillers). Matching
//! runs Myers diff over the two text sequences and only pairs tokens the
//! opcodes agree on, so a bad alignment degrades to "no update" rather than
//! to wrong timings.

use serde::Serialize;
use similar::{Algorithm, DiffOp};

use scribe_core::{Token, WordRow};

use crate::client::AlignedWord;

/// Service tag recorded in persisted `token_ops` blocks.
pub const ALIGN_SERVICE: &str = "forced-aligner";

// ---------------------------------------------------------------------------
// Window construction
// ---------------------------------------------------------------------------

/// One local token of the alignment window.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalToken {
    pub word_index: i64,
    pub text: String,
    pub segment_index: i64,
}

/// Collect the non-whitespace tokens of segments `[start_seg, end_seg]` and
/// the space-joined transcript submitted to the aligner. Whitespace runs are
/// excluded — the aligner chokes on bare separator tokens.
pub fn build_window(words: &[Token], start_seg: usize, end_seg: usize) -> (Vec<LocalToken>, String) {
    let mut window = Vec::new();
    let mut transcript_parts: Vec<&str> = Vec::new();
    let mut segment = 0usize;

    for (word_index, token) in words.iter().enumerate() {
        if token.is_newline() {
            segment += 1;
            continue;
        }
        if segment < start_seg || segment > end_seg {
            continue;
        }
        if token.word.trim().is_empty() {
            continue;
        }
        window.push(LocalToken {
            word_index: word_index as i64,
            text: token.word.clone(),
            segment_index: segment as i64,
        });
        transcript_parts.push(token.word.as_str());
    }

    let transcript = transcript_parts.join(" ").trim().to_string();
    (window, transcript)
}

/// Inclusive segment window around `seg`, floored at segment zero.
pub fn segment_window(seg: usize, neighbors: usize) -> (usize, usize) {
    (seg.saturating_sub(neighbors), seg + neighbors)
}

/// Clip bounds covering a set of stored rows: `(min start, max end)`, or
/// `None` when the window carries no usable timings.
pub fn clip_bounds_from_rows(rows: &[WordRow]) -> Option<(f64, f64)> {
    let start = rows
        .iter()
        .filter_map(|r| r.start)
        .min_by(|a, b| a.total_cmp(b))?;
    let end = rows
        .iter()
        .filter_map(|r| r.end)
        .max_by(|a, b| a.total_cmp(b))?;
    Some((start, end))
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// One timing update addressed to a `word_index` of the stored rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingUpdate {
    pub start: f64,
    pub end: f64,
    pub word_index: i64,
}

/// Map aligner response words onto local token indices.
///
/// `offset` is the clip's start within the source audio; response times are
/// clip-relative and shifted by it. Returns the updates plus the matched
/// count — zero matches means the window is unaligned and the caller records
/// nothing.
pub fn map_aligned(
    window: &[LocalToken],
    resp: &[AlignedWord],
    offset: f64,
    min_dur: f64,
) -> (Vec<TimingUpdate>, usize) {
    let new_seq: Vec<(i64, String)> = window
        .iter()
        .filter(|t| !t.text.trim().is_empty())
        .map(|t| (t.word_index, t.text.trim().to_string()))
        .collect();
    let resp_seq: Vec<(&AlignedWord, String)> = resp
        .iter()
        .filter(|w| !w.word.trim().is_empty())
        .map(|w| (w, w.word.trim().to_string()))
        .collect();

    if resp_seq.len() == 1 && new_seq.len() > 1 {
        return distribute_single_response(&new_seq, resp_seq[0].0, offset);
    }

    let new_texts: Vec<&str> = new_seq.iter().map(|(_, t)| t.as_str()).collect();
    let resp_texts: Vec<&str> = resp_seq.iter().map(|(_, t)| t.as_str()).collect();
    let ops = similar::capture_diff_slices(Algorithm::Myers, &new_texts, &resp_texts);

    let mut updates = Vec::new();
    let mut matched = 0usize;

    let mut pair = |local_idx: usize, resp_idx: usize| {
        if let Some((rs, re)) = response_interval(&resp_seq, resp_idx, offset, min_dur) {
            updates.push(TimingUpdate {
                start: rs,
                end: re,
                word_index: new_seq[local_idx].0,
            });
            matched += 1;
        }
    };

    for op in &ops {
        match op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => {
                for k in 0..*len {
                    pair(old_index + k, new_index + k);
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                // Pair prefixes up to the shorter side; the rest stays
                // unmatched.
                for k in 0..(*old_len).min(*new_len) {
                    pair(old_index + k, new_index + k);
                }
            }
            DiffOp::Delete { .. } | DiffOp::Insert { .. } => {}
        }
    }

    (updates, matched)
}

/// A single response token covering a multi-token window: spread its
/// interval across the local tokens proportional to character length, with a
/// 0.01 s floor per token.
fn distribute_single_response(
    new_seq: &[(i64, String)],
    resp: &AlignedWord,
    offset: f64,
) -> (Vec<TimingUpdate>, usize) {
    let (Some(start), Some(end)) = (resp.start, resp.end) else {
        return (Vec::new(), 0);
    };
    let rs = start + offset;
    let mut re = end + offset;
    if re <= rs {
        re = rs + 0.01;
    }
    let span = re - rs;
    let total_chars: usize = new_seq.iter().map(|(_, t)| t.chars().count().max(1)).sum();

    let mut updates = Vec::with_capacity(new_seq.len());
    let mut cursor = rs;
    let count = new_seq.len();
    for (idx, (word_index, text)) in new_seq.iter().enumerate() {
        let (ns, ne) = if idx == count - 1 {
            let ns = cursor;
            let ne = if re > ns { re } else { ns + 0.01 };
            (ns, ne)
        } else {
            let frac = text.chars().count().max(1) as f64 / total_chars as f64;
            let dur = (span * frac).max(0.01);
            let ns = cursor;
            (ns, (ns + dur).min(re))
        };
        updates.push(TimingUpdate {
            start: ns,
            end: ne,
            word_index: *word_index,
        });
        cursor = ne;
    }
    let matched = updates.len();
    (updates, matched)
}

/// Shifted `[rs, re]` for one response token. A missing start disqualifies
/// the pair; a missing or inverted end takes the next response start when
/// that is later, else `rs + min_dur`.
fn response_interval(
    resp_seq: &[(&AlignedWord, String)],
    idx: usize,
    offset: f64,
    min_dur: f64,
) -> Option<(f64, f64)> {
    let rs = resp_seq[idx].0.start? + offset;
    if let Some(re) = resp_seq[idx].0.end.map(|e| e + offset) {
        if re > rs {
            return Some((rs, re));
        }
    }
    let next_start = resp_seq
        .get(idx + 1)
        .and_then(|(w, _)| w.start)
        .map(|s| s + offset);
    match next_start {
        Some(next) if next > rs => Some((rs, next)),
        _ => Some((rs, rs + min_dur)),
    }
}

// ---------------------------------------------------------------------------
// token_ops block
// ---------------------------------------------------------------------------

/// One persisted `token_ops` entry describing a timing adjustment applied to
/// a segment window.
#[derive(Debug, Clone, Serialize)]
pub struct TimingAdjustBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub segment_start: i64,
    pub segment_end: i64,
    pub clip_start: f64,
    pub clip_end: f64,
    pub items: serde_json::Value,
    pub service: String,
}

impl TimingAdjustBlock {
    pub fn new(
        segment_start: usize,
        segment_end: usize,
        clip_start: f64,
        clip_end: f64,
        items: serde_json::Value,
    ) -> Self {
        Self {
            kind: "timing_adjust".into(),
            segment_start: segment_start as i64,
            segment_end: segment_end as i64,
            clip_start,
            clip_end,
            items,
            service: ALIGN_SERVICE.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
