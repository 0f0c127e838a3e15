//! Timing carry-over between transcript versions.
//!
//! When a save changes the token sequence, timings from the prior version
//! are copied onto the tokens that survived the edit. Matching is a
//! left-to-right stream with a bounded lookahead; unmatched tokens keep no
//! timing at all — fabricating times here would mask alignment bugs, so a
//! token either inherits a real prior timing or waits for the aligner.

use scribe_core::{Result, ScribeError, Token, WordRow};
use scribe_text::{compose, relaxed, tokenize};

/// How far ahead of the stream cursor a match may be found before falling
/// back to a full scan of the remaining prior sequence.
const LOOKAHEAD: usize = 128;

// ---------------------------------------------------------------------------
// BaselineSource
// ---------------------------------------------------------------------------

/// Last-resort provider of a baseline token sequence for documents that have
/// no stored prior version — typically backed by the transcript-discovery
/// service. The server may run without one.
pub trait BaselineSource: Send + Sync {
    fn load(&self, doc: &str) -> Option<Vec<Token>>;
}

// ---------------------------------------------------------------------------
// PrevToken
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrevKind {
    Word,
    Space,
    Newline,
}

/// One token of the prior sequence, tagged for matching.
#[derive(Debug, Clone)]
pub struct PrevToken {
    word: String,
    start: Option<f64>,
    end: Option<f64>,
    probability: Option<f64>,
    kind: PrevKind,
    key: Option<String>,
    used: bool,
}

impl PrevToken {
    fn new(word: String, start: Option<f64>, end: Option<f64>, probability: Option<f64>) -> Self {
        let (kind, key) = if word == "\n" {
            (PrevKind::Newline, None)
        } else {
            let stripped = word.trim();
            if stripped.is_empty() {
                (PrevKind::Space, None)
            } else {
                (PrevKind::Word, Some(stripped.to_string()))
            }
        };
        Self {
            word,
            start,
            end,
            probability,
            kind,
            key,
            used: false,
        }
    }
}

/// Build the prior sequence from stored per-word rows.
pub fn previous_from_rows(rows: &[WordRow]) -> Vec<PrevToken> {
    rows.iter()
        .map(|row| PrevToken::new(row.word.clone(), row.start, row.end, row.probability))
        .collect()
}

/// Build the prior sequence from a stored (or baseline) token list.
pub fn previous_from_words(words: &[Token]) -> Vec<PrevToken> {
    words
        .iter()
        .map(|t| PrevToken::new(t.word.clone(), t.start, t.end, t.probability))
        .collect()
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

fn matches_key(candidate: &PrevToken, word: &str, stripped: &str) -> bool {
    candidate.kind == PrevKind::Word
        && !candidate.used
        && (candidate.word == word || candidate.key.as_deref() == Some(stripped))
}

fn find_match(prev: &mut [PrevToken], cursor: &mut usize, word: &str) -> Option<usize> {
    let stripped = word.trim();
    let total = prev.len();

    let window_end = (*cursor + LOOKAHEAD).min(total);
    for idx in *cursor..window_end {
        if matches_key(&prev[idx], word, stripped) {
            prev[idx].used = true;
            *cursor = idx + 1;
            return Some(idx);
        }
    }
    for idx in 0..total {
        if matches_key(&prev[idx], word, stripped) {
            prev[idx].used = true;
            *cursor = idx + 1;
            return Some(idx);
        }
    }
    None
}

/// Copy `start`/`end`/`probability` from matched prior tokens onto new
/// tokens that lack them.
///
/// Newline tokens pass through untouched; whitespace runs consume no prior
/// token and take the last matched end as a zero-width interval; unmatched
/// word tokens have their timing cleared. Returns the enriched list and the
/// number of tokens that received a start time.
pub fn assign_from_previous(prev: &mut [PrevToken], words: &[Token]) -> (Vec<Token>, usize) {
    let mut results = Vec::with_capacity(words.len());
    let mut assigned = 0usize;
    let mut cursor = 0usize;
    let mut last_valid_end = 0.0f64;

    for token in words {
        let mut enriched = token.clone();

        if enriched.is_newline() {
            results.push(enriched);
            continue;
        }

        if enriched.is_whitespace() {
            enriched.start = Some(last_valid_end);
            enriched.end = Some(last_valid_end);
            enriched.probability = None;
            results.push(enriched);
            continue;
        }

        match find_match(prev, &mut cursor, &enriched.word) {
            Some(idx) => {
                let matched = &prev[idx];
                if enriched.start.is_none() {
                    if let Some(start) = matched.start {
                        enriched.start = Some(start);
                        assigned += 1;
                    }
                }
                if enriched.end.is_none() {
                    enriched.end = matched.end;
                }
                if enriched.probability.is_none() {
                    enriched.probability = matched.probability;
                }
                if let Some(end) = enriched.end {
                    last_valid_end = end;
                }
            }
            None => {
                enriched.start = None;
                enriched.end = None;
                enriched.probability = None;
            }
        }
        results.push(enriched);
    }

    (results, assigned)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject token sequences with inverted or non-monotone timings.
///
/// Whitespace and newline tokens are skipped; for the rest, `end >= start`
/// must hold and `start` may not precede the most recent word token's end.
pub fn validate_timings(words: &[Token]) -> Result<()> {
    let mut last_end: Option<f64> = None;

    for token in words {
        if token.is_newline() || token.is_whitespace() {
            continue;
        }
        if let (Some(start), Some(end)) = (token.start, token.end) {
            if end < start {
                return Err(ScribeError::InvalidTiming(format!(
                    "word '{}' end ({end}) < start ({start})",
                    token.word
                )));
            }
        }
        if let (Some(start), Some(prev_end)) = (token.start, last_end) {
            if start < prev_end {
                return Err(ScribeError::InvalidTiming(format!(
                    "word '{}' starts at {start} but previous word ends at {prev_end}",
                    token.word
                )));
            }
        }
        if let Some(end) = token.end {
            last_end = Some(end);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ensure_words_match_text
// ---------------------------------------------------------------------------

/// Reconcile a client-submitted token list with the edited text.
///
/// A list carrying any timing or probability is trusted as-is. Otherwise the
/// composed list must structurally equal the text under the relaxed compare;
/// when it does not, the text is retokenized and timings are carried over
/// from the submitted list.
pub fn ensure_words_match_text(text: &str, words: Vec<Token>) -> Vec<Token> {
    if words.iter().any(Token::has_any_timing) {
        return words;
    }
    if relaxed(&compose(&words)) == relaxed(text) {
        return words;
    }
    let retokenized = tokenize(text);
    let mut prev = previous_from_words(&words);
    let (enriched, assigned) = assign_from_previous(&mut prev, &retokenized);
    tracing::debug!(assigned, total = enriched.len(), "retokenized words from text");
    enriched
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
