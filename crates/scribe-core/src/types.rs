use serde::{Deserialize, Serialize};

use crate::error::{Result, ScribeError};

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// One atomic unit of a transcript — a word, a whitespace run, or the
/// reserved `"\n"` segment boundary.
///
/// `start`/`end` are seconds in the source audio; `probability` is the
/// recognizer confidence. All three are optional and survive round-trips as
/// JSON nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub word: String,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub probability: Option<f64>,
}

impl Token {
    /// A token carrying only text, with no timing or probability attached.
    pub fn bare(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            start: None,
            end: None,
            probability: None,
        }
    }

    /// The `"\n"` segment-boundary marker with synthetic timings.
    pub fn newline(at: f64) -> Self {
        Self {
            word: "\n".into(),
            start: Some(at),
            end: Some(at),
            probability: None,
        }
    }

    pub fn is_newline(&self) -> bool {
        self.word == "\n"
    }

    /// Whitespace-only (but not a segment boundary).
    pub fn is_whitespace(&self) -> bool {
        !self.is_newline() && self.word.trim().is_empty()
    }

    pub fn has_any_timing(&self) -> bool {
        self.start.is_some() || self.end.is_some() || self.probability.is_some()
    }
}

// ---------------------------------------------------------------------------
// VersionRecord
// ---------------------------------------------------------------------------

/// One stored transcript version. `base_sha256` is the SHA-256 of the
/// canonicalized `text` and doubles as the optimistic-concurrency token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: i64,
    pub base_sha256: String,
    pub text: String,
    pub words: Vec<Token>,
    pub created_by: String,
}

// ---------------------------------------------------------------------------
// WordRow
// ---------------------------------------------------------------------------

/// One normalized per-word row mirroring the stored `words` list.
///
/// Newline tokens are never materialized as rows; they only advance
/// `segment_index`. `word_index` is the token's position in the stored list.
#[derive(Debug, Clone, PartialEq)]
pub struct WordRow {
    pub segment_index: i64,
    pub word_index: i64,
    pub word: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub probability: Option<f64>,
}

// ---------------------------------------------------------------------------
// EditDeltaRow / HistoryEntry
// ---------------------------------------------------------------------------

/// Stored diff between a parent and child version of the same document.
#[derive(Debug, Clone, Serialize)]
pub struct EditDeltaRow {
    pub parent_version: i64,
    pub child_version: i64,
    pub dmp_patch: Option<String>,
    pub token_ops: Option<String>,
}

/// One entry of the `/history` lineage response.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub version: i64,
    pub parent_version: i64,
    pub hash: String,
    pub created_at: String,
    pub created_by: String,
}

// ---------------------------------------------------------------------------
// Confirmations
// ---------------------------------------------------------------------------

/// A stored confirmation range over a specific version's text.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRow {
    pub id: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub prefix: String,
    pub exact: String,
    pub suffix: String,
}

/// Client-submitted confirmation range. Missing fields default to empty.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationItem {
    #[serde(default)]
    pub start_offset: i64,
    #[serde(default)]
    pub end_offset: Option<i64>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub exact: String,
    #[serde(default)]
    pub suffix: String,
}

// ---------------------------------------------------------------------------
// Document identifiers
// ---------------------------------------------------------------------------

/// Reject document identifiers that could escape the data root.
///
/// A valid `doc` is a non-empty relative path: no NUL bytes, no absolute
/// prefixes (`/`, `\`, `X:\`), and no `..` components on either separator.
pub fn validate_doc(doc: &str) -> Result<()> {
    let cleaned = doc.trim();
    if cleaned.is_empty() || cleaned.contains('\0') {
        return Err(ScribeError::InvalidInput("invalid doc".into()));
    }
    if cleaned.starts_with('/') || cleaned.starts_with('\\') {
        return Err(ScribeError::InvalidInput("invalid doc".into()));
    }
    let mut chars = cleaned.chars();
    if let (Some(first), Some(second)) = (chars.next(), chars.next()) {
        if first.is_ascii_alphabetic() && second == ':' {
            return Err(ScribeError::InvalidInput("invalid doc".into()));
        }
    }
    let has_dotdot = cleaned
        .split(['/', '\\'])
        .any(|part| part == "..");
    if has_dotdot {
        return Err(ScribeError::InvalidInput("invalid doc".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
