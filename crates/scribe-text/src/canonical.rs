//! Text canonicalization for hashing and comparison.
//!
//! Two normal forms exist:
//!
//! - [`canonicalize`] — the storage form. Line structure is preserved; only
//!   line endings, NBSP, bidi formatting marks, and trailing horizontal
//!   whitespace are normalized. `base_sha256` is computed over this form.
//! - [`relaxed`] — the comparison form. Collapses all whitespace (including
//!   newlines) to single spaces so texts that differ only in spacing or
//!   line breaks compare equal.

/// Unicode bidirectional formatting marks stripped from both normal forms:
/// U+200E/F, U+202A..U+202E, U+2066..U+2069.
fn is_bidi_mark(c: char) -> bool {
    matches!(c, '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}')
}

fn is_horizontal_whitespace(c: char) -> bool {
    c != '\n' && c.is_whitespace()
}

/// Canonicalize text for storage and hashing.
///
/// CRLF (and stray CR) become LF, NBSP becomes a plain space, bidi marks are
/// removed, and trailing horizontal whitespace is trimmed per line. The
/// stored `text` of every version is already in this form.
pub fn canonicalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let cleaned: String = unified
        .chars()
        .filter(|c| !is_bidi_mark(*c))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect();

    let mut lines: Vec<&str> = cleaned.split('\n').collect();
    for line in &mut lines {
        *line = line.trim_end_matches(is_horizontal_whitespace);
    }
    lines.join("\n")
}

/// Relaxed comparison form: CR removed, NBSP mapped to space, bidi marks
/// stripped, every whitespace run (newlines included) collapsed to a single
/// space, leading/trailing whitespace trimmed.
pub fn relaxed(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '\r' && !is_bidi_mark(*c))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
