//! Line-based text diff using Myers algorithm via the `similar` crate.
//!
//! Edit deltas store a unified diff with zero lines of context between the
//! parent and child text. The output is deterministic for a given input
//! pair, so stored patches are stable across replays.

use similar::TextDiff;

/// Unified, zero-context, line-based diff of `old` vs `new`.
pub fn diff_text(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    diff.unified_diff().context_radius(0).to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
