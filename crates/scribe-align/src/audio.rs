//! Audio file resolution for alignment clips.
//!
//! Documents are path-like (`folder/file.opus`) and resolve directly under
//! the audio root. Repositories that store audio out-of-band may leave a
//! tiny pointer file in place of the blob; a pointer carries a
//! `sha:<40-64 hex>` marker referencing `{audio_root}/blobs/<sha>`. That is
//! the only dereference supported.

use std::fs;
use std::path::{Path, PathBuf};

/// Maximum size of a file considered as a pointer candidate.
const POINTER_MAX_BYTES: u64 = 512;

/// Resolve the audio file for `doc` under `audio_root`, following a pointer
/// stub when present. Returns `None` when no file exists.
pub fn resolve_audio(audio_root: &Path, doc: &str) -> Option<PathBuf> {
    let direct = audio_root.join(doc);
    if direct.is_file() {
        return Some(dereference_pointer(audio_root, direct));
    }
    None
}

/// If `path` is a ≤512-byte file containing a `sha:<hex>` marker, substitute
/// `{audio_root}/blobs/<sha>` when that blob exists; otherwise return the
/// original path.
pub fn dereference_pointer(audio_root: &Path, path: PathBuf) -> PathBuf {
    let Ok(metadata) = fs::metadata(&path) else {
        return path;
    };
    if !metadata.is_file() || metadata.len() > POINTER_MAX_BYTES {
        return path;
    }
    let Ok(bytes) = fs::read(&path) else {
        return path;
    };
    let text = String::from_utf8_lossy(&bytes);
    if let Some(sha) = find_sha_marker(&text) {
        let candidate = audio_root.join("blobs").join(sha);
        if candidate.is_file() {
            return candidate;
        }
    }
    path
}

/// Locate a `sha:<40-64 hex>` marker with word-ish boundaries on both sides.
fn find_sha_marker(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find("sha:") {
        let marker_start = search_from + rel;
        let hex_start = marker_start + 4;
        let hex_len = text[hex_start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .count();

        let preceded_ok = marker_start == 0
            || !text[..marker_start]
                .chars()
                .next_back()
                .map(|c| c.is_ascii_alphanumeric())
                .unwrap_or(false);

        if preceded_ok && (40..=64).contains(&hex_len) {
            return Some(&text[hex_start..hex_start + hex_len]);
        }
        search_from = hex_start;
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
