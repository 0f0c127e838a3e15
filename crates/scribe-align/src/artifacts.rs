//! Best-effort debug artifacts for alignment calls.
//!
//! Every aligner invocation can leave behind the submitted clip and the raw
//! response under the audio-log directory. Nothing here is load-bearing: any
//! failure is logged and swallowed.

use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::clip::extract_native_clip;

/// Writer for per-call alignment artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    save_native: bool,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, save_native: bool) -> Self {
        Self {
            dir: dir.into(),
            save_native,
        }
    }

    /// Persist `{base}.wav` and `{base}.response.json`, plus an un-resampled
    /// `{base}.native.wav` cut from the source audio when enabled.
    pub async fn save(
        &self,
        kind: &str,
        doc: &str,
        segment: Option<usize>,
        clip_start: f64,
        clip_end: f64,
        wav_bytes: &[u8],
        response: &serde_json::Value,
        src_audio: Option<&Path>,
    ) {
        if let Err(err) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::warn!(error = %err, dir = %self.dir.display(), "cannot create audio-log dir");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let uid: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let seg_part = match segment {
            Some(seg) => format!("seg{seg}"),
            None => "segNA".to_string(),
        };
        let base = format!(
            "{kind}_{}_{seg_part}_{timestamp}_{uid}_{clip_start:.3}-{clip_end:.3}",
            safe_name(doc)
        );

        let wav_path = self.dir.join(format!("{base}.wav"));
        if let Err(err) = tokio::fs::write(&wav_path, wav_bytes).await {
            tracing::warn!(error = %err, path = %wav_path.display(), "failed to write clip artifact");
        }

        let json_path = self.dir.join(format!("{base}.response.json"));
        match serde_json::to_vec(response) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(&json_path, bytes).await {
                    tracing::warn!(error = %err, path = %json_path.display(), "failed to write response artifact");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to encode response artifact"),
        }

        if self.save_native {
            if let Some(src) = src_audio {
                let native_path = self.dir.join(format!("{base}.native.wav"));
                if let Err(err) = extract_native_clip(src, clip_start, clip_end, &native_path).await {
                    tracing::warn!(error = %err, "failed to write native clip artifact");
                }
            }
        }
    }
}

/// Filesystem-safe token for artifact names: path separators become `__`,
/// whitespace runs collapse, and anything outside `[A-Za-z0-9_.\-#]` maps
/// to `_`.
fn safe_name(value: &str) -> String {
    let replaced = value.replace(['/', '\\'], "__");
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '#') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
