//! Align-on-demand: recompute timings for one stored segment window.

use std::collections::HashMap;

use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};

use scribe_align::{
    clip_bounds_from_rows, dereference_pointer, explode_words, map_aligned, resolve_audio,
    segment_window, LocalToken, TimingAdjustBlock,
};
use scribe_core::{db, validate_doc, WordRow};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

// ---------------------------------------------------------------------------
// Request / outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AlignSegmentRequest {
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub segment: Option<i64>,
    #[serde(default)]
    pub neighbors: Option<i64>,
}

/// `ok(changed, total)` | `skip(reason)` — skips are successful responses,
/// not errors.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AlignOutcome {
    Completed {
        ok: bool,
        changed_count: usize,
        total_compared: usize,
    },
    Skipped {
        ok: bool,
        reason: String,
    },
}

impl AlignOutcome {
    fn completed(changed_count: usize, total_compared: usize) -> Self {
        Self::Completed {
            ok: true,
            changed_count,
            total_compared,
        }
    }

    fn skipped(reason: &str) -> Self {
        Self::Skipped {
            ok: false,
            reason: reason.to_string(),
        }
    }
}

/// Per-token diff recorded in the edit delta's `token_ops` array.
#[derive(Debug, Serialize)]
struct TimingDiff {
    word: String,
    old_start: f64,
    old_end: f64,
    new_start: f64,
    new_end: f64,
    delta_start: f64,
    delta_end: f64,
    segment_index: i64,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub async fn align_segment(state: SharedState, request: AlignSegmentRequest) -> ApiResult<AlignOutcome> {
    let doc = request.doc.trim().to_string();
    let segment = match request.segment.filter(|s| *s >= 0) {
        Some(segment) => segment as usize,
        None => return Err(ApiError::BadRequest("missing doc/segment".into())),
    };
    if doc.is_empty() {
        return Err(ApiError::BadRequest("missing doc/segment".into()));
    }
    validate_doc(&doc)?;
    let neighbors = state.config.clamp_neighbors(request.neighbors, 0);

    let (version, rows) = {
        let conn = state.conn()?;
        let version = match request.version {
            Some(version) => version,
            None => db::latest_version(&conn, &doc)?
                .map(|row| row.version)
                .ok_or_else(|| ApiError::NotFound("no transcript available".into()))?,
        };
        let (start_seg, end_seg) = segment_window(segment, neighbors);
        let rows = db::fetch_word_rows(&conn, &doc, version, Some((start_seg as i64, end_seg as i64)))?;
        (version, rows)
    };
    let (start_seg, end_seg) = segment_window(segment, neighbors);

    if rows.is_empty() {
        return Ok(AlignOutcome::skipped("no-words"));
    }

    let (clip_start, clip_end) = match clip_bounds_from_rows(&rows) {
        Some((start, end)) if end > start => (start, end),
        _ => return Ok(AlignOutcome::skipped("no-timings")),
    };

    // Whitespace-run rows carry no alignable text.
    let window: Vec<LocalToken> = rows
        .iter()
        .filter(|row| !row.word.trim().is_empty())
        .map(|row| LocalToken {
            word_index: row.word_index,
            text: row.word.clone(),
            segment_index: row.segment_index,
        })
        .collect();
    let transcript = window
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    if transcript.trim().is_empty() {
        return Ok(AlignOutcome::skipped("no-words"));
    }

    let audio_root = state.config.audio_root();
    let Some(audio_path) = resolve_audio(&audio_root, &doc) else {
        return Ok(AlignOutcome::skipped("audio-not-found"));
    };
    let audio_path = dereference_pointer(&audio_root, audio_path);

    let (wav_bytes, ss, to) = match scribe_align::extract_wav_clip(
        &audio_path,
        clip_start,
        clip_end,
        state.config.clip_pad_sec,
    )
    .await
    {
        Ok(clip) => clip,
        Err(err) => {
            tracing::warn!(doc = %doc, segment, error = %err, "align skipped: clip extraction failed");
            return Ok(AlignOutcome::skipped("align-unavailable"));
        }
    };

    let (resp_words, raw_response) = match state.align.align(wav_bytes.clone(), &transcript).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(doc = %doc, segment, error = %err, "align skipped: aligner unavailable");
            return Ok(AlignOutcome::skipped("align-unavailable"));
        }
    };
    let resp_words = explode_words(resp_words);

    state
        .artifacts
        .save("align", &doc, Some(segment), ss, to, &wav_bytes, &raw_response, Some(&audio_path))
        .await;

    let (updates, matched) = map_aligned(&window, &resp_words, ss, state.config.min_token_duration_sec);
    tracing::info!(
        doc = %doc,
        version,
        segment,
        window = window.len(),
        resp = resp_words.len(),
        matched,
        "align mapping"
    );
    if matched == 0 {
        return Ok(AlignOutcome::completed(0, 0));
    }

    let by_word_index: HashMap<i64, &WordRow> =
        rows.iter().map(|row| (row.word_index, row)).collect();
    let diffs: Vec<TimingDiff> = updates
        .iter()
        .map(|update| {
            let old = by_word_index.get(&update.word_index);
            let old_start = old.and_then(|r| r.start.or(r.end)).unwrap_or(0.0);
            let old_end = old.and_then(|r| r.end.or(r.start)).unwrap_or(old_start);
            TimingDiff {
                word: old.map(|r| r.word.trim().to_string()).unwrap_or_default(),
                old_start,
                old_end,
                new_start: update.start,
                new_end: update.end,
                delta_start: update.start - old_start,
                delta_end: update.end - old_end,
                segment_index: old.map(|r| r.segment_index).unwrap_or(segment as i64),
            }
        })
        .collect();

    let changed_count = diffs
        .iter()
        .filter(|d| d.delta_start.abs() > 1e-3 || d.delta_end.abs() > 1e-3)
        .count();
    let total_compared = diffs.len();

    let block = TimingAdjustBlock::new(
        start_seg,
        end_seg,
        ss,
        to,
        serde_json::to_value(&diffs).map_err(scribe_core::ScribeError::from)?,
    );
    let block_value = serde_json::to_value(&block).map_err(scribe_core::ScribeError::from)?;
    let row_updates: Vec<(f64, f64, i64)> = updates
        .iter()
        .map(|u| (u.start, u.end, u.word_index))
        .collect();

    let pool = state.pool.clone();
    let doc_for_tx = doc.clone();
    tokio::task::spawn_blocking(move || -> scribe_core::Result<()> {
        let mut conn = pool.get()?;
        if !row_updates.is_empty() {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            db::update_word_timings(&tx, &doc_for_tx, version, &row_updates)?;
            tx.commit()?;
        }
        let parent_version = (version - 1).max(0);
        db::append_token_ops(&mut conn, &doc_for_tx, parent_version, version, &block_value)?;
        Ok(())
    })
    .await
    .map_err(|err| ApiError::Internal(format!("align task failed: {err}")))??;

    tracing::info!(doc = %doc, version, segment, changed_count, total_compared, "timings updated");
    Ok(AlignOutcome::completed(changed_count, total_compared))
}
