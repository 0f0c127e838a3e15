//! The save coordinator: conflict gate, optional pre-save realignment,
//! timing carry-over, and the transactional write of a new version.

use std::collections::BTreeSet;

use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};

use scribe_align::{
    build_window, clip_bounds_from_rows, dereference_pointer, explode_words, map_aligned,
    resolve_audio, segment_window, TimingAdjustBlock, TimingUpdate,
};
use scribe_core::{db, sha256_hex, validate_doc, Token, VersionRecord};
use scribe_text::{
    canonicalize, compose, detect_changed_segments, diff_text, sanitize_tokens, sanitize_words,
};
use scribe_timing::{
    assign_from_previous, ensure_words_match_text, normalize_row_timings, normalize_words_json,
    previous_from_rows, previous_from_words, validate_timings,
};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

// ---------------------------------------------------------------------------
// Request / outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub doc: String,
    #[serde(default, rename = "parentVersion")]
    pub parent_version: Option<i64>,
    #[serde(default)]
    pub expected_base_sha256: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub words: Vec<serde_json::Value>,
    #[serde(default)]
    pub segment: Option<i64>,
    #[serde(default)]
    pub neighbors: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    MissingParent,
    HashMissing,
    HashConflict,
    VersionConflict,
}

#[derive(Debug, Serialize)]
pub struct ParentInfo {
    pub version: i64,
    pub base_sha256: String,
    pub text: String,
}

/// Structured 409 payload returned to the losing writer.
#[derive(Debug, Serialize)]
pub struct ConflictPayload {
    pub reason: ConflictReason,
    pub latest: VersionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_parent_to_latest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_parent_to_client: Option<String>,
}

/// Result of a save attempt. Conflicts are first-class values, not errors.
pub enum SaveOutcome {
    Saved { version: i64, base_sha256: String },
    InvalidParentForFirst,
    Conflict(Box<ConflictPayload>),
}

// ---------------------------------------------------------------------------
// Conflict gate
// ---------------------------------------------------------------------------

fn conflict_with_diffs(
    conn: &rusqlite::Connection,
    doc: &str,
    reason: ConflictReason,
    latest: &VersionRecord,
    parent_version: i64,
    client_text_canon: &str,
) -> scribe_core::Result<SaveOutcome> {
    let base_text_raw = db::version(conn, doc, parent_version)?
        .map(|row| row.text)
        .unwrap_or_default();
    let base_text = canonicalize(&base_text_raw);
    let latest_text = canonicalize(&latest.text);

    Ok(SaveOutcome::Conflict(Box::new(ConflictPayload {
        reason,
        latest: latest.clone(),
        parent: Some(ParentInfo {
            version: parent_version,
            base_sha256: sha256_hex(&base_text),
            text: base_text_raw,
        }),
        diff_parent_to_latest: Some(diff_text(&base_text, &latest_text)),
        diff_parent_to_client: Some(diff_text(&base_text, client_text_canon)),
    })))
}

/// Evaluate the save gate in order. Returns `None` when the save may
/// proceed.
fn check_save_conflict(
    conn: &rusqlite::Connection,
    doc: &str,
    latest: Option<&VersionRecord>,
    parent_version: Option<i64>,
    expected_base_sha256: &str,
    client_text_canon: &str,
) -> scribe_core::Result<Option<SaveOutcome>> {
    let Some(latest) = latest else {
        // First version: only an absent or zero parent is acceptable.
        if matches!(parent_version, None | Some(0)) {
            return Ok(None);
        }
        return Ok(Some(SaveOutcome::InvalidParentForFirst));
    };

    let Some(parent_version) = parent_version else {
        return Ok(Some(SaveOutcome::Conflict(Box::new(ConflictPayload {
            reason: ConflictReason::MissingParent,
            latest: latest.clone(),
            parent: None,
            diff_parent_to_latest: None,
            diff_parent_to_client: None,
        }))));
    };

    if expected_base_sha256.is_empty() {
        return conflict_with_diffs(
            conn,
            doc,
            ConflictReason::HashMissing,
            latest,
            parent_version,
            client_text_canon,
        )
        .map(Some);
    }

    if parent_version != latest.version {
        return conflict_with_diffs(
            conn,
            doc,
            ConflictReason::VersionConflict,
            latest,
            parent_version,
            client_text_canon,
        )
        .map(Some);
    }

    if expected_base_sha256 != latest.base_sha256 {
        return conflict_with_diffs(
            conn,
            doc,
            ConflictReason::HashConflict,
            latest,
            parent_version,
            client_text_canon,
        )
        .map(Some);
    }

    Ok(None)
}

// ---------------------------------------------------------------------------
// Pre-save realignment
// ---------------------------------------------------------------------------

/// Align one changed-segment window against the previous version's audio
/// span. Any failure along the way is a logged skip; the save never depends
/// on it.
async fn prealign_segment(
    state: &SharedState,
    doc: &str,
    latest: &VersionRecord,
    words: &[Token],
    segment: usize,
    neighbors: usize,
) -> Option<(Vec<TimingUpdate>, TimingAdjustBlock)> {
    let (start_seg, end_seg) = segment_window(segment, neighbors);

    let prev_rows = {
        let conn = state.conn().ok()?;
        db::fetch_word_rows(
            &conn,
            doc,
            latest.version,
            Some((start_seg as i64, end_seg as i64)),
        )
        .ok()?
    };
    let Some((clip_start, clip_end)) = clip_bounds_from_rows(&prev_rows) else {
        tracing::info!(doc, segment, "prealign skipped: no timings in window");
        return None;
    };

    let (window, transcript) = build_window(words, start_seg, end_seg);
    if transcript.is_empty() {
        tracing::info!(doc, segment, "prealign skipped: empty window");
        return None;
    }

    let audio_root = state.config.audio_root();
    let Some(audio_path) = resolve_audio(&audio_root, doc) else {
        tracing::info!(doc, segment, "prealign skipped: audio not found");
        return None;
    };
    let audio_path = dereference_pointer(&audio_root, audio_path);

    let (wav_bytes, ss, to) =
        match scribe_align::extract_wav_clip(&audio_path, clip_start, clip_end, state.config.clip_pad_sec)
            .await
        {
            Ok(clip) => clip,
            Err(err) => {
                tracing::warn!(doc, segment, error = %err, "prealign skipped: clip extraction failed");
                return None;
            }
        };

    let (resp_words, raw_response) = match state.align.align(wav_bytes.clone(), &transcript).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(doc, segment, error = %err, "prealign skipped: aligner unavailable");
            return None;
        }
    };
    let resp_words = explode_words(resp_words);

    state
        .artifacts
        .save("prealign", doc, Some(segment), ss, to, &wav_bytes, &raw_response, Some(&audio_path))
        .await;

    let (updates, matched) = map_aligned(&window, &resp_words, ss, state.config.min_token_duration_sec);
    tracing::info!(
        doc,
        segment,
        window = window.len(),
        resp = resp_words.len(),
        matched,
        "prealign mapping"
    );
    if matched == 0 {
        return None;
    }

    let items: Vec<serde_json::Value> = updates
        .iter()
        .map(|u| {
            serde_json::json!({
                "word_index": u.word_index,
                "new_start": u.start,
                "new_end": u.end,
            })
        })
        .collect();
    let block = TimingAdjustBlock::new(start_seg, end_seg, ss, to, serde_json::Value::Array(items));
    Some((updates, block))
}

/// Run realignment over every changed segment, merging updates so the last
/// writer per `word_index` wins; the first non-null block is recorded.
async fn prealign_updates(
    state: &SharedState,
    doc: &str,
    latest: &VersionRecord,
    words: &[Token],
    changed: &BTreeSet<usize>,
    neighbors: usize,
) -> (Vec<TimingUpdate>, Option<TimingAdjustBlock>) {
    let mut merged: Vec<TimingUpdate> = Vec::new();
    let mut block: Option<TimingAdjustBlock> = None;

    for &segment in changed {
        let Some((updates, segment_block)) =
            prealign_segment(state, doc, latest, words, segment, neighbors).await
        else {
            continue;
        };
        for update in updates {
            merged.retain(|existing| existing.word_index != update.word_index);
            merged.push(update);
        }
        if block.is_none() {
            block = Some(segment_block);
        }
    }

    (merged, block)
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub async fn save_version(
    state: SharedState,
    request: SaveRequest,
    user_id: String,
) -> ApiResult<SaveOutcome> {
    let doc = request.doc.trim().to_string();
    if doc.is_empty() {
        return Err(ApiError::BadRequest("missing doc".into()));
    }
    validate_doc(&doc)?;

    // A client-submitted empty list is a sentinel: the version is stored
    // without per-word rows and reads fall back to the JSON words.
    let client_words_were_empty = request.words.is_empty();
    let mut words = sanitize_words(&request.words)?;

    let client_text_canon = canonicalize(&request.text);
    let latest = {
        let conn = state.conn()?;
        let latest = db::latest_version(&conn, &doc)?;
        if let Some(outcome) = check_save_conflict(
            &conn,
            &doc,
            latest.as_ref(),
            request.parent_version,
            request.expected_base_sha256.trim(),
            &client_text_canon,
        )? {
            return Ok(outcome);
        }
        latest
    };

    let new_version = latest.as_ref().map(|l| l.version).unwrap_or(0) + 1;

    words = ensure_words_match_text(&request.text, words);
    words = sanitize_tokens(words);

    // Re-align changed segments before the write so the new rows land with
    // fresh timings.
    let (align_updates, token_ops_block) = if state.config.align_prealign_on_save {
        match latest.as_ref() {
            Some(latest_row) => {
                let prev_norm =
                    normalize_words_json(&latest_row.words, state.config.min_token_duration_sec);
                let mut changed = detect_changed_segments(&prev_norm, &words);
                if changed.is_empty() {
                    if let Some(hint) = request.segment.filter(|s| *s >= 0) {
                        changed.insert(hint as usize);
                    }
                }
                if changed.is_empty() {
                    (Vec::new(), None)
                } else {
                    let neighbors = state
                        .config
                        .clamp_neighbors(request.neighbors, state.config.neighbor_default);
                    tracing::info!(doc = %doc, ?changed, neighbors, "changed segments for realignment");
                    prealign_updates(&state, &doc, latest_row, &words, &changed, neighbors).await
                }
            }
            None => (Vec::new(), None),
        }
    } else {
        (Vec::new(), None)
    };

    // Carry timings from the prior version onto tokens that lack them.
    {
        let conn = state.conn()?;
        let mut prev_tokens = match latest.as_ref() {
            Some(latest_row) => {
                let rows = db::fetch_word_rows(&conn, &doc, latest_row.version, None)?;
                if rows.is_empty() {
                    previous_from_words(&latest_row.words)
                } else {
                    previous_from_rows(&rows)
                }
            }
            None => Vec::new(),
        };
        if prev_tokens.is_empty() {
            if let Some(baseline) = state.baseline.as_ref() {
                if let Some(tokens) = baseline.load(&doc) {
                    prev_tokens = previous_from_words(&tokens);
                }
            }
        }
        if !prev_tokens.is_empty() {
            let (enriched, assigned) = assign_from_previous(&mut prev_tokens, &words);
            tracing::info!(doc = %doc, assigned, total = enriched.len(), "carried over timings");
            words = enriched;
        }
        validate_timings(&words)?;
    }

    // Recompose the authoritative text from the final token list.
    let store_text = canonicalize(&compose(&words));
    let new_hash = sha256_hex(&store_text);
    let words_json = serde_json::to_string(&words).map_err(scribe_core::ScribeError::from)?;
    let token_ops_json = token_ops_block
        .map(|block| serde_json::to_string(&block))
        .transpose()
        .map_err(scribe_core::ScribeError::from)?;

    let row_updates: Vec<(f64, f64, i64)> = align_updates
        .iter()
        .map(|u| (u.start, u.end, u.word_index))
        .collect();

    let pool = state.pool.clone();
    let min_dur = state.config.min_token_duration_sec;
    let latest_for_tx = latest.clone();
    let doc_for_tx = doc.clone();
    let store_text_for_tx = store_text.clone();
    let hash_for_tx = new_hash.clone();

    tokio::task::spawn_blocking(move || -> scribe_core::Result<()> {
        let mut conn = pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        db::insert_version(
            &tx,
            &doc_for_tx,
            new_version,
            &hash_for_tx,
            &store_text_for_tx,
            &words_json,
            &user_id,
        )?;

        if !client_words_were_empty {
            db::replace_word_rows(&tx, &doc_for_tx, new_version, &words)?;
            if !row_updates.is_empty() {
                db::update_word_timings(&tx, &doc_for_tx, new_version, &row_updates)?;
            }
            if let Some(prev) = latest_for_tx.as_ref() {
                db::backfill_probabilities(&tx, &doc_for_tx, new_version, prev.version)?;
            }
            let rows = db::fetch_word_rows(&tx, &doc_for_tx, new_version, None)?;
            let normalized = normalize_row_timings(&rows, min_dur);
            if !normalized.is_empty() {
                db::update_word_timings(&tx, &doc_for_tx, new_version, &normalized)?;
            }
        }

        if let Some(prev) = latest_for_tx.as_ref() {
            let patch = diff_text(&prev.text, &store_text_for_tx);
            db::upsert_edit_delta(
                &tx,
                &doc_for_tx,
                prev.version,
                new_version,
                &patch,
                token_ops_json.as_deref(),
            )?;

            // Origin-replay edge, written for every non-first version. When
            // the parent is v1 this targets the same (1, new) row as the
            // edge above and replaces it with a null token_ops.
            if new_version > 1 {
                if let Some(origin) = db::version(&tx, &doc_for_tx, 1)? {
                    let origin_patch = diff_text(&origin.text, &store_text_for_tx);
                    db::upsert_edit_delta(&tx, &doc_for_tx, 1, new_version, &origin_patch, None)?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    })
    .await
    .map_err(|err| ApiError::Internal(format!("save task failed: {err}")))??;

    tracing::info!(doc = %doc, version = new_version, "saved transcript version");
    Ok(SaveOutcome::Saved {
        version: new_version,
        base_sha256: new_hash,
    })
}
