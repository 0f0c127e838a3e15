//! HTTP handlers for the `/transcripts` routes.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::TransactionBehavior;
use serde::Deserialize;

use scribe_core::{db, validate_doc, ConfirmationItem, Token};
use scribe_timing::{normalize_words_json, rows_to_tokens_normalized, slice_words_json};

use crate::align_ops::{self, AlignSegmentRequest};
use crate::error::{ApiError, ApiResult};
use crate::save::{self, SaveOutcome, SaveRequest};
use crate::state::SharedState;

/// Segments returned by `/words` when `segment` is given without `count`.
const DEFAULT_SEGMENT_CHUNK: i64 = 50;

fn parse_body<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|err| ApiError::BadRequest(err.to_string()))
}

fn checked_doc(doc: &str) -> ApiResult<&str> {
    let doc = doc.trim();
    if doc.is_empty() {
        return Err(ApiError::BadRequest("missing ?doc=".into()));
    }
    validate_doc(doc)?;
    Ok(doc)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct DocQuery {
    #[serde(default)]
    doc: String,
}

#[derive(Deserialize)]
pub struct DocVersionQuery {
    #[serde(default)]
    doc: String,
    version: i64,
}

#[derive(Deserialize)]
pub struct WordsQuery {
    #[serde(default)]
    doc: String,
    version: i64,
    #[serde(default)]
    segment: Option<i64>,
    #[serde(default)]
    count: Option<i64>,
}

pub async fn latest(
    State(state): State<SharedState>,
    Query(query): Query<DocQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let doc = checked_doc(&query.doc)?;
    let conn = state.conn()?;
    let value = match db::latest_version(&conn, doc)? {
        Some(row) => serde_json::to_value(row).map_err(scribe_core::ScribeError::from)?,
        None => serde_json::json!({}),
    };
    Ok(Json(value))
}

pub async fn get_version(
    State(state): State<SharedState>,
    Query(query): Query<DocVersionQuery>,
) -> ApiResult<Json<scribe_core::VersionRecord>> {
    let doc = checked_doc(&query.doc)?;
    let conn = state.conn()?;
    let row = db::version(&conn, doc, query.version)?
        .ok_or_else(|| ApiError::NotFound("version not found".into()))?;
    Ok(Json(row))
}

pub async fn words(
    State(state): State<SharedState>,
    Query(query): Query<WordsQuery>,
) -> ApiResult<Json<Vec<Token>>> {
    let doc = checked_doc(&query.doc)?;
    let min_dur = state.config.min_token_duration_sec;

    let window = query.segment.filter(|s| *s >= 0).map(|seg| {
        let count = query.count.map(|c| c.max(0)).unwrap_or(DEFAULT_SEGMENT_CHUNK);
        (seg, seg + count - 1)
    });
    if let Some((start_seg, end_seg)) = window {
        if end_seg < start_seg {
            return Ok(Json(Vec::new()));
        }
    }

    let conn = state.conn()?;
    let rows = db::fetch_word_rows(&conn, doc, query.version, window)?;
    if !rows.is_empty() {
        return Ok(Json(rows_to_tokens_normalized(&rows, min_dur)));
    }

    // No materialized rows for this version: serve the stored JSON words.
    let row = db::version(&conn, doc, query.version)?
        .ok_or_else(|| ApiError::NotFound("version not found".into()))?;
    let tokens = match window {
        Some((start_seg, end_seg)) => {
            let sliced = slice_words_json(&row.words, start_seg as usize, end_seg as usize);
            normalize_words_json(&sliced, min_dur)
        }
        None => normalize_words_json(&row.words, min_dur),
    };
    Ok(Json(tokens))
}

pub async fn history(
    State(state): State<SharedState>,
    Query(query): Query<DocQuery>,
) -> ApiResult<Json<Vec<scribe_core::HistoryEntry>>> {
    let doc = checked_doc(&query.doc)?;
    let conn = state.conn()?;
    Ok(Json(db::history(&conn, doc)?))
}

pub async fn edits(
    State(state): State<SharedState>,
    Query(query): Query<DocQuery>,
) -> ApiResult<Json<Vec<scribe_core::EditDeltaRow>>> {
    let doc = checked_doc(&query.doc)?;
    let conn = state.conn()?;
    Ok(Json(db::list_edits(&conn, doc)?))
}

pub async fn confirmations(
    State(state): State<SharedState>,
    Query(query): Query<DocVersionQuery>,
) -> ApiResult<Json<Vec<scribe_core::ConfirmationRow>>> {
    let doc = checked_doc(&query.doc)?;
    let conn = state.conn()?;
    Ok(Json(db::confirmations_get(&conn, doc, query.version)?))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

pub async fn save(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Response> {
    let request: SaveRequest = parse_body(body)?;
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let response = match save::save_version(state, request, user_id).await? {
        SaveOutcome::Saved { version, base_sha256 } => (
            StatusCode::OK,
            Json(serde_json::json!({ "version": version, "base_sha256": base_sha256 })),
        )
            .into_response(),
        SaveOutcome::InvalidParentForFirst => (
            StatusCode::BAD_REQUEST,
            "invalid parentVersion for first save",
        )
            .into_response(),
        SaveOutcome::Conflict(payload) => (StatusCode::CONFLICT, Json(payload)).into_response(),
    };
    Ok(response)
}

pub async fn align_segment(
    State(state): State<SharedState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<align_ops::AlignOutcome>> {
    let request: AlignSegmentRequest = parse_body(body)?;
    Ok(Json(align_ops::align_segment(state, request).await?))
}

#[derive(Deserialize)]
pub struct ConfirmationsSaveRequest {
    #[serde(default)]
    doc: String,
    #[serde(default)]
    version: Option<i64>,
    #[serde(default)]
    base_sha256: String,
    #[serde(default)]
    items: Vec<ConfirmationItem>,
}

pub async fn save_confirmations(
    State(state): State<SharedState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let request: ConfirmationsSaveRequest = parse_body(body)?;
    let doc = request.doc.trim().to_string();
    let version = match request.version {
        Some(version) if version > 0 => version,
        _ => return Err(ApiError::BadRequest("missing doc/version".into())),
    };
    if doc.is_empty() {
        return Err(ApiError::BadRequest("missing doc/version".into()));
    }
    validate_doc(&doc)?;
    let base_sha256 = request.base_sha256.trim().to_string();
    if base_sha256.is_empty() {
        return Err(ApiError::BadRequest("missing base_sha256".into()));
    }

    let pool = state.pool.clone();
    let items = request.items;
    let count = tokio::task::spawn_blocking(move || -> scribe_core::Result<usize> {
        let mut conn = pool.get()?;
        db::confirmations_replace(&mut conn, &doc, version, &base_sha256, &items)
    })
    .await
    .map_err(|err| ApiError::Internal(format!("confirmations task failed: {err}")))??;

    Ok(Json(serde_json::json!({ "count": count })))
}

#[derive(Deserialize)]
pub struct MigrateWordsRequest {
    #[serde(default)]
    doc: String,
    #[serde(default)]
    version: Option<i64>,
}

/// Naive token synthesis for versions whose stored `words` list is empty:
/// whitespace-split words plus a `"\n"` marker per line, no timings.
fn synthesize_words(text: &str) -> Vec<Token> {
    let mut words = Vec::new();
    for line in text.lines() {
        for part in line.split_whitespace() {
            words.push(Token::bare(part));
        }
        words.push(Token::bare("\n"));
    }
    words
}

pub async fn migrate_words(
    State(state): State<SharedState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let request: MigrateWordsRequest = parse_body(body)?;
    let doc = request.doc.trim().to_string();
    if doc.is_empty() {
        return Err(ApiError::BadRequest("missing doc".into()));
    }
    validate_doc(&doc)?;

    let pool = state.pool.clone();
    let version = request.version;
    let migrated = tokio::task::spawn_blocking(move || -> scribe_core::Result<usize> {
        let mut conn = pool.get()?;
        let targets = db::versions_for_migration(&conn, &doc, version)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut migrated = 0usize;
        for (target_version, text, words_json) in targets {
            let stored: Option<Vec<Token>> = words_json
                .as_deref()
                .filter(|raw| !raw.is_empty())
                .and_then(|raw| serde_json::from_str(raw).ok());
            let words = match stored {
                Some(words) if !words.is_empty() => words,
                _ => synthesize_words(&text),
            };
            db::replace_word_rows(&tx, &doc, target_version, &words)?;
            migrated += 1;
        }
        tx.commit()?;
        Ok(migrated)
    })
    .await
    .map_err(|err| ApiError::Internal(format!("migration task failed: {err}")))??;

    Ok(Json(serde_json::json!({ "migrated_versions": migrated })))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_words_splits_lines_and_whitespace() {
        let words = synthesize_words("hello world\nsecond");
        let texts: Vec<&str> = words.iter().map(|t| t.word.as_str()).collect();
        assert_eq!(texts, vec!["hello", "world", "\n", "second", "\n"]);
        assert!(words.iter().all(|t| !t.has_any_timing()));
    }

    #[test]
    fn synthesize_words_empty_text_is_empty() {
        assert!(synthesize_words("").is_empty());
    }
}
