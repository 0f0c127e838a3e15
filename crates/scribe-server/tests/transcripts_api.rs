//! End-to-end tests driving the router over in-process requests.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use scribe_core::sha256_hex;
use scribe_server::{router, AppState, ServerConfig};
use scribe_text::canonicalize;

fn test_config(dir: &Path, prealign: bool) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1".into(),
        port: 0,
        data_dir: dir.to_path_buf(),
        // Nothing listens here; alignment must degrade gracefully.
        align_endpoint: "http://127.0.0.1:9/align".into(),
        align_prealign_on_save: prealign,
        audio_log_dir: dir.join("audio-log"),
        audio_log_native: false,
        min_token_duration_sec: 0.20,
        clip_pad_sec: 0.10,
        neighbor_default: 1,
        neighbor_max: 3,
    }
}

fn app_with(prealign: bool) -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(AppState::new(test_config(dir.path(), prealign)).unwrap());
    (router(state), dir)
}

fn app() -> (Router, tempfile::TempDir) {
    app_with(false)
}

async fn read_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, read_body(response).await)
}

async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, read_body(response).await)
}

fn words_v1() -> Value {
    json!([
        {"word": "hello", "start": 0.0, "end": 0.5, "probability": 0.9},
        {"word": " ", "start": 0.5, "end": 0.6},
        {"word": "\n"},
        {"word": "world", "start": 0.6, "end": 1.0, "probability": 0.8},
    ])
}

async fn save_v1(app: &Router, doc: &str) -> Value {
    let (status, body) = post(
        app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": null,
            "expected_base_sha256": "",
            "text": "hello\nworld",
            "words": words_v1(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save v1 failed: {body}");
    body
}

fn joined_words(tokens: &Value) -> String {
    tokens
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["word"].as_str().unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Reads on empty state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn latest_of_unknown_doc_is_empty_object() {
    let (app, _dir) = app();
    let (status, body) = get(&app, "/transcripts/latest?doc=non/existent.opus").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn get_of_unknown_version_is_404() {
    let (app, _dir) = app();
    let (status, _) = get(&app, "/transcripts/get?doc=a/b.opus&version=1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_responds() {
    let (app, _dir) = app();
    let (status, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

// ---------------------------------------------------------------------------
// S1 — first save then append
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_save_then_append() {
    let (app, _dir) = app();
    let doc = "fold/file.opus";

    let saved = save_v1(&app, doc).await;
    assert_eq!(saved["version"], 1);
    assert_eq!(
        saved["base_sha256"].as_str().unwrap(),
        sha256_hex(&canonicalize("hello\nworld"))
    );

    let (status, latest) = get(&app, &format!("/transcripts/latest?doc={doc}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["version"], 1);
    assert_eq!(latest["base_sha256"], saved["base_sha256"]);

    let (status, row) = get(&app, &format!("/transcripts/get?doc={doc}&version=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["version"], 1);

    // All words, with a synthetic newline marker between segments.
    let (status, tokens) = get(&app, &format!("/transcripts/words?doc={doc}&version=1")).await;
    assert_eq!(status, StatusCode::OK);
    let tokens_arr = tokens.as_array().unwrap();
    assert_eq!(tokens_arr.len(), 4);
    for token in tokens_arr {
        let start = token["start"].as_f64().unwrap();
        let end = token["end"].as_f64().unwrap();
        if token["word"] == "\n" {
            assert_eq!(start, end);
        } else {
            assert!(end > start, "inverted duration for {token}");
        }
    }

    // Single-segment slice: only segment 0 tokens, no newline markers.
    let (status, seg0) = get(
        &app,
        &format!("/transcripts/words?doc={doc}&version=1&segment=0&count=1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(seg0.as_array().unwrap().iter().all(|t| t["word"] != "\n"));
    assert_eq!(joined_words(&seg0), "hello ");

    // Append a token in a second version.
    let (status, saved2) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 1,
            "expected_base_sha256": saved["base_sha256"],
            "text": "hello\nworld!",
            "words": [
                {"word": "hello", "start": 0.0, "end": 0.5, "probability": 0.9},
                {"word": " ", "start": 0.5, "end": 0.6},
                {"word": "\n"},
                {"word": "world", "start": 0.6, "end": 1.0, "probability": 0.8},
                {"word": "!"},
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save v2 failed: {saved2}");
    assert_eq!(saved2["version"], 2);

    let (status, history) = get(&app, &format!("/transcripts/history?doc={doc}")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["version"], 1);
    assert_eq!(entries[0]["parent_version"], 0);
    assert_eq!(entries[1]["version"], 2);
    assert_eq!(entries[1]["parent_version"], 1);

    let (status, edits) = get(&app, &format!("/transcripts/edits?doc={doc}")).await;
    assert_eq!(status, StatusCode::OK);
    let edits_arr = edits.as_array().unwrap();
    assert_eq!(edits_arr.len(), 1);
    assert_eq!(edits_arr[0]["parent_version"], 1);
    assert_eq!(edits_arr[0]["child_version"], 2);
    assert!(edits_arr[0]["dmp_patch"].as_str().unwrap().contains("+world!"));
}

#[tokio::test]
async fn every_version_past_the_first_gets_an_origin_edge() {
    let (app, _dir) = app();
    let doc = "lineage/doc.opus";

    let (status, v1) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": null,
            "expected_base_sha256": "",
            "text": "one",
            "words": [{"word": "one"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save v1 failed: {v1}");

    let (status, v2) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 1,
            "expected_base_sha256": v1["base_sha256"],
            "text": "one two",
            "words": [{"word": "one"}, {"word": " "}, {"word": "two"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save v2 failed: {v2}");

    let (status, v3) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 2,
            "expected_base_sha256": v2["base_sha256"],
            "text": "one two three",
            "words": [
                {"word": "one"},
                {"word": " "},
                {"word": "two"},
                {"word": " "},
                {"word": "three"},
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save v3 failed: {v3}");

    let (status, edits) = get(&app, &format!("/transcripts/edits?doc={doc}")).await;
    assert_eq!(status, StatusCode::OK);
    let edits_arr = edits.as_array().unwrap();
    assert_eq!(edits_arr.len(), 3, "expected (1,2), (2,3) and (1,3): {edits}");

    let edge = |parent: i64, child: i64| -> &Value {
        edits_arr
            .iter()
            .find(|e| e["parent_version"] == parent && e["child_version"] == child)
            .unwrap_or_else(|| panic!("missing edge ({parent},{child}): {edits}"))
    };

    // The v1→v2 row is rewritten by the origin upsert, so its token_ops is
    // null even when the save carried a timing block.
    assert!(edge(1, 2)["token_ops"].is_null());

    let parent_edge = edge(2, 3);
    assert!(parent_edge["dmp_patch"].as_str().unwrap().contains("+one two three"));

    // Origin-replay edge: diffed against v1, token_ops always null.
    let origin_edge = edge(1, 3);
    assert!(origin_edge["token_ops"].is_null());
    let origin_patch = origin_edge["dmp_patch"].as_str().unwrap();
    assert!(origin_patch.contains("-one"), "origin patch: {origin_patch:?}");
    assert!(origin_patch.contains("+one two three"), "origin patch: {origin_patch:?}");

    let (status, history) = get(&app, &format!("/transcripts/history?doc={doc}")).await;
    assert_eq!(status, StatusCode::OK);
    let parents: Vec<i64> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["parent_version"].as_i64().unwrap())
        .collect();
    assert_eq!(parents, vec![0, 1, 2], "origin edges must not disturb lineage");
}

// ---------------------------------------------------------------------------
// S2 — hash conflicts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_conflicts_are_structured_409s() {
    let (app, _dir) = app();
    let doc = "folder/file.opus";
    let saved = save_v1(&app, doc).await;

    // Missing expected hash.
    let (status, conflict) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 1,
            "text": "hello\nworld!",
            "words": [{"word": "hello"}, {"word": "\n"}, {"word": "world!"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["reason"], "hash_missing");
    assert_eq!(conflict["latest"]["version"], 1);
    assert_eq!(conflict["parent"]["version"], 1);

    // Wrong expected hash.
    let (status, conflict) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 1,
            "expected_base_sha256": "deadbeef",
            "text": "hello\nworld!",
            "words": [{"word": "hello"}, {"word": "\n"}, {"word": "world!"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["reason"], "hash_conflict");
    let diff = conflict["diff_parent_to_client"].as_str().unwrap();
    assert!(diff.contains("+world!"), "diff not populated: {diff:?}");

    // Absent parent version.
    let (status, conflict) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "expected_base_sha256": saved["base_sha256"],
            "text": "hello\nworld!",
            "words": [],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["reason"], "missing_parent");

    // Stale parent version.
    let (status, saved2) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 1,
            "expected_base_sha256": saved["base_sha256"],
            "text": "hello\nworld!",
            "words": [{"word": "hello"}, {"word": " "}, {"word": "\n"}, {"word": "world!"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "good save failed: {saved2}");

    let (status, conflict) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 1,
            "expected_base_sha256": saved["base_sha256"],
            "text": "hello\nworld!!",
            "words": [],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["reason"], "version_conflict");
    assert_eq!(conflict["latest"]["version"], 2);
}

#[tokio::test]
async fn first_save_with_nonzero_parent_is_rejected() {
    let (app, _dir) = app();
    let (status, body) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": "new/doc.opus",
            "parentVersion": 5,
            "expected_base_sha256": "",
            "text": "x",
            "words": [{"word": "x"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!("invalid parentVersion for first save"));
}

// ---------------------------------------------------------------------------
// S3 — carry-over of unchanged token timings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unchanged_tokens_keep_timings_across_versions() {
    let (app, _dir) = app();
    let doc = "tests/timing2.opus";
    let saved = save_v1(&app, doc).await;

    // v2 appends "!" and submits no timings at all.
    let (status, saved2) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 1,
            "expected_base_sha256": saved["base_sha256"],
            "text": "hello\nworld!",
            "words": [{"word": "hello"}, {"word": " "}, {"word": "world"}, {"word": "!"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save v2 failed: {saved2}");

    let (_, w1) = get(&app, &format!("/transcripts/words?doc={doc}&version=1")).await;
    let (_, w2) = get(&app, &format!("/transcripts/words?doc={doc}&version=2")).await;

    let non_newline = |value: &Value| -> Vec<Value> {
        value
            .as_array()
            .unwrap()
            .iter()
            .filter(|t| t["word"] != "\n")
            .cloned()
            .collect()
    };
    let a1 = non_newline(&w1);
    let a2 = non_newline(&w2);
    assert!(a1.len() >= 2 && a2.len() >= 2);
    for i in 0..2 {
        assert_eq!(a1[i]["word"], a2[i]["word"]);
        assert_eq!(a1[i]["start"], a2[i]["start"], "start drifted for token {i}");
        assert_eq!(a1[i]["end"], a2[i]["end"], "end drifted for token {i}");
        assert_eq!(a1[i]["probability"], a2[i]["probability"]);
    }
}

// ---------------------------------------------------------------------------
// S4 — zero-length spans are normalized
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_ends_are_normalized_to_positive_durations() {
    let (app, _dir) = app();
    let doc = "tests/timing1.opus";
    let (status, body) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": null,
            "expected_base_sha256": "",
            "text": "א ב \nג ד",
            "words": [
                {"word": "א", "start": 0.0, "end": 0.10},
                {"word": " ", "start": 0.10, "end": 0.20},
                {"word": "ב", "start": 0.20},
                {"word": " ", "start": 0.25},
                {"word": "\n"},
                {"word": "ג", "start": 0.50, "end": 0.70},
                {"word": "ד"},
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save failed: {body}");

    let (status, tokens) = get(&app, &format!("/transcripts/words?doc={doc}&version=1")).await;
    assert_eq!(status, StatusCode::OK);
    let tokens = tokens.as_array().unwrap();
    assert!(!tokens.is_empty());
    for token in tokens {
        if token["word"] == "\n" {
            continue;
        }
        let start = token["start"].as_f64().unwrap();
        let end = token["end"].as_f64().unwrap();
        assert!(end > start, "zero-length span for {token}");
    }
}

// ---------------------------------------------------------------------------
// S5 / S6 — align_segment fallbacks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn align_segment_reports_no_timings_and_no_words() {
    let (app, _dir) = app();
    let doc = "f/g.opus";

    let (status, saved) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": null,
            "expected_base_sha256": "",
            "text": "c d\ne",
            "words": [{"word": "c"}, {"word": " "}, {"word": "d"}, {"word": "\n"}, {"word": "e"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save failed: {saved}");

    // Rows exist but carry no timings.
    let (status, outcome) = post(
        &app,
        "/transcripts/align_segment",
        json!({"doc": doc, "version": 1, "segment": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({"ok": false, "reason": "no-timings"}));

    // The empty-words sentinel skips row materialization entirely.
    let (status, saved2) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 1,
            "expected_base_sha256": saved["base_sha256"],
            "text": "c d\ne",
            "words": [],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "sentinel save failed: {saved2}");

    let (status, outcome) = post(
        &app,
        "/transcripts/align_segment",
        json!({"doc": doc, "version": 2, "segment": 0, "neighbors": 99}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({"ok": false, "reason": "no-words"}));
}

#[tokio::test]
async fn align_segment_reports_missing_audio() {
    let (app, _dir) = app();
    let doc = "fold/file.opus";
    save_v1(&app, doc).await;

    let (status, outcome) = post(
        &app,
        "/transcripts/align_segment",
        json!({"doc": doc, "segment": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({"ok": false, "reason": "audio-not-found"}));
}

#[tokio::test]
async fn align_segment_without_transcript_is_404() {
    let (app, _dir) = app();
    let (status, _) = post(
        &app,
        "/transcripts/align_segment",
        json!({"doc": "no/doc.opus", "segment": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// S7 — unsafe documents
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsafe_doc_identifiers_are_rejected() {
    let (app, _dir) = app();
    for doc in ["../evil", "/abs/path", "C:\\win\\path", "a/../../b"] {
        let (status, _) = post(
            &app,
            "/transcripts/save",
            json!({
                "doc": doc,
                "parentVersion": null,
                "expected_base_sha256": "",
                "text": "x",
                "words": [{"word": "x"}],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "doc {doc:?} must be rejected");
    }
}

// ---------------------------------------------------------------------------
// Words slicing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn words_default_chunk_starts_at_requested_segment() {
    let (app, _dir) = app();
    let doc = "f/chunks.opus";
    let (status, body) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": null,
            "expected_base_sha256": "",
            "text": "ab\ncd\ne",
            "words": [
                {"word": "a", "start": 0.0, "end": 0.1},
                {"word": "b", "start": 0.1, "end": 0.2},
                {"word": "\n"},
                {"word": "c"},
                {"word": "d"},
                {"word": "\n"},
                {"word": "e"},
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save failed: {body}");

    let (status, tokens) = get(&app, &format!("/transcripts/words?doc={doc}&version=1&segment=1")).await;
    assert_eq!(status, StatusCode::OK);
    let joined = joined_words(&tokens);
    assert!(joined.starts_with("cd\ne"), "unexpected slice: {joined:?}");
    assert!(joined.contains('\n'), "newline markers must separate segments");

    // count=0 yields an empty window.
    let (status, tokens) = get(
        &app,
        &format!("/transcripts/words?doc={doc}&version=1&segment=1&count=0"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens, json!([]));
}

// ---------------------------------------------------------------------------
// Confirmations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn confirmations_are_hash_gated_and_replaced_wholesale() {
    let (app, _dir) = app();
    let doc = "folder/episode.opus";
    let (status, saved) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": null,
            "expected_base_sha256": "",
            "text": "abc",
            "words": [{"word": "abc"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save failed: {saved}");
    let base = saved["base_sha256"].as_str().unwrap().to_string();

    let items = json!([{"start_offset": 0, "end_offset": 3, "prefix": "", "exact": "abc", "suffix": ""}]);

    // Missing hash.
    let (status, _) = post(
        &app,
        "/transcripts/confirmations/save",
        json!({"doc": doc, "version": 1, "items": items}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Wrong hash.
    let (status, _) = post(
        &app,
        "/transcripts/confirmations/save",
        json!({"doc": doc, "version": 1, "base_sha256": "deadbeef", "items": items}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Correct hash, twice — replacement is idempotent.
    for _ in 0..2 {
        let (status, body) = post(
            &app,
            "/transcripts/confirmations/save",
            json!({"doc": doc, "version": 1, "base_sha256": base, "items": items}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
    }

    let (status, stored) = get(&app, &format!("/transcripts/confirmations?doc={doc}&version=1")).await;
    assert_eq!(status, StatusCode::OK);
    let stored = stored.as_array().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["start_offset"], 0);
    assert_eq!(stored[0]["end_offset"], 3);
    assert_eq!(stored[0]["exact"], "abc");
}

// ---------------------------------------------------------------------------
// migrate_words
// ---------------------------------------------------------------------------

#[tokio::test]
async fn migrate_words_materializes_rows_for_sentinel_versions() {
    let (app, _dir) = app();
    let doc = "m/doc.opus";
    let (status, saved) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": null,
            "expected_base_sha256": "",
            "text": "hello world\nsecond",
            "words": [],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save failed: {saved}");

    // The sentinel save stored no rows: align says no-words.
    let (_, outcome) = post(
        &app,
        "/transcripts/align_segment",
        json!({"doc": doc, "version": 1, "segment": 0}),
    )
    .await;
    assert_eq!(outcome["reason"], "no-words");

    let (status, migrated) = post(&app, "/transcripts/migrate_words", json!({"doc": doc})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(migrated["migrated_versions"], 1);

    let (status, tokens) = get(
        &app,
        &format!("/transcripts/words?doc={doc}&version=1&segment=0&count=1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined_words(&tokens), "hello world");
}

// ---------------------------------------------------------------------------
// Save-time realignment is best-effort
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_survives_unavailable_aligner_when_prealign_is_on() {
    let (app, _dir) = app_with(true);
    let doc = "p/doc.opus";
    let saved = save_v1(&app, doc).await;

    // The edit touches segment 1; realignment cannot find audio and must
    // skip without failing the save.
    let (status, saved2) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": doc,
            "parentVersion": 1,
            "expected_base_sha256": saved["base_sha256"],
            "text": "hello\nplanet",
            "words": [{"word": "hello"}, {"word": " "}, {"word": "\n"}, {"word": "planet"}],
            "segment": 1,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "prealign save failed: {saved2}");
    assert_eq!(saved2["version"], 2);

    // Carried timings for the unchanged token survive the skipped alignment.
    let (_, w2) = get(&app, &format!("/transcripts/words?doc={doc}&version=2")).await;
    let first = &w2.as_array().unwrap()[0];
    assert_eq!(first["word"], "hello");
    assert_eq!(first["start"], json!(0.0));
    assert_eq!(first["end"], json!(0.5));
}

// ---------------------------------------------------------------------------
// Invalid timing input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_numeric_timing_is_a_client_error() {
    let (app, _dir) = app();
    let (status, _) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": "t/bad.opus",
            "parentVersion": null,
            "expected_base_sha256": "",
            "text": "x",
            "words": [{"word": "x", "start": "soon"}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_monotone_client_timings_are_rejected() {
    let (app, _dir) = app();
    let (status, body) = post(
        &app,
        "/transcripts/save",
        json!({
            "doc": "t/mono.opus",
            "parentVersion": null,
            "expected_base_sha256": "",
            "text": "a b",
            "words": [
                {"word": "a", "start": 1.0, "end": 2.0},
                {"word": " "},
                {"word": "b", "start": 0.5, "end": 3.0},
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "expected 400, got {body}");
}
