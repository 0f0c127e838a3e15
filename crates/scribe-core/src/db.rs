use std::collections::HashMap;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::{Result, ScribeError};
use crate::schema::ensure_schema;
use crate::types::{
    ConfirmationItem, ConfirmationRow, EditDeltaRow, HistoryEntry, Token, VersionRecord, WordRow,
};

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Open a connection pool backed by a file-based SQLite database and bring
/// the schema forward.
pub fn create_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    });

    let pool = Pool::builder()
        .max_size(16)
        .build(manager)
        .map_err(|e| ScribeError::Internal(e.to_string()))?;

    let conn = pool.get()?;
    ensure_schema(&conn)?;

    Ok(pool)
}

/// Open a pool backed by a private in-memory database. Intended for tests
/// that use a single connection at a time.
pub fn create_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    });

    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| ScribeError::Internal(e.to_string()))?;

    let conn = pool.get()?;
    ensure_schema(&conn)?;

    Ok(pool)
}

// ---------------------------------------------------------------------------
// Version rows
// ---------------------------------------------------------------------------

fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn build_version(raw: (i64, String, String, String, String)) -> Result<VersionRecord> {
    let (version, base_sha256, text, words_json, created_by) = raw;
    let words: Vec<Token> = if words_json.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&words_json)?
    };
    Ok(VersionRecord {
        version,
        base_sha256,
        text,
        words,
        created_by,
    })
}

/// Highest-numbered version of `doc`, or `None` when the document does not
/// exist yet.
pub fn latest_version(conn: &Connection, doc: &str) -> Result<Option<VersionRecord>> {
    let raw = conn
        .query_row(
            "SELECT version, base_sha256, text, words, COALESCE(created_by, '')
               FROM transcripts
              WHERE file_path = ?1
              ORDER BY version DESC
              LIMIT 1",
            params![doc],
            row_to_version,
        )
        .optional()?;
    raw.map(build_version).transpose()
}

/// A specific `(doc, version)` row, or `None`.
pub fn version(conn: &Connection, doc: &str, version: i64) -> Result<Option<VersionRecord>> {
    let raw = conn
        .query_row(
            "SELECT version, base_sha256, text, words, COALESCE(created_by, '')
               FROM transcripts
              WHERE file_path = ?1 AND version = ?2",
            params![doc, version],
            row_to_version,
        )
        .optional()?;
    raw.map(build_version).transpose()
}

/// Insert a new version row. Fails with [`ScribeError::VersionExists`] when
/// `(doc, version)` is already present.
pub fn insert_version(
    conn: &Connection,
    doc: &str,
    version: i64,
    base_sha256: &str,
    text: &str,
    words_json: &str,
    created_by: &str,
) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO transcripts (file_path, version, base_sha256, text, words, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![doc, version, base_sha256, text, words_json, created_by],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(ScribeError::VersionExists {
                doc: doc.to_string(),
                version,
            })
        }
        Err(e) => Err(ScribeError::Database(e)),
    }
}

// ---------------------------------------------------------------------------
// Per-word rows
// ---------------------------------------------------------------------------

/// Delete and re-insert the per-word rows for `(doc, version)` from a token
/// list. Newline tokens advance `segment_index` and are not materialized.
pub fn replace_word_rows(conn: &Connection, doc: &str, version: i64, words: &[Token]) -> Result<usize> {
    conn.execute(
        "DELETE FROM transcript_words WHERE file_path = ?1 AND version = ?2",
        params![doc, version],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO transcript_words
            (file_path, version, segment_index, word_index, word, start_time, end_time, probability)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    let mut segment_index: i64 = 0;
    let mut inserted = 0usize;
    for (word_index, token) in words.iter().enumerate() {
        if token.is_newline() {
            segment_index += 1;
            continue;
        }
        stmt.execute(params![
            doc,
            version,
            segment_index,
            word_index as i64,
            token.word,
            token.start,
            token.end,
            token.probability,
        ])?;
        inserted += 1;
    }
    Ok(inserted)
}

/// Per-word rows for `(doc, version)` ordered by `word_index`, optionally
/// restricted to an inclusive `segment_index` window.
pub fn fetch_word_rows(
    conn: &Connection,
    doc: &str,
    version: i64,
    window: Option<(i64, i64)>,
) -> Result<Vec<WordRow>> {
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<WordRow> {
        Ok(WordRow {
            segment_index: row.get(0)?,
            word_index: row.get(1)?,
            word: row.get(2)?,
            start: row.get(3)?,
            end: row.get(4)?,
            probability: row.get(5)?,
        })
    };

    let rows = match window {
        Some((start_seg, end_seg)) => {
            let mut stmt = conn.prepare_cached(
                "SELECT segment_index, word_index, word, start_time, end_time, probability
                   FROM transcript_words
                  WHERE file_path = ?1 AND version = ?2
                    AND segment_index >= ?3 AND segment_index <= ?4
                  ORDER BY word_index ASC",
            )?;
            let rows = stmt.query_map(params![doc, version, start_seg, end_seg], map_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT segment_index, word_index, word, start_time, end_time, probability
                   FROM transcript_words
                  WHERE file_path = ?1 AND version = ?2
                  ORDER BY word_index ASC",
            )?;
            let rows = stmt.query_map(params![doc, version], map_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(rows)
}

/// Batch-apply `(start, end, word_index)` timing updates.
pub fn update_word_timings(
    conn: &Connection,
    doc: &str,
    version: i64,
    updates: &[(f64, f64, i64)],
) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "UPDATE transcript_words SET start_time = ?1, end_time = ?2
          WHERE file_path = ?3 AND version = ?4 AND word_index = ?5",
    )?;
    for (start, end, word_index) in updates {
        stmt.execute(params![start, end, doc, version, word_index])?;
    }
    Ok(updates.len())
}

/// Copy `probability` from the previous version's row with the same
/// `word_index` onto rows of the new version that still lack one.
pub fn backfill_probabilities(
    conn: &Connection,
    doc: &str,
    new_version: i64,
    prev_version: i64,
) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE transcript_words AS t
            SET probability = (
                SELECT p.probability FROM transcript_words AS p
                 WHERE p.file_path = ?1 AND p.version = ?2 AND p.word_index = t.word_index
            )
          WHERE t.file_path = ?3 AND t.version = ?4 AND t.probability IS NULL",
        params![doc, prev_version, doc, new_version],
    )?;
    Ok(affected)
}

// ---------------------------------------------------------------------------
// Edit deltas
// ---------------------------------------------------------------------------

pub fn upsert_edit_delta(
    conn: &Connection,
    doc: &str,
    parent_version: i64,
    child_version: i64,
    dmp_patch: &str,
    token_ops: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO transcript_edits
            (file_path, parent_version, child_version, dmp_patch, token_ops)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![doc, parent_version, child_version, dmp_patch, token_ops],
    )?;
    Ok(())
}

/// All edit-delta rows for `doc` ordered by `child_version`.
pub fn list_edits(conn: &Connection, doc: &str) -> Result<Vec<EditDeltaRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT parent_version, child_version, dmp_patch, token_ops
           FROM transcript_edits
          WHERE file_path = ?1
          ORDER BY child_version ASC",
    )?;
    let rows = stmt.query_map(params![doc], |row| {
        Ok(EditDeltaRow {
            parent_version: row.get(0)?,
            child_version: row.get(1)?,
            dmp_patch: row.get(2)?,
            token_ops: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Append a `token_ops` block to the `(parent, child)` delta row.
///
/// Runs as an immediate transaction so the read-modify-write of the stored
/// JSON array cannot lose a concurrent writer's block.
pub fn append_token_ops(
    conn: &mut Connection,
    doc: &str,
    parent_version: i64,
    child_version: i64,
    block: &serde_json::Value,
) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<(Option<String>, Option<String>)> = tx
        .query_row(
            "SELECT dmp_patch, token_ops FROM transcript_edits
              WHERE file_path = ?1 AND parent_version = ?2 AND child_version = ?3",
            params![doc, parent_version, child_version],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (dmp_patch, prev_ops) = existing.unwrap_or((None, None));

    let mut ops: Vec<serde_json::Value> = match prev_ops.as_deref() {
        Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Array(items)) => items,
            Ok(single @ serde_json::Value::Object(_)) => vec![single],
            _ => Vec::new(),
        },
        None => Vec::new(),
    };
    ops.push(block.clone());
    let ops_json = serde_json::to_string(&ops)?;

    tx.execute(
        "INSERT OR REPLACE INTO transcript_edits
            (file_path, parent_version, child_version, dmp_patch, token_ops)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![doc, parent_version, child_version, dmp_patch, ops_json],
    )?;

    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Version lineage for `doc`, ascending.
///
/// `parent_version` prefers the explicit immediate `(v-1 → v)` edge recorded
/// in `transcript_edits`; otherwise it falls back to `version - 1` (0 for the
/// first version).
pub fn history(conn: &Connection, doc: &str) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT version, base_sha256, created_at, COALESCE(created_by, '')
           FROM transcripts
          WHERE file_path = ?1
          ORDER BY version ASC",
    )?;
    let rows: Vec<(i64, String, String, String)> = stmt
        .query_map(params![doc], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut edge_stmt = conn.prepare_cached(
        "SELECT parent_version, child_version
           FROM transcript_edits
          WHERE file_path = ?1 AND parent_version = child_version - 1",
    )?;
    let parent_of: HashMap<i64, i64> = edge_stmt
        .query_map(params![doc], |row| Ok((row.get::<_, i64>(1)?, row.get::<_, i64>(0)?)))?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;

    let entries = rows
        .into_iter()
        .map(|(version, hash, created_at, created_by)| {
            let parent_version = parent_of
                .get(&version)
                .copied()
                .unwrap_or(if version <= 1 { 0 } else { version - 1 });
            HistoryEntry {
                version,
                parent_version,
                hash,
                created_at,
                created_by,
            }
        })
        .collect();
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Confirmations
// ---------------------------------------------------------------------------

/// Confirmations for `(doc, version)` ordered by `start_offset`.
pub fn confirmations_get(conn: &Connection, doc: &str, version: i64) -> Result<Vec<ConfirmationRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, start_offset, end_offset, prefix, exact, suffix
           FROM transcript_confirmations
          WHERE file_path = ?1 AND version = ?2
          ORDER BY start_offset ASC",
    )?;
    let rows = stmt.query_map(params![doc, version], |row| {
        Ok(ConfirmationRow {
            id: row.get(0)?,
            start_offset: row.get(1)?,
            end_offset: row.get(2)?,
            prefix: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            exact: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            suffix: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Replace all confirmations for `(doc, version)` wholesale, gated by the
/// version's stored `base_sha256`.
///
/// Fails with [`ScribeError::NotFound`] when the version does not exist and
/// [`ScribeError::HashConflict`] when `expected_hash` differs from the stored
/// hash. The delete is additionally guarded by the stored hash so a racing
/// hash change cannot strand half-replaced rows.
pub fn confirmations_replace(
    conn: &mut Connection,
    doc: &str,
    version_number: i64,
    expected_hash: &str,
    items: &[ConfirmationItem],
) -> Result<usize> {
    let row = version(conn, doc, version_number)?
        .ok_or_else(|| ScribeError::NotFound(format!("version {version_number} of {doc}")))?;
    if row.base_sha256 != expected_hash {
        return Err(ScribeError::HashConflict {
            expected: expected_hash.to_string(),
            actual: row.base_sha256,
        });
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(
        "DELETE FROM transcript_confirmations
          WHERE file_path = ?1 AND version = ?2 AND base_sha256 = ?3",
        params![doc, version_number, expected_hash],
    )?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO transcript_confirmations
                (file_path, version, base_sha256, start_offset, end_offset, prefix, exact, suffix)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for item in items {
            let start = item.start_offset;
            let end = item.end_offset.unwrap_or(start);
            stmt.execute(params![
                doc,
                version_number,
                expected_hash,
                start,
                end,
                item.prefix,
                item.exact,
                item.suffix,
            ])?;
        }
    }
    tx.commit()?;
    Ok(items.len())
}

// ---------------------------------------------------------------------------
// Migration support
// ---------------------------------------------------------------------------

/// `(version, text, words_json)` rows backing the words-migration admin
/// operation — either a single version or every version of the document.
pub fn versions_for_migration(
    conn: &Connection,
    doc: &str,
    version: Option<i64>,
) -> Result<Vec<(i64, String, Option<String>)>> {
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(i64, String, Option<String>)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    };
    let rows = match version {
        Some(v) => {
            let mut stmt = conn.prepare_cached(
                "SELECT version, text, words FROM transcripts
                  WHERE file_path = ?1 AND version = ?2",
            )?;
            let rows = stmt.query_map(params![doc, v], map_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT version, text, words FROM transcripts
                  WHERE file_path = ?1 ORDER BY version ASC",
            )?;
            let rows = stmt.query_map(params![doc], map_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
