use rusqlite::Connection;

use crate::error::Result;

/// Schema version recorded in `PRAGMA user_version`. Bump when adding a
/// migration stage below.
pub const SCHEMA_VERSION: i64 = 3;

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

const CREATE_TRANSCRIPTS: &str = "
CREATE TABLE IF NOT EXISTS transcripts (
    file_path   TEXT NOT NULL,
    version     INTEGER NOT NULL,
    base_sha256 TEXT NOT NULL,
    text        TEXT NOT NULL,
    words       TEXT NOT NULL,
    created_by  TEXT,
    created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (file_path, version)
)";

const CREATE_EDITS: &str = "
CREATE TABLE IF NOT EXISTS transcript_edits (
    file_path      TEXT NOT NULL,
    parent_version INTEGER NOT NULL,
    child_version  INTEGER NOT NULL,
    dmp_patch      TEXT,
    token_ops      TEXT,
    created_at     TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (file_path, parent_version, child_version)
)";

const CREATE_CONFIRMATIONS: &str = "
CREATE TABLE IF NOT EXISTS transcript_confirmations (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path    TEXT NOT NULL,
    version      INTEGER NOT NULL,
    base_sha256  TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset   INTEGER NOT NULL,
    prefix       TEXT,
    exact        TEXT,
    suffix       TEXT,
    created_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

const CREATE_WORDS: &str = "
CREATE TABLE IF NOT EXISTS transcript_words (
    file_path     TEXT NOT NULL,
    version       INTEGER NOT NULL,
    segment_index INTEGER NOT NULL,
    word_index    INTEGER NOT NULL,
    word          TEXT NOT NULL,
    start_time    DOUBLE,
    end_time      DOUBLE,
    probability   DOUBLE,
    PRIMARY KEY (file_path, version, word_index)
)";

const CREATE_INDICES: &str = "
CREATE INDEX IF NOT EXISTS idx_transcripts_path_version
    ON transcripts (file_path, version);
CREATE INDEX IF NOT EXISTS idx_edits_path_child
    ON transcript_edits (file_path, child_version);
CREATE INDEX IF NOT EXISTS idx_words_path_version
    ON transcript_words (file_path, version);
CREATE INDEX IF NOT EXISTS idx_words_path_version_segment
    ON transcript_words (file_path, version, segment_index);
CREATE INDEX IF NOT EXISTS idx_confirmations_path_version
    ON transcript_confirmations (file_path, version);
";

// ---------------------------------------------------------------------------
// Migration runner
// ---------------------------------------------------------------------------

/// Create or upgrade the SQLite schema (idempotent).
///
/// The current stage is tracked via `PRAGMA user_version`; each stage is
/// applied at most once, so the function is safe to call at every process
/// start against a database created by any earlier build.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    let mut current = user_version(conn)?;

    if current < 1 {
        conn.execute_batch(CREATE_TRANSCRIPTS)?;
        conn.execute_batch(CREATE_EDITS)?;
        conn.execute_batch(CREATE_CONFIRMATIONS)?;
        conn.execute_batch(CREATE_WORDS)?;
        set_user_version(conn, 1)?;
        current = 1;
    }

    if current < 2 {
        // Columns added after the first deployed schema; older databases
        // predate them.
        if !column_exists(conn, "transcripts", "created_by")? {
            conn.execute_batch("ALTER TABLE transcripts ADD COLUMN created_by TEXT")?;
        }
        if !column_exists(conn, "transcripts", "created_at")? {
            conn.execute_batch(
                "ALTER TABLE transcripts ADD COLUMN created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
            )?;
        }
        if !column_exists(conn, "transcript_edits", "created_at")? {
            conn.execute_batch(
                "ALTER TABLE transcript_edits ADD COLUMN created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
            )?;
        }
        if !column_exists(conn, "transcript_words", "probability")? {
            conn.execute_batch("ALTER TABLE transcript_words ADD COLUMN probability DOUBLE")?;
        }
        set_user_version(conn, 2)?;
        current = 2;
    }

    if current < 3 {
        if !table_exists(conn, "transcript_confirmations")? {
            conn.execute_batch(CREATE_CONFIRMATIONS)?;
        }
        set_user_version(conn, 3)?;
    }

    conn.execute_batch(CREATE_INDICES)?;
    Ok(())
}

fn user_version(conn: &Connection) -> Result<i64> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn set_user_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        rusqlite::params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
