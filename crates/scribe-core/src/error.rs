use thiserror::Error;

/// Top-level error type for the scribe-core crate and dependents.
#[derive(Debug, Error)]
pub enum ScribeError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("version {version} already exists for {doc}")]
    VersionExists { doc: String, version: i64 },

    #[error("hash conflict: expected {expected}, got {actual}")]
    HashConflict { expected: String, actual: String },

    #[error("invalid timing: {0}")]
    InvalidTiming(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, ScribeError>;
