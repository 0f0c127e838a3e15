use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use scribe_core::ScribeError;

pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP-facing error type. Save conflicts are *not* errors — they are
/// structured 409 payloads produced by the save coordinator; this type
/// covers client mistakes and genuinely unexpected failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        });
        (status, body).into_response()
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

impl From<ScribeError> for ApiError {
    fn from(err: ScribeError) -> Self {
        match err {
            ScribeError::NotFound(msg) => ApiError::NotFound(msg),
            ScribeError::InvalidInput(msg) => ApiError::BadRequest(msg),
            ScribeError::InvalidTiming(msg) => ApiError::BadRequest(format!("invalid timing: {msg}")),
            ScribeError::VersionExists { doc, version } => {
                ApiError::Conflict(format!("version {version} already exists for {doc}"))
            }
            ScribeError::HashConflict { .. } => ApiError::Conflict(err.to_string()),
            ScribeError::Database(ref db_err) if is_busy(db_err) => {
                ApiError::Unavailable(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scribe_errors_map_to_expected_statuses() {
        let cases: Vec<(ScribeError, StatusCode)> = vec![
            (ScribeError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ScribeError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ScribeError::InvalidTiming("x".into()), StatusCode::BAD_REQUEST),
            (
                ScribeError::VersionExists { doc: "d".into(), version: 2 },
                StatusCode::CONFLICT,
            ),
            (
                ScribeError::HashConflict { expected: "a".into(), actual: "b".into() },
                StatusCode::CONFLICT,
            ),
            (ScribeError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }
}
