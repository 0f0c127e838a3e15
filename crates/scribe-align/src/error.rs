use thiserror::Error;

/// Failures of the forced-alignment pipeline. Callers treat all of these as
/// best-effort: a save continues without timing updates, and align-on-demand
/// reports a skip reason instead of failing the request.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),

    #[error("align request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("align endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
