pub mod transcripts;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let transcripts = Router::new()
        .route("/latest", get(transcripts::latest))
        .route("/get", get(transcripts::get_version))
        .route("/words", get(transcripts::words))
        .route("/history", get(transcripts::history))
        .route("/edits", get(transcripts::edits))
        .route("/confirmations", get(transcripts::confirmations))
        .route("/save", post(transcripts::save))
        .route("/align_segment", post(transcripts::align_segment))
        .route("/confirmations/save", post(transcripts::save_confirmations))
        .route("/migrate_words", post(transcripts::migrate_words));

    Router::new()
        .route("/health", get(health))
        .nest("/transcripts", transcripts)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
