use axum::extract::DefaultBodyLimit;
use axum::{routing::get, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn videos() -> Router<AppState> {
    Router::new()
        .route(
            "/videos",
            get(handlers::list_videos)
                .post(handlers::upload_videos)
                // Upload size is enforced per file by the ingest pipeline.
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/videos/:id/playback", get(handlers::playback_url))
}

pub fn uploads() -> Router<AppState> {
    Router::new().route("/uploads/status", get(handlers::upload_status))
}
