use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;

mod error;
mod handlers;
mod routes;

pub use error::AppError;

pub fn router(state: AppState) -> Router {
    // The catalog UI is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health())
        .merge(routes::videos())
        .merge(routes::uploads())
        .layer(cors)
        .with_state(state)
}
