//! Route table

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Multipart bodies may carry originals well past the stored size cap;
/// the file store shrinks them after parsing.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/multiple/post", post(handlers::broadcast_post))
        .route("/api/{platform}/post", post(handlers::single_post))
        .route("/api/files/upload", post(handlers::upload_file))
        .route("/api/files/{upload_id}", get(handlers::get_file))
        .route("/api/rss/feed", get(handlers::rss_feed))
        .route("/api/twitter/login", get(handlers::twitter_login))
        .route("/api/twitter/callback", get(handlers::twitter_callback))
        .route("/api/linkedin/login", get(handlers::linkedin_login))
        .route("/api/linkedin/callback", get(handlers::linkedin_callback))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
