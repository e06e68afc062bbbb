pub mod generation_task;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers the binary needs to build the web server router.
pub use rest::{check_answer_handler, correction_handler, generate_handler, health_handler};
pub use ws_handler::ws_handler;

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Builds the API router (REST + WebSocket) around the shared state.
pub fn router(app_state: Arc<AppState>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);
    match app_state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => tracing::warn!(
            "Ignoring invalid CORS_ORIGIN '{}': {}",
            app_state.config.cors_origin,
            e
        ),
    }

    Router::new()
        .route("/health", get(health_handler))
        .route("/generate", post(generate_handler))
        .route("/answers/check", post(check_answer_handler))
        .route("/corrections", post(correction_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(app_state)
}
