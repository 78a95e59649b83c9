//! services/api/src/web/mod.rs
//!
//! The HTTP surface: JSON payloads, REST handlers and the router that binds them.

pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub use rest::ApiDoc;
pub use state::AppState;

/// Uploaded audio clips and photos must fit under this limit.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Builds the API routes. CORS and the Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", post(rest::start_session_handler))
        .route("/sessions/{session_id}", delete(rest::end_session_handler))
        .route("/sessions/{session_id}/messages", post(rest::send_message_handler))
        .route("/sessions/{session_id}/audio", post(rest::send_audio_handler))
        .route("/sessions/{session_id}/images", post(rest::session_image_handler))
        .route("/users/{user_id}/analyze/text", post(rest::analyze_text_handler))
        .route("/users/{user_id}/images", post(rest::upload_image_handler))
        .route("/users/{user_id}/risk", get(rest::risk_handler))
        .route("/users/{user_id}/trend", get(rest::trend_handler))
        .route("/users/{user_id}/report", post(rest::report_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}
