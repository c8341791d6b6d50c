use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, health, knowledge};
use crate::state::AppState;

/// Upload cap; PDFs and scanned documents are allowed room to breathe.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Creates the main application router with all routes and middleware.
///
/// This function sets up:
/// - CORS middleware (permissive; the service fronts a local client)
/// - Health check endpoint
/// - Knowledge base endpoints (status, document upload)
/// - The question endpoint backed by retrieval plus generation
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/knowledge/status", get(knowledge::status))
        .route("/api/knowledge/documents", post(knowledge::upload_document))
        .route("/gemini-rag", post(chat::gemini_rag))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
