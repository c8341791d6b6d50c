use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.knowledge.status();
    Json(json!({
        "status": "ok",
        "knowledge_state": status.state,
        "generation_available": state.generation.is_some(),
    }))
}
