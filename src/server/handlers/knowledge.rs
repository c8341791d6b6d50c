use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::knowledge::KnowledgeError;
use crate::loader;
use crate::state::AppState;

pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.knowledge.status())
}

/// Multipart document upload. The raw file is kept under the uploads
/// directory so a later rebuild can re-ingest it, then the extracted text
/// goes through the normal ingestion path.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart payload: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
            file = Some((filename, content_type, data.to_vec()));
        }
    }

    let Some((filename, content_type, data)) = file else {
        return Err(ApiError::BadRequest("Missing 'file' field".to_string()));
    };
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    let extract_name = filename.clone();
    let extract_type = content_type.clone();
    let extract_data = data.clone();
    let text = tokio::task::spawn_blocking(move || {
        loader::extract_text(&extract_name, extract_type.as_deref(), &extract_data)
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let stored_name = format!("{}-{}", Uuid::new_v4(), sanitize_filename(&filename));
    let stored_path = state.paths.uploads_dir.join(&stored_name);
    tokio::fs::write(&stored_path, &data)
        .await
        .map_err(ApiError::internal)?;

    let kb = state.knowledge.clone();
    let source = filename.clone();
    let report = tokio::task::spawn_blocking(move || kb.ingest(&text, &source))
        .await
        .map_err(ApiError::internal)?
        .map_err(map_knowledge_error)?;

    Ok(Json(json!({
        "message": format!("Document '{}' added to knowledge base", filename),
        "chunks_added": report.chunks_added,
        "total_chunks": report.total_chunks,
    })))
}

fn map_knowledge_error(err: KnowledgeError) -> ApiError {
    match &err {
        KnowledgeError::DimensionMismatch { .. } => ApiError::Conflict(err.to_string()),
        KnowledgeError::ModelUnavailable | KnowledgeError::NotReady => {
            ApiError::ServiceUnavailable(err.to_string())
        }
        _ => ApiError::Internal(err.to_string()),
    }
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_sanitized_for_storage() {
        assert_eq!(sanitize_filename("brief v2 (final).pdf"), "brief_v2__final_.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn knowledge_errors_map_to_stable_status_codes() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let conflict = map_knowledge_error(KnowledgeError::DimensionMismatch {
            expected: 384,
            got: 768,
        });
        assert_eq!(
            conflict.into_response().status(),
            StatusCode::CONFLICT
        );

        let unavailable = map_knowledge_error(KnowledgeError::ModelUnavailable);
        assert_eq!(
            unavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
