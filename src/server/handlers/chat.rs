use std::sync::Arc;

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::llm::{GenerationError, PromptPart};
use crate::loader;
use crate::state::AppState;

#[derive(Deserialize)]
struct AskRequest {
    prompt: Option<String>,
}

#[derive(Debug)]
struct Attachment {
    filename: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

#[derive(Debug)]
struct Ask {
    prompt: String,
    attachment: Option<Attachment>,
}

/// Question route. Accepts either a JSON body `{"prompt": ...}` or
/// multipart form data with a `prompt` field and an optional `file`.
///
/// Images are forwarded to the model as binary parts and skip retrieval.
/// Text and PDF attachments are extracted and appended to the prompt as
/// additional context before retrieval runs. Text-only prompts are
/// answered from the top retrieved chunks under a context-only
/// instruction; with no retrievable context the prompt goes through
/// unchanged.
pub async fn gemini_rag(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let ask = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart payload: {e}")))?;
        parse_form(multipart).await?
    } else if content_type.starts_with("application/json") || content_type.is_empty() {
        let Json(body) = Json::<AskRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON payload: {e}")))?;
        let prompt = body.prompt.unwrap_or_default();
        if prompt.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "Prompt is required in JSON payload".to_string(),
            ));
        }
        Ask {
            prompt,
            attachment: None,
        }
    } else {
        return Err(ApiError::BadRequest(
            "Unsupported request content type. Please send 'application/json' or 'multipart/form-data'."
                .to_string(),
        ));
    };

    let mut prompt = ask.prompt.trim().to_string();
    let mut blob: Option<PromptPart> = None;

    if let Some(attachment) = ask.attachment {
        let mime = attachment
            .content_type
            .clone()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if mime.starts_with("image/") {
            blob = Some(PromptPart::Blob {
                mime_type: mime,
                data: attachment.data,
            });
        } else {
            let Attachment {
                filename,
                content_type,
                data,
            } = attachment;
            let extract_name = filename.clone();
            let extracted = tokio::task::spawn_blocking(move || {
                loader::extract_text(&extract_name, content_type.as_deref(), &data)
            })
            .await
            .map_err(ApiError::internal)?;

            match extracted {
                Ok(content) if !content.trim().is_empty() => {
                    prompt = format!(
                        "{prompt}\n\nAdditional context from uploaded file '{filename}':\n{content}"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!("Ignoring attachment '{}': {}", filename, err);
                }
            }
        }
    }

    if prompt.trim().is_empty() && blob.is_none() {
        return Err(ApiError::BadRequest(
            "No prompt or file content provided".to_string(),
        ));
    }

    let provider = state.generation.clone().ok_or_else(|| {
        ApiError::ServiceUnavailable("AI service not initialized on the server".to_string())
    })?;

    let mut parts: Vec<PromptPart> = Vec::new();
    if !prompt.is_empty() {
        if blob.is_none() {
            let kb = state.knowledge.clone();
            let query = prompt.clone();
            let k = state.settings.knowledge.retrieval_k();
            let chunks = tokio::task::spawn_blocking(move || kb.retrieve(&query, k))
                .await
                .map_err(ApiError::internal)?;
            if chunks.is_empty() {
                parts.push(PromptPart::Text(prompt));
            } else {
                parts.push(PromptPart::Text(context_only_prompt(&prompt, &chunks)));
            }
        } else {
            parts.push(PromptPart::Text(prompt));
        }
    }
    if let Some(blob) = blob {
        parts.push(blob);
    }

    let answer = provider
        .generate(&parts)
        .await
        .map_err(map_generation_error)?;

    Ok(Json(json!({ "response": answer })))
}

async fn parse_form(mut multipart: Multipart) -> Result<Ask, ApiError> {
    let mut prompt = String::new();
    let mut attachment = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart payload: {e}")))?
    {
        match field.name() {
            Some("prompt") => {
                prompt = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read prompt: {e}")))?;
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?
                    .to_vec();
                if !data.is_empty() {
                    attachment = Some(Attachment {
                        filename,
                        content_type,
                        data,
                    });
                }
            }
            _ => {}
        }
    }

    if prompt.trim().is_empty() && attachment.is_none() {
        return Err(ApiError::BadRequest(
            "Prompt is required when no file is uploaded".to_string(),
        ));
    }

    Ok(Ask { prompt, attachment })
}

fn map_generation_error(err: GenerationError) -> ApiError {
    match err {
        GenerationError::Blocked(reason) => {
            tracing::warn!("Prompt blocked by the provider: {}", reason);
            ApiError::BadRequest(
                "VirLaw AI: Your prompt was blocked by AI safety features. Please rephrase."
                    .to_string(),
            )
        }
        GenerationError::Empty => ApiError::Internal(
            "Gemini API returned an empty or non-text response. This might be due to safety \
             filters or lack of relevant information."
                .to_string(),
        ),
        GenerationError::Service(detail) => {
            tracing::error!("Generation request failed: {}", detail);
            ApiError::Internal(format!("Failed to get response from Gemini: {detail}"))
        }
    }
}

fn context_only_prompt(question: &str, chunks: &[String]) -> String {
    let context = chunks.join("\n\n");
    format!(
        "Answer the following question only using the provided context. \
         If the answer cannot be found in the context, state 'I don't have \
         enough information to answer that based on the provided context.' \
         Do not use external knowledge.\n\nContext:\n{context}\n\nQuestion: {question}\n\nAnswer:"
    )
}
