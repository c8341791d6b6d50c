use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::settings::GenerationSettings;

use super::provider::{GenerationError, GenerationProvider, PromptPart};

/// Client for the Gemini `generateContent` REST endpoint.
///
/// The API key is passed as a query parameter on every call and never
/// appears in logs or error messages.
pub struct GeminiProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(settings: &GenerationSettings, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs()))
            .build()?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, parts: &[PromptPart]) -> Result<String, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{ "parts": render_parts(parts) }],
        });

        let res = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| GenerationError::Service(format!("Gemini request failed: {err}")))?;

        let status = res.status();
        let payload: Value = res
            .json()
            .await
            .map_err(|err| GenerationError::Service(format!("Invalid Gemini response: {err}")))?;

        if !status.is_success() {
            let detail = payload["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(GenerationError::Service(format!(
                "Gemini returned {}: {}",
                status, detail
            )));
        }

        if let Some(reason) = blocked_reason(&payload) {
            return Err(GenerationError::Blocked(reason));
        }

        let text = extract_text(&payload);
        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

fn render_parts(parts: &[PromptPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => json!({ "text": text }),
            PromptPart::Blob { mime_type, data } => json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            }),
        })
        .collect()
}

fn blocked_reason(payload: &Value) -> Option<String> {
    if let Some(reason) = payload["promptFeedback"]["blockReason"].as_str() {
        return Some(reason.to_string());
    }
    if payload["candidates"][0]["finishReason"].as_str() == Some("SAFETY") {
        return Some("SAFETY".to_string());
    }
    None
}

fn extract_text(payload: &Value) -> String {
    let mut out = String::new();
    if let Some(parts) = payload["candidates"][0]["content"]["parts"].as_array() {
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                out.push_str(text);
            }
        }
    }
    out
}
