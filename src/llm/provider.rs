use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("prompt was blocked by the provider: {0}")]
    Blocked(String),
    #[error("provider returned an empty response")]
    Empty,
    #[error("generation request failed: {0}")]
    Service(String),
}

/// One piece of a multimodal prompt. Text parts carry the instruction and
/// any retrieved context; blob parts carry raw attachment bytes with their
/// MIME type.
#[derive(Debug, Clone)]
pub enum PromptPart {
    Text(String),
    Blob { mime_type: String, data: Vec<u8> },
}

impl PromptPart {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// return the provider name (e.g. "gemini")
    fn name(&self) -> &str;

    /// produce a single answer for the assembled prompt parts
    async fn generate(&self, parts: &[PromptPart]) -> Result<String, GenerationError>;
}
