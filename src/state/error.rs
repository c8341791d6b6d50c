use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to initialize knowledge base: {0}")]
    Knowledge(#[source] anyhow::Error),
}
