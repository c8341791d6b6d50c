use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppPaths, Settings};
use crate::knowledge::{build_embedder, Embedder, KnowledgeBase};
use crate::llm::{GeminiProvider, GenerationProvider};

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes.
///
/// Contains references to:
/// - Paths and configuration
/// - The knowledge base (vector index plus corpus)
/// - The generation provider, when an API key is configured
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<Settings>,
    pub knowledge: Arc<KnowledgeBase>,
    pub generation: Option<Arc<dyn GenerationProvider>>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// The embedding backend loads under a bounded timeout; if it fails or
    /// times out the knowledge base comes up degraded and the server still
    /// starts. A knowledge base that cannot read or write its own data
    /// directory is fatal.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let settings = Arc::new(Settings::load(&paths));

        let knowledge = match load_embedder(&paths, &settings).await {
            Some(embedder) => {
                let kb_paths = paths.as_ref().clone();
                let kb_settings = settings.knowledge.clone();
                let kb = tokio::task::spawn_blocking(move || {
                    KnowledgeBase::open(kb_paths, kb_settings, embedder)
                })
                .await
                .map_err(|e| InitializationError::Knowledge(e.into()))?
                .map_err(|e| InitializationError::Knowledge(e.into()))?;
                Arc::new(kb)
            }
            None => Arc::new(KnowledgeBase::degraded(
                paths.as_ref().clone(),
                settings.knowledge.clone(),
            )),
        };

        let generation = init_generation(&settings);

        Ok(Arc::new(AppState {
            paths,
            settings,
            knowledge,
            generation,
        }))
    }
}

async fn load_embedder(paths: &AppPaths, settings: &Settings) -> Option<Arc<dyn Embedder>> {
    let embedding = settings.embedding.clone();
    let cache_dir = paths.data_dir.join("models");
    let timeout = Duration::from_secs(embedding.load_timeout_secs());

    let load = tokio::task::spawn_blocking(move || build_embedder(&embedding, &cache_dir));
    match tokio::time::timeout(timeout, load).await {
        Ok(Ok(Ok(embedder))) => {
            tracing::info!(
                "Embedding backend '{}' ready (dimension {})",
                embedder.id(),
                embedder.dimension()
            );
            Some(embedder)
        }
        Ok(Ok(Err(err))) => {
            tracing::warn!("Embedding backend failed to load: {}; continuing degraded", err);
            None
        }
        Ok(Err(err)) => {
            tracing::warn!("Embedding loader task failed: {}; continuing degraded", err);
            None
        }
        Err(_) => {
            tracing::warn!(
                "Embedding backend did not load within {}s; continuing degraded",
                timeout.as_secs()
            );
            None
        }
    }
}

fn init_generation(settings: &Settings) -> Option<Arc<dyn GenerationProvider>> {
    let api_key = match env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            tracing::warn!("GEMINI_API_KEY is not set; generation endpoints will answer 503");
            return None;
        }
    };

    match GeminiProvider::new(&settings.generation, api_key) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(err) => {
            tracing::warn!("Failed to construct Gemini client: {}", err);
            None
        }
    }
}
