use std::fs;

use serde::{Deserialize, Serialize};

use crate::core::config::AppPaths;
use crate::knowledge::chunker::ChunkPolicy;

/// Typed view of `config.yml`. Every field has a default so a missing or
/// partial file is fine; values are clamped at the accessors rather than
/// rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub knowledge: KnowledgeSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSettings {
    /// Policy used when rebuilding the corpus from the seed document.
    pub seed_chunking: ChunkPolicy,
    /// Policy used when ingesting uploaded documents.
    pub upload_chunking: ChunkPolicy,
    pub retrieval_k: usize,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            seed_chunking: ChunkPolicy::seed(),
            upload_chunking: ChunkPolicy::upload(),
            retrieval_k: 3,
        }
    }
}

impl KnowledgeSettings {
    pub fn retrieval_k(&self) -> usize {
        self.retrieval_k.clamp(1, 20)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// "hash" or "fastembed" (the latter requires the `fastembed` feature).
    pub backend: String,
    /// Output dimension for the hash backend. Model backends report their own.
    pub dimension: usize,
    pub load_timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            dimension: 384,
            load_timeout_secs: 120,
        }
    }
}

impl EmbeddingSettings {
    pub fn dimension(&self) -> usize {
        self.dimension.clamp(8, 4096)
    }

    pub fn load_timeout_secs(&self) -> u64 {
        self.load_timeout_secs.clamp(5, 600)
    }
}

fn default_backend() -> String {
    if cfg!(feature = "fastembed") {
        "fastembed".to_string()
    } else {
        "hash".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 60,
        }
    }
}

impl GenerationSettings {
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.clamp(5, 300)
    }
}

impl Settings {
    pub fn load(paths: &AppPaths) -> Self {
        let path = paths.config_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Settings::default(),
        };

        match serde_yaml::from_str::<Settings>(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!("Failed to parse {}: {}; using defaults", path.display(), err);
                Settings::default()
            }
        }
    }
}
