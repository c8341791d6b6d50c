//! Embedding backends.
//!
//! `HashEmbedder` is a deterministic feature-hashing projection that is
//! always available and needs no model files; it keeps the service fully
//! functional in builds and environments without a model. `FastEmbedEmbedder`
//! wraps an ONNX sentence-transformer and is compiled in behind the
//! `fastembed` cargo feature.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::core::config::settings::EmbeddingSettings;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding model failed to load: {0}")]
    ModelLoad(String),
    #[error("embedding failed: {0}")]
    Inference(String),
    #[error("unknown embedding backend '{0}'")]
    UnknownBackend(String),
}

pub trait Embedder: Send + Sync {
    /// Stable identity recorded in snapshot manifests. A snapshot written
    /// under a different id is stale and triggers a rebuild.
    fn id(&self) -> &str;

    /// Output dimension, fixed and known before any embedding call.
    fn dimension(&self) -> usize;

    /// Batch embedding. Output order matches input order and every vector
    /// has exactly `dimension()` elements.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Picks the backend named by the settings. Model-backed construction can
/// fail or hang on downloads, so callers wrap this in a timeout and treat
/// failure as a degraded (retrieval-disabled) service.
pub fn build_embedder(
    settings: &EmbeddingSettings,
    cache_dir: &Path,
) -> Result<Arc<dyn Embedder>, EmbedError> {
    match settings.backend.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(settings.dimension()))),
        "fastembed" => load_fastembed(cache_dir),
        other => Err(EmbedError::UnknownBackend(other.to_string())),
    }
}

#[cfg(feature = "fastembed")]
fn load_fastembed(cache_dir: &Path) -> Result<Arc<dyn Embedder>, EmbedError> {
    Ok(Arc::new(FastEmbedEmbedder::load(cache_dir)?))
}

#[cfg(not(feature = "fastembed"))]
fn load_fastembed(_cache_dir: &Path) -> Result<Arc<dyn Embedder>, EmbedError> {
    Err(EmbedError::ModelLoad(
        "backend 'fastembed' is not compiled in; rebuild with --features fastembed".to_string(),
    ))
}

/// Feature-hashing embedder over lowercased word tokens and character
/// trigrams, L2 normalized. FNV-1a keeps bucket assignment stable across
/// runs and platforms.
pub struct HashEmbedder {
    id: String,
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(8);
        Self {
            id: format!("feature-hash-v1-{}", dimension),
            dimension,
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

impl HashEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];

        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            self.bump(&mut vector, token.as_bytes());
            let chars: Vec<char> = token.chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                self.bump(&mut vector, gram.as_bytes());
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn bump(&self, vector: &mut [f32], feature: &[u8]) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(feature = "fastembed")]
pub use model::FastEmbedEmbedder;

#[cfg(feature = "fastembed")]
mod model {
    use std::path::Path;

    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    use super::{EmbedError, Embedder};

    /// ONNX sentence-transformer backend (all-MiniLM-L6-v2). Model files are
    /// cached under the data directory; first load may download them.
    pub struct FastEmbedEmbedder {
        model: TextEmbedding,
        id: String,
        dimension: usize,
    }

    impl FastEmbedEmbedder {
        pub fn load(cache_dir: &Path) -> Result<Self, EmbedError> {
            let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false);
            let model = TextEmbedding::try_new(options)
                .map_err(|err| EmbedError::ModelLoad(err.to_string()))?;

            // The crate does not expose the dimension directly, so probe it.
            let probe = model
                .embed(vec![" ".to_string()], None)
                .map_err(|err| EmbedError::ModelLoad(err.to_string()))?;
            let dimension = probe.first().map(|v| v.len()).unwrap_or(0);
            if dimension == 0 {
                return Err(EmbedError::ModelLoad(
                    "model produced an empty probe embedding".to_string(),
                ));
            }

            Ok(Self {
                model,
                id: "all-MiniLM-L6-v2".to_string(),
                dimension,
            })
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn id(&self) -> &str {
            &self.id
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            self.model
                .embed(texts.to_vec(), None)
                .map_err(|err| EmbedError::Inference(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[test]
    fn embeddings_are_deterministic() {
        let embedder = HashEmbedder::default();
        let texts = vec!["Negligence requires a duty of care.".to_string()];
        let first = embedder.embed(&texts).unwrap();
        let second = embedder.embed(&texts).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn dimension_is_fixed_and_known_up_front() {
        let embedder = HashEmbedder::new(384);
        assert_eq!(embedder.dimension(), 384);

        let texts = vec!["a".to_string(), "b c d".to_string(), String::new()];
        let vectors = embedder.embed(&texts).unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 384));
    }

    #[test]
    fn non_empty_text_is_unit_normalized() {
        let embedder = HashEmbedder::default();
        let vectors = embedder
            .embed(&["copyright protects original works".to_string()])
            .unwrap();
        let norm = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_the_zero_vector() {
        let embedder = HashEmbedder::default();
        let vectors = embedder.embed(&["   ".to_string()]).unwrap();
        assert!(vectors[0].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn shared_vocabulary_reduces_distance() {
        let embedder = HashEmbedder::default();
        let vectors = embedder
            .embed(&[
                "what is required for negligence".to_string(),
                "negligence requires duty breach causation and damages".to_string(),
                "contracts require offer acceptance and consideration".to_string(),
            ])
            .unwrap();

        let to_negligence = squared_l2(&vectors[0], &vectors[1]);
        let to_contracts = squared_l2(&vectors[0], &vectors[2]);
        assert!(to_negligence < to_contracts);
    }

    #[test]
    fn tiny_dimension_is_raised_to_a_usable_floor() {
        let embedder = HashEmbedder::new(1);
        assert_eq!(embedder.dimension(), 8);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let settings = EmbeddingSettings {
            backend: "quantum".to_string(),
            ..Default::default()
        };
        let result = build_embedder(&settings, std::env::temp_dir().as_path());
        assert!(matches!(result, Err(EmbedError::UnknownBackend(_))));
    }
}
