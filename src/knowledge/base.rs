//! Knowledge base lifecycle, ingestion and retrieval.
//!
//! `KnowledgeBase` owns the embedder, the paired (index, corpus) state and
//! the snapshot paths. The corpus is an ordered list of chunk texts aligned
//! 1:1 with index rows; `index.len() == corpus.len()` holds at every point
//! a reader can observe. Writers (rebuild, ingest) serialize on a mutation
//! lock that spans the whole read-mutate-persist sequence, while readers
//! take a consistent snapshot under a short read lock.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use thiserror::Error;

use crate::core::config::settings::KnowledgeSettings;
use crate::core::config::AppPaths;
use crate::loader;

use super::chunker;
use super::embedder::{EmbedError, Embedder};
use super::index::{FlatIndex, IndexError};
use super::seed;
use super::snapshot::{self, SnapshotError};

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("embedding model unavailable")]
    ModelUnavailable,
    #[error("knowledge base is not ready")]
    NotReady,
    #[error("embedding dimension {got} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error("index error: {0}")]
    Index(#[source] IndexError),
    #[error("seed document unavailable: {0}")]
    Seed(#[source] std::io::Error),
    #[error("failed to persist snapshot: {0}")]
    Persistence(#[source] SnapshotError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KbState {
    Uninitialized,
    Loading,
    Rebuilding,
    Ready,
    /// No embedder could be loaded. Terminal for the session: retrieval
    /// returns empty results and ingestion fails, but the process stays up.
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStatus {
    pub state: KbState,
    pub chunk_count: usize,
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub chunks_added: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub text: String,
    pub distance: f32,
}

struct KbCore {
    index: Option<FlatIndex>,
    corpus: Vec<String>,
    state: KbState,
}

pub struct KnowledgeBase {
    embedder: Option<Arc<dyn Embedder>>,
    paths: AppPaths,
    settings: KnowledgeSettings,
    core: RwLock<KbCore>,
    mutation: Mutex<()>,
}

impl KnowledgeBase {
    /// Loads the persisted snapshot if it is present, intact and produced by
    /// the same embedder; otherwise rebuilds from the seed document plus any
    /// uploads surviving on disk.
    pub fn open(
        paths: AppPaths,
        settings: KnowledgeSettings,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, KnowledgeError> {
        let dimension = embedder.dimension();
        let embedder_id = embedder.id().to_string();

        let kb = Self {
            embedder: Some(embedder),
            paths,
            settings,
            core: RwLock::new(KbCore {
                index: None,
                corpus: Vec::new(),
                state: KbState::Uninitialized,
            }),
            mutation: Mutex::new(()),
        };
        kb.write_core().state = KbState::Loading;

        match snapshot::load(&kb.paths) {
            Ok((index, corpus, manifest))
                if index.dimension() == dimension && manifest.embedder == embedder_id =>
            {
                tracing::info!(
                    "Loaded vector store snapshot ({} chunks, dimension {})",
                    corpus.len(),
                    dimension
                );
                let mut core = kb.write_core();
                core.index = Some(index);
                core.corpus = corpus;
                core.state = KbState::Ready;
            }
            Ok((index, _, manifest)) => {
                tracing::warn!(
                    "Snapshot is stale (dimension {} vs {}, embedder '{}' vs '{}'); rebuilding",
                    index.dimension(),
                    dimension,
                    manifest.embedder,
                    embedder_id
                );
                kb.rebuild()?;
            }
            Err(SnapshotError::Missing) => {
                tracing::info!("Vector store not found; creating a new one");
                kb.rebuild()?;
            }
            Err(err) => {
                tracing::warn!("Error loading vector store: {}; rebuilding", err);
                kb.rebuild()?;
            }
        }

        Ok(kb)
    }

    /// Constructs a degraded instance for sessions where no embedder could
    /// be loaded.
    pub fn degraded(paths: AppPaths, settings: KnowledgeSettings) -> Self {
        Self {
            embedder: None,
            paths,
            settings,
            core: RwLock::new(KbCore {
                index: None,
                corpus: Vec::new(),
                state: KbState::Degraded,
            }),
            mutation: Mutex::new(()),
        }
    }

    pub fn status(&self) -> KnowledgeStatus {
        let core = self.read_core();
        KnowledgeStatus {
            state: core.state,
            chunk_count: core.corpus.len(),
            dimension: core.index.as_ref().map(|i| i.dimension()).unwrap_or(0),
        }
    }

    /// Chunks `text` with the upload policy, embeds it and appends vectors
    /// and texts in lockstep, then persists the snapshot. Extraction that
    /// yields no chunks is a successful no-op. A dimension mismatch fails
    /// the whole ingestion with nothing appended.
    pub fn ingest(&self, text: &str, source: &str) -> Result<IngestReport, KnowledgeError> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or(KnowledgeError::ModelUnavailable)?;
        let _guard = self.lock_mutation();

        {
            let core = self.read_core();
            if core.state != KbState::Ready {
                return Err(KnowledgeError::NotReady);
            }
        }

        let chunks = chunker::split_text(text, &self.settings.upload_chunking);
        if chunks.is_empty() {
            let total_chunks = self.read_core().corpus.len();
            tracing::info!(
                "Ingestion from '{}' produced no usable chunks; corpus unchanged",
                source
            );
            return Ok(IngestReport {
                chunks_added: 0,
                total_chunks,
            });
        }

        // Embedding runs outside the core lock; the mutation lock already
        // keeps other writers out.
        let vectors = embedder.embed(&chunks)?;

        let report = {
            let mut core = self.write_core();
            if core.index.is_none() {
                core.index =
                    Some(FlatIndex::new(embedder.dimension()).map_err(KnowledgeError::Index)?);
            }
            let index = match core.index.as_mut() {
                Some(index) => index,
                None => return Err(KnowledgeError::NotReady),
            };

            if index.dimension() != embedder.dimension() {
                return Err(KnowledgeError::DimensionMismatch {
                    expected: index.dimension(),
                    got: embedder.dimension(),
                });
            }

            index.add(&vectors).map_err(|err| match err {
                IndexError::DimensionMismatch { expected, got } => {
                    KnowledgeError::DimensionMismatch { expected, got }
                }
                other => KnowledgeError::Index(other),
            })?;
            let chunks_added = chunks.len();
            core.corpus.extend(chunks);

            IngestReport {
                chunks_added,
                total_chunks: core.corpus.len(),
            }
        };

        self.persist_current(embedder.id())?;

        tracing::info!(
            "Ingested {} chunks from '{}' ({} total)",
            report.chunks_added,
            source,
            report.total_chunks
        );
        Ok(report)
    }

    /// Returns the k nearest chunk texts for the query, nearest first.
    /// Never fails: a degraded service, an empty corpus or an embedding
    /// problem all yield an empty result.
    pub fn retrieve(&self, query: &str, k: usize) -> Vec<String> {
        self.retrieve_scored(query, k)
            .into_iter()
            .map(|chunk| chunk.text)
            .collect()
    }

    pub fn retrieve_scored(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        let Some(embedder) = self.embedder.as_ref() else {
            tracing::warn!("Retrieval requested while degraded; returning no chunks");
            return Vec::new();
        };

        let vectors = match embedder.embed(&[query.to_string()]) {
            Ok(vectors) => vectors,
            Err(err) => {
                tracing::error!("Query embedding failed: {}", err);
                return Vec::new();
            }
        };
        let Some(vector) = vectors.into_iter().next() else {
            return Vec::new();
        };

        let core = self.read_core();
        if core.state != KbState::Ready || core.corpus.is_empty() {
            return Vec::new();
        }
        let Some(index) = core.index.as_ref() else {
            return Vec::new();
        };

        match index.search(&vector, k) {
            Ok(hits) => hits
                .into_iter()
                .filter_map(|hit| {
                    core.corpus.get(hit.position).map(|text| ScoredChunk {
                        text: text.clone(),
                        distance: hit.distance,
                    })
                })
                .collect(),
            Err(err) => {
                tracing::error!("Vector search failed: {}", err);
                Vec::new()
            }
        }
    }

    fn rebuild(&self) -> Result<(), KnowledgeError> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or(KnowledgeError::ModelUnavailable)?;
        let _guard = self.lock_mutation();
        self.write_core().state = KbState::Rebuilding;
        tracing::info!("Rebuilding vector store from the seed document");

        let seed_text =
            seed::ensure_seed_document(&self.paths.seed_path).map_err(KnowledgeError::Seed)?;
        let seed_chunks = chunker::split_text(&seed_text, &self.settings.seed_chunking);
        if seed_chunks.is_empty() {
            tracing::warn!("Seed document produced no chunks; retrieval will find nothing");
        }

        let mut index = FlatIndex::new(embedder.dimension()).map_err(KnowledgeError::Index)?;
        let mut corpus = Vec::new();
        if !seed_chunks.is_empty() {
            let vectors = embedder.embed(&seed_chunks)?;
            index.add(&vectors).map_err(KnowledgeError::Index)?;
            corpus.extend(seed_chunks);
        }

        // A stale snapshot must not silently lose uploads, so every file
        // still present in the upload directory is ingested again.
        for path in self.upload_files() {
            match loader::extract_file(&path) {
                Ok(text) => {
                    let chunks = chunker::split_text(&text, &self.settings.upload_chunking);
                    if chunks.is_empty() {
                        continue;
                    }
                    let vectors = embedder.embed(&chunks)?;
                    index.add(&vectors).map_err(KnowledgeError::Index)?;
                    corpus.extend(chunks);
                    tracing::info!("Re-ingested upload {}", path.display());
                }
                Err(err) => {
                    tracing::warn!("Skipping upload {}: {}", path.display(), err);
                }
            }
        }

        snapshot::persist(&self.paths, &index, &corpus, embedder.id())
            .map_err(KnowledgeError::Persistence)?;

        let mut core = self.write_core();
        core.index = Some(index);
        core.corpus = corpus;
        core.state = KbState::Ready;
        tracing::info!("Vector store ready ({} chunks)", core.corpus.len());
        Ok(())
    }

    fn persist_current(&self, embedder_id: &str) -> Result<(), KnowledgeError> {
        let core = self.read_core();
        let Some(index) = core.index.as_ref() else {
            return Ok(());
        };
        snapshot::persist(&self.paths, index, &core.corpus, embedder_id).map_err(|err| {
            tracing::error!("Failed to persist snapshot: {}", err);
            KnowledgeError::Persistence(err)
        })
    }

    fn upload_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.paths.uploads_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        files
    }

    fn read_core(&self) -> RwLockReadGuard<'_, KbCore> {
        self.core.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_core(&self) -> RwLockWriteGuard<'_, KbCore> {
        self.core.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_mutation(&self) -> MutexGuard<'_, ()> {
        self.mutation.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn with_state_for_test(
        paths: AppPaths,
        settings: KnowledgeSettings,
        embedder: Arc<dyn Embedder>,
        index: FlatIndex,
        corpus: Vec<String>,
    ) -> Self {
        Self {
            embedder: Some(embedder),
            paths,
            settings,
            core: RwLock::new(KbCore {
                index: Some(index),
                corpus,
                state: KbState::Ready,
            }),
            mutation: Mutex::new(()),
        }
    }
}
