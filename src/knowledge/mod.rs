//! Retrieval-augmented knowledge base: chunking, embedding, a flat vector
//! index and the lifecycle manager that ties them to on-disk snapshots.

pub mod base;
pub mod chunker;
pub mod embedder;
pub mod index;
pub mod seed;
pub mod snapshot;

pub use base::{IngestReport, KbState, KnowledgeBase, KnowledgeError, KnowledgeStatus, ScoredChunk};
pub use chunker::ChunkPolicy;
pub use embedder::{build_embedder, EmbedError, Embedder, HashEmbedder};
pub use index::{FlatIndex, IndexError, SearchHit};
