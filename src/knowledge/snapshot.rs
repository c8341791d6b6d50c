//! Snapshot persistence for the knowledge base.
//!
//! Three artifacts live under the vectorstore directory: `index.bin` (the
//! flat index bytes), `documents.json` (the corpus as a JSON array of
//! strings) and `manifest.json` (format version, embedder id, dimension,
//! chunk count, SHA-256 checksums of the other two files). Each artifact is
//! written to a temp file and renamed into place, manifest last, so a crash
//! mid-persist leaves a mismatch the loader detects instead of a silently
//! truncated store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::config::AppPaths;

use super::index::{FlatIndex, IndexError};

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no snapshot present")]
    Missing,
    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub version: u32,
    pub embedder: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub index_sha256: String,
    pub corpus_sha256: String,
    pub updated_at: String,
}

pub fn persist(
    paths: &AppPaths,
    index: &FlatIndex,
    corpus: &[String],
    embedder_id: &str,
) -> Result<(), SnapshotError> {
    fs::create_dir_all(&paths.vectorstore_dir)?;

    let index_bytes = index.to_bytes();
    let corpus_bytes = serde_json::to_vec_pretty(corpus)?;

    let manifest = SnapshotManifest {
        version: MANIFEST_VERSION,
        embedder: embedder_id.to_string(),
        dimension: index.dimension(),
        chunk_count: corpus.len(),
        index_sha256: sha256_hex(&index_bytes),
        corpus_sha256: sha256_hex(&corpus_bytes),
        updated_at: Utc::now().to_rfc3339(),
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

    write_atomic(&paths.index_path, &index_bytes)?;
    write_atomic(&paths.corpus_path, &corpus_bytes)?;
    write_atomic(&paths.manifest_path, &manifest_bytes)?;
    Ok(())
}

pub fn load(paths: &AppPaths) -> Result<(FlatIndex, Vec<String>, SnapshotManifest), SnapshotError> {
    let artifacts = [
        ("manifest", &paths.manifest_path),
        ("index", &paths.index_path),
        ("corpus", &paths.corpus_path),
    ];
    if artifacts.iter().all(|(_, path)| !path.exists()) {
        return Err(SnapshotError::Missing);
    }
    for (name, path) in &artifacts {
        if !path.exists() {
            return Err(SnapshotError::Corrupt(format!("{} artifact missing", name)));
        }
    }

    let manifest: SnapshotManifest = serde_json::from_slice(&fs::read(&paths.manifest_path)?)?;
    if manifest.version != MANIFEST_VERSION {
        return Err(SnapshotError::Corrupt(format!(
            "unsupported manifest version {}",
            manifest.version
        )));
    }

    let index_bytes = fs::read(&paths.index_path)?;
    if sha256_hex(&index_bytes) != manifest.index_sha256 {
        return Err(SnapshotError::Corrupt("index checksum mismatch".to_string()));
    }
    let corpus_bytes = fs::read(&paths.corpus_path)?;
    if sha256_hex(&corpus_bytes) != manifest.corpus_sha256 {
        return Err(SnapshotError::Corrupt(
            "corpus checksum mismatch".to_string(),
        ));
    }

    let index = FlatIndex::from_bytes(&index_bytes)?;
    let corpus: Vec<String> = serde_json::from_slice(&corpus_bytes)?;

    if index.len() != corpus.len() || index.len() != manifest.chunk_count {
        return Err(SnapshotError::Corrupt(format!(
            "count mismatch: index {} / corpus {} / manifest {}",
            index.len(),
            corpus.len(),
            manifest.chunk_count
        )));
    }
    if index.dimension() != manifest.dimension {
        return Err(SnapshotError::Corrupt(format!(
            "dimension mismatch: index {} / manifest {}",
            index.dimension(),
            manifest.dimension
        )));
    }

    Ok((index, corpus, manifest))
}

fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = tmp_path(target);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, target)
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_paths(tmp: &tempfile::TempDir) -> AppPaths {
        AppPaths::with_data_dir(tmp.path(), tmp.path())
    }

    fn sample_state() -> (FlatIndex, Vec<String>) {
        let mut index = FlatIndex::new(3).unwrap();
        index
            .add(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap();
        let corpus = vec!["first chunk".to_string(), "second chunk".to_string()];
        (index, corpus)
    }

    #[test]
    fn missing_snapshot_is_reported_as_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = test_paths(&tmp);
        assert!(matches!(load(&paths), Err(SnapshotError::Missing)));
    }

    #[test]
    fn round_trip_restores_index_corpus_and_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = test_paths(&tmp);
        let (index, corpus) = sample_state();

        persist(&paths, &index, &corpus, "feature-hash-v1-3").unwrap();
        let (restored_index, restored_corpus, manifest) = load(&paths).unwrap();

        assert_eq!(restored_index, index);
        assert_eq!(restored_corpus, corpus);
        assert_eq!(manifest.embedder, "feature-hash-v1-3");
        assert_eq!(manifest.dimension, 3);
        assert_eq!(manifest.chunk_count, 2);
        assert_eq!(manifest.version, MANIFEST_VERSION);
    }

    #[test]
    fn corpus_file_is_a_plain_json_string_array() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = test_paths(&tmp);
        let (index, corpus) = sample_state();

        persist(&paths, &index, &corpus, "e").unwrap();

        let raw = fs::read_to_string(&paths.corpus_path).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, corpus);
    }

    #[test]
    fn tampered_corpus_fails_the_checksum() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = test_paths(&tmp);
        let (index, corpus) = sample_state();

        persist(&paths, &index, &corpus, "e").unwrap();
        let mut raw = fs::read(&paths.corpus_path).unwrap();
        raw.push(b' ');
        fs::write(&paths.corpus_path, raw).unwrap();

        assert!(matches!(load(&paths), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn truncated_index_fails_the_checksum() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = test_paths(&tmp);
        let (index, corpus) = sample_state();

        persist(&paths, &index, &corpus, "e").unwrap();
        let raw = fs::read(&paths.index_path).unwrap();
        fs::write(&paths.index_path, &raw[..raw.len() - 4]).unwrap();

        assert!(matches!(load(&paths), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn partially_missing_snapshot_is_corrupt_not_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = test_paths(&tmp);
        let (index, corpus) = sample_state();

        persist(&paths, &index, &corpus, "e").unwrap();
        fs::remove_file(&paths.manifest_path).unwrap();

        assert!(matches!(load(&paths), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn persist_leaves_no_temp_files_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = test_paths(&tmp);
        let (index, corpus) = sample_state();

        persist(&paths, &index, &corpus, "e").unwrap();

        let leftovers: Vec<_> = fs::read_dir(&paths.vectorstore_dir)
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
