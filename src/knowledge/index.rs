//! Flat vector index with exact nearest-neighbor search.
//!
//! Vectors are stored row-major in a single `Vec<f32>` and searched
//! exhaustively by squared Euclidean distance. The byte format is little
//! endian with a fixed header, so a persisted index reloads bit-for-bit and
//! returns identical distances for identical queries.

use std::cmp::Ordering;

use thiserror::Error;

const MAGIC: &[u8; 4] = b"VLIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index dimension must be at least 1")]
    ZeroDimension,
    #[error("vector dimension {got} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("corrupt index data: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Insertion position of the stored vector, which is also the position
    /// of its source chunk in the corpus.
    pub position: usize,
    pub distance: f32,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends vectors in order. Every vector is validated against the index
    /// dimension before anything is appended, so a failed call leaves the
    /// index untouched.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    got: vector.len(),
                });
            }
        }
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Exact k-nearest-neighbor search. Results ascend by squared L2
    /// distance; equal distances break ties by ascending position. `k`
    /// larger than the stored count is clamped; `k == 0` or an empty index
    /// yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| SearchHit {
                position,
                distance: squared_l2(query, row),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k.min(hits.len()));
        Ok(hits)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexError::Corrupt("truncated header".to_string()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                version
            )));
        }

        let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        if dimension == 0 {
            return Err(IndexError::Corrupt("zero dimension".to_string()));
        }

        let count = u64::from_le_bytes([
            bytes[12], bytes[13], bytes[14], bytes[15], bytes[16], bytes[17], bytes[18],
            bytes[19],
        ]) as usize;

        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexError::Corrupt("vector count overflows".to_string()))?;
        let payload = &bytes[HEADER_LEN..];
        if payload.len() != expected {
            return Err(IndexError::Corrupt(format!(
                "expected {} data bytes, found {}",
                expected,
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self { dimension, data })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::new(3).unwrap();
        index
            .add(&[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ])
            .unwrap();
        index
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(matches!(FlatIndex::new(0), Err(IndexError::ZeroDimension)));
    }

    #[test]
    fn empty_index_and_zero_k_return_nothing() {
        let index = FlatIndex::new(3).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());

        let index = sample_index();
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let index = sample_index();
        let hits = index.search(&[0.9, 0.1, 0.0], 3).unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 1);
        assert_eq!(hits[2].position, 2);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);
    }

    #[test]
    fn equal_distances_break_ties_by_position() {
        let mut index = FlatIndex::new(2).unwrap();
        index
            .add(&[vec![1.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0]])
            .unwrap();

        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn k_larger_than_len_is_clamped() {
        let mut index = FlatIndex::new(2).unwrap();
        index.add(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();

        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn mismatched_vector_appends_nothing() {
        let mut index = FlatIndex::new(3).unwrap();
        let result = index.add(&[vec![1.0, 0.0, 0.0], vec![1.0, 0.0]]);

        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn query_of_wrong_dimension_is_an_error() {
        let index = sample_index();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn byte_round_trip_preserves_distances_exactly() {
        let mut index = FlatIndex::new(4).unwrap();
        index
            .add(&[
                vec![0.1, 0.2, 0.3, 0.4],
                vec![-1.5, 2.5, -3.5, 4.5],
                vec![0.0, 0.0, 0.0, 1e-7],
            ])
            .unwrap();

        let restored = FlatIndex::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(restored, index);

        let query = [0.3, -0.2, 0.9, 0.01];
        let original_hits = index.search(&query, 3).unwrap();
        let restored_hits = restored.search(&query, 3).unwrap();
        for (a, b) in original_hits.iter().zip(&restored_hits) {
            assert_eq!(a.position, b.position);
            assert_eq!(a.distance.to_bits(), b.distance.to_bits());
        }
    }

    #[test]
    fn corrupt_bytes_are_rejected() {
        let index = sample_index();
        let mut bytes = index.to_bytes();

        assert!(FlatIndex::from_bytes(&bytes[..10]).is_err());

        bytes.truncate(bytes.len() - 1);
        assert!(FlatIndex::from_bytes(&bytes).is_err());

        let mut wrong_magic = index.to_bytes();
        wrong_magic[0] = b'X';
        assert!(FlatIndex::from_bytes(&wrong_magic).is_err());
    }
}
