/// Flat inner-product vector index
use ndarray::{Array2, ArrayView1, Axis};
use std::io::{Read, Write};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"LSIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Corrupt index snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Search result with position and similarity score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Position of the vector in insertion order (maps to chunk position)
    pub position: usize,
    /// Inner product of the normalized vectors, i.e. cosine similarity
    pub score: f32,
}

impl SearchResult {
    /// Squared Euclidean distance between the two unit vectors
    ///
    /// For unit vectors `|a - b|^2 = 2 (1 - a.b)`.
    pub fn distance(&self) -> f32 {
        (2.0 - 2.0 * self.score).max(0.0)
    }

    /// Similarity in `[0, 1]`: `max(0, 1 - distance / 2)`
    pub fn similarity(&self) -> f32 {
        (1.0 - self.distance() / 2.0).clamp(0.0, 1.0)
    }
}

/// Exact nearest-neighbor index over L2-normalized vectors
///
/// Rows are stored in insertion order and never removed, so row `i` always
/// corresponds to the `i`-th vector ever added. Search is a brute-force
/// inner-product scan, which is exact and fast enough for thousands of
/// chunks.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    vectors: Array2<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` components
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dimension)),
        }
    }

    /// Append vectors, normalizing each one
    ///
    /// Either every vector is added or none is.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), VectorIndexError> {
        let dimension = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(VectorIndexError::InvalidDimension {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let mut rows = Vec::with_capacity(vectors.len() * dimension);
        for vector in vectors {
            let start = rows.len();
            rows.extend_from_slice(vector);
            l2_normalize(&mut rows[start..]);
        }

        let batch = Array2::from_shape_vec((vectors.len(), dimension), rows)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;
        self.vectors
            .append(Axis(0), batch.view())
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;

        Ok(())
    }

    /// Search for the `k` nearest neighbors of `query`
    ///
    /// `k` is clamped to the number of stored vectors. Results are sorted by
    /// descending score; ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension() {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let scores = self.vectors.dot(&ArrayView1::from(query.as_slice()));
        let mut results: Vec<SearchResult> = scores
            .iter()
            .enumerate()
            .map(|(position, &score)| SearchResult { position, score })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.position.cmp(&b.position)));
        results.truncate(k);

        Ok(results)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// Stored (normalized) vector at `position`
    pub fn vector(&self, position: usize) -> Option<Vec<f32>> {
        (position < self.len()).then(|| self.vectors.row(position).to_vec())
    }

    /// Serialize the index as a zstd-compressed snapshot
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), VectorIndexError> {
        let mut raw = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        raw.extend_from_slice(MAGIC);
        raw.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        raw.extend_from_slice(&(self.dimension() as u32).to_le_bytes());
        raw.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in self.vectors.iter() {
            raw.extend_from_slice(&value.to_le_bytes());
        }

        zstd::stream::copy_encode(&raw[..], writer, 3)?;
        Ok(())
    }

    /// Read a snapshot written by [`VectorIndex::write_to`]
    pub fn read_from<R: Read>(reader: R) -> Result<Self, VectorIndexError> {
        let raw = zstd::decode_all(reader)
            .map_err(|e| VectorIndexError::CorruptSnapshot(format!("decompression failed: {}", e)))?;

        if raw.len() < HEADER_LEN || &raw[0..4] != MAGIC {
            return Err(VectorIndexError::CorruptSnapshot(
                "missing index header".to_string(),
            ));
        }

        let version = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        if version != FORMAT_VERSION {
            return Err(VectorIndexError::CorruptSnapshot(format!(
                "unsupported format version {}",
                version
            )));
        }

        let dimension = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&raw[12..20]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let body = &raw[HEADER_LEN..];
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| VectorIndexError::CorruptSnapshot("size overflow".to_string()))?;
        if body.len() != expected {
            return Err(VectorIndexError::CorruptSnapshot(format!(
                "expected {} bytes of vector data, found {}",
                expected,
                body.len()
            )));
        }

        let values: Vec<f32> = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let vectors = Array2::from_shape_vec((count, dimension), values)
            .map_err(|e| VectorIndexError::CorruptSnapshot(e.to_string()))?;

        Ok(Self { vectors })
    }
}

/// Scale `vector` to unit length; zero vectors are left untouched
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
