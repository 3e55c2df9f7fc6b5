//! Vector index abstraction for knowledge chunks.
//!
//! Defines a trait for backend-agnostic vector storage and retrieval, plus
//! the shared handle the query path reads through.

use crate::embeddings::{cosine_similarity, l2_norm};
use crate::types::{Chunk, IndexStats};
use mitra_core::{AppError, AppResult, SimilarityMetric};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Trait for vector index backends.
///
/// Implementations must support:
/// - Upserting chunks with embeddings, keyed by chunk id
/// - Searching for the top-k most similar vectors
/// - Collecting statistics
/// - Snapshotting to disk
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a chunk and its embedding.
    ///
    /// Returns `true` when the chunk id was not indexed before. Fails with
    /// `DimensionMismatch` when the embedding has the wrong length.
    fn add(&mut self, chunk: Chunk, embedding: Vec<f32>) -> AppResult<bool>;

    /// Top-k chunks by similarity under the index metric, descending.
    fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<(Chunk, f32)>>;

    /// Fixed embedding dimension for the lifetime of the index.
    fn dimension(&self) -> usize;

    fn metric(&self) -> SimilarityMetric;

    /// Number of indexed chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> IndexStats;

    /// Whether a chunk id is indexed.
    fn contains(&self, chunk_id: &str) -> bool;

    /// Drop every chunk of one document. Returns how many were removed.
    fn remove_document(&mut self, document_id: &str) -> usize;

    /// Remove every chunk.
    fn clear(&mut self);

    /// Persist the index to `path`.
    fn save(&self, path: &Path) -> AppResult<()>;
}

/// Index handle shared between ingestion (writer) and queries (readers).
pub type SharedIndex = Arc<RwLock<dyn VectorIndex>>;

/// Wrap an index into a shared handle.
pub fn share<I: VectorIndex + 'static>(index: I) -> SharedIndex {
    Arc::new(RwLock::new(index))
}

/// Take the read lock. Guards must not be held across an `.await`.
pub fn read_index(index: &SharedIndex) -> AppResult<RwLockReadGuard<'_, dyn VectorIndex + 'static>> {
    index
        .read()
        .map_err(|_| AppError::IndexUnavailable("index lock poisoned".to_string()))
}

/// Take the write lock. Guards must not be held across an `.await`.
pub fn write_index(
    index: &SharedIndex,
) -> AppResult<RwLockWriteGuard<'_, dyn VectorIndex + 'static>> {
    index
        .write()
        .map_err(|_| AppError::IndexUnavailable("index lock poisoned".to_string()))
}

/// Similarity between two vectors under `metric`. Higher is more similar.
///
/// Euclidean distance `d` is mapped to `1 / (1 + d)`.
pub fn similarity(metric: SimilarityMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        SimilarityMetric::Cosine => cosine_similarity(a, b),
        SimilarityMetric::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        SimilarityMetric::Euclidean => {
            let diff: Vec<f32> = a.iter().zip(b).map(|(x, y)| x - y).collect();
            1.0 / (1.0 + l2_norm(&diff))
        }
    }
}
