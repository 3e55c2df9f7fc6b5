//! Similarity retrieval with exact-match boosting.

use crate::embeddings::{normalize, EmbeddingProvider};
use crate::timeout::with_timeout;
use crate::types::RetrievalCandidate;
use crate::vector_index::{read_index, SharedIndex};
use mitra_core::{AppError, AppResult, Settings};
use std::cmp::Ordering;
use std::sync::Arc;

/// Trim and collapse internal whitespace runs to single spaces.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Queries the vector index and ranks the hits.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: SharedIndex,
    exact_match_bonus: f32,
    normalize_embeddings: bool,
    embedding_timeout_secs: u64,
    search_timeout_secs: u64,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: SharedIndex, settings: &Settings) -> Self {
        Self {
            embedder,
            index,
            exact_match_bonus: settings.rag.exact_match_bonus,
            normalize_embeddings: settings.vector_store.normalize_embeddings,
            embedding_timeout_secs: settings.timeouts.embedding_secs,
            search_timeout_secs: settings.timeouts.search_secs,
        }
    }

    /// Retrieve up to `k` candidates for `query`, best first.
    ///
    /// An empty index yields `Ok(vec![])`. A query that cannot be embedded
    /// (empty after normalization, zero vector, wrong dimension) is an
    /// `Embedding` error.
    pub async fn retrieve(&self, query: &str, k: usize) -> AppResult<Vec<RetrievalCandidate>> {
        let query = normalize_query(query);
        if query.is_empty() {
            return Err(AppError::Embedding("Query is empty".to_string()));
        }

        let embedding = self.embed_query(&query).await?;
        let hits = self.search(embedding, k).await?;

        let needle = query.to_lowercase();
        let mut candidates: Vec<RetrievalCandidate> = hits
            .into_iter()
            .map(|(chunk, similarity)| {
                let exact_match = normalize_query(&chunk.text).to_lowercase().contains(&needle);
                let boosted_score = if exact_match {
                    similarity + self.exact_match_bonus
                } else {
                    similarity
                };
                RetrievalCandidate {
                    chunk,
                    similarity,
                    boosted_score,
                    exact_match,
                }
            })
            .collect();

        candidates.sort_by(rank_order);

        if let Some(top) = candidates.first() {
            tracing::debug!(
                "Top candidate {} (similarity {:.3}, boosted {:.3}, exact_match {})",
                top.chunk.id,
                top.similarity,
                top.boosted_score,
                top.exact_match
            );
        }
        tracing::info!("Retrieved {} candidates for query", candidates.len());

        Ok(candidates)
    }

    async fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        let mut embedding = with_timeout(
            "embedding",
            self.embedding_timeout_secs,
            self.embedder.embed(query),
        )
        .await
        .map_err(|e| match e {
            AppError::DimensionMismatch { expected, actual } => AppError::Embedding(format!(
                "Query embedding has dimension {}, expected {}",
                actual, expected
            )),
            other => other,
        })?;

        if self.normalize_embeddings && !normalize(&mut embedding) {
            return Err(AppError::Embedding(
                "Query embedded to the zero vector; it has no indexable content".to_string(),
            ));
        }

        Ok(embedding)
    }

    async fn search(
        &self,
        embedding: Vec<f32>,
        k: usize,
    ) -> AppResult<Vec<(crate::types::Chunk, f32)>> {
        let index = Arc::clone(&self.index);

        let task = tokio::task::spawn_blocking(move || {
            let guard = read_index(&index)?;
            if guard.is_empty() {
                return Ok(Vec::new());
            }
            if embedding.len() != guard.dimension() {
                return Err(AppError::Embedding(format!(
                    "Query embedding has dimension {}, index expects {}",
                    embedding.len(),
                    guard.dimension()
                )));
            }
            guard.search(&embedding, k)
        });

        with_timeout("search", self.search_timeout_secs, async {
            task.await
                .map_err(|e| AppError::IndexUnavailable(format!("Index search task failed: {}", e)))?
        })
        .await
    }
}

/// Boosted score desc, then raw similarity desc, then document id and
/// offset ascending.
fn rank_order(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
    b.boosted_score
        .total_cmp(&a.boosted_score)
        .then_with(|| b.similarity.total_cmp(&a.similarity))
        .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
        .then_with(|| a.chunk.offset.cmp(&b.chunk.offset))
}
