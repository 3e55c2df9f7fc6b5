//! Document ingestion: chunk, embed, index.

use crate::chunker::chunk_document;
use crate::embeddings::{normalize, EmbeddingProvider};
use crate::parser;
use crate::timeout::with_timeout;
use crate::types::{Document, IngestStats};
use crate::vector_index::{read_index, write_index, SharedIndex};
use mitra_core::{AppError, AppResult, Settings};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Chunks embedded per provider call.
const EMBED_BATCH_SIZE: usize = 32;

/// Writes documents into a shared index.
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    index: SharedIndex,
    dimension: usize,
    chunk_size: usize,
    chunk_overlap: usize,
    normalize_embeddings: bool,
    embedding_timeout_secs: u64,
}

impl Ingestor {
    /// Fails with `DimensionMismatch` when the embedder and index disagree
    /// on dimension.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: SharedIndex,
        settings: &Settings,
    ) -> AppResult<Self> {
        let index_dimension = read_index(&index)?.dimension();
        if embedder.dimensions() != index_dimension {
            return Err(AppError::DimensionMismatch {
                expected: index_dimension,
                actual: embedder.dimensions(),
            });
        }

        Ok(Self {
            embedder,
            index,
            dimension: index_dimension,
            chunk_size: settings.rag.chunk_size,
            chunk_overlap: settings.rag.chunk_overlap,
            normalize_embeddings: settings.vector_store.normalize_embeddings,
            embedding_timeout_secs: settings.timeouts.embedding_secs,
        })
    }

    /// Chunk, embed and index one document.
    ///
    /// The document replaces any earlier version indexed under the same id.
    /// Every chunk is embedded before the index is touched, so a failed
    /// ingest leaves the previous version in place.
    pub async fn ingest(&self, document: &Document) -> AppResult<IngestStats> {
        let started = Instant::now();
        let chunks = chunk_document(document, self.chunk_size, self.chunk_overlap)?;

        let mut stats = IngestStats {
            documents: 1,
            bytes_processed: document.text.len() as u64,
            ..Default::default()
        };

        let mut prepared = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = with_timeout(
                "embedding",
                self.embedding_timeout_secs,
                self.embedder.embed_batch(&texts),
            )
            .await?;

            if embeddings.len() != batch.len() {
                return Err(AppError::Embedding(format!(
                    "Provider returned {} embeddings for {} chunks",
                    embeddings.len(),
                    batch.len()
                )));
            }

            for (chunk, mut embedding) in batch.iter().zip(embeddings) {
                if embedding.len() != self.dimension {
                    return Err(AppError::DimensionMismatch {
                        expected: self.dimension,
                        actual: embedding.len(),
                    });
                }
                if self.normalize_embeddings && !normalize(&mut embedding) {
                    tracing::warn!(
                        "Skipping chunk {} of {}: no embeddable content",
                        chunk.position,
                        document.id
                    );
                    stats.chunks_skipped += 1;
                    continue;
                }
                prepared.push((chunk.clone(), embedding));
            }
        }

        {
            let mut index = write_index(&self.index)?;
            let kept = prepared
                .iter()
                .filter(|(chunk, _)| index.contains(&chunk.id))
                .count();
            let indexed = prepared.len();
            let removed = index.remove_document(&document.id);

            for (chunk, embedding) in prepared {
                index.add(chunk, embedding)?;
            }

            stats.chunks_unchanged = kept as u32;
            stats.chunks_added = (indexed - kept) as u32;
            stats.chunks_removed = removed.saturating_sub(kept) as u32;
        }

        stats.duration_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            "Ingested {} ({} chunks added, {} unchanged, {} removed, {} skipped)",
            document.id,
            stats.chunks_added,
            stats.chunks_unchanged,
            stats.chunks_removed,
            stats.chunks_skipped
        );

        Ok(stats)
    }

    /// Load and ingest a file, or every supported file under a directory.
    pub async fn ingest_path(&self, path: &Path) -> AppResult<IngestStats> {
        let started = Instant::now();
        let files = parser::collect_files(path)?;
        tracing::info!("Ingesting {} files from {:?}", files.len(), path);

        let mut total = IngestStats::default();
        for file in &files {
            let documents = parser::load_file(file)?;
            if documents.is_empty() {
                tracing::warn!("No text found in {:?}", file);
            }
            for document in &documents {
                let stats = self.ingest(document).await?;
                total.merge(&stats);
            }
        }

        total.duration_secs = started.elapsed().as_secs_f64();
        Ok(total)
    }

    /// Write the index snapshot to `path`.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        read_index(&self.index)?.save(path)
    }
}
