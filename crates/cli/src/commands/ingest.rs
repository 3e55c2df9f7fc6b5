//! Ingest command handler.

use crate::to_json;
use clap::Args;
use mitra_core::{AppResult, Settings};
use mitra_knowledge::embeddings::create_provider;
use mitra_knowledge::vector_index::share;
use mitra_knowledge::{load_index, IngestStats, Ingestor, MemoryIndex};
use std::path::PathBuf;
use std::time::Instant;

/// Add documents to the knowledge base
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest (.txt, .md, .html)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Start from an empty index instead of the saved snapshot
    #[arg(long)]
    pub rebuild: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, settings: &Settings) -> AppResult<()> {
        tracing::info!("Executing ingest command for {} paths", self.paths.len());
        let started = Instant::now();

        let embedder = create_provider(&settings.embedding)?;
        let index = if self.rebuild {
            MemoryIndex::new(
                settings.embedding.dimensions,
                settings.vector_store.similarity_metric,
            )
        } else {
            load_index(settings)?
        };
        let ingestor = Ingestor::new(embedder, share(index), settings)?;

        let mut total = IngestStats::default();
        for path in &self.paths {
            total.merge(&ingestor.ingest_path(path).await?);
        }
        total.duration_secs = started.elapsed().as_secs_f64();

        settings.ensure_mitra_dir()?;
        let snapshot = settings.index_path();
        ingestor.save(&snapshot)?;

        if self.json {
            println!("{}", to_json(&total)?);
        } else {
            println!(
                "Ingested {} documents ({} chunks added, {} unchanged, {} removed, {} skipped, {} bytes) in {:.2}s",
                total.documents,
                total.chunks_added,
                total.chunks_unchanged,
                total.chunks_removed,
                total.chunks_skipped,
                total.bytes_processed,
                total.duration_secs
            );
            println!("Index saved to {}", snapshot.display());
        }

        Ok(())
    }
}
