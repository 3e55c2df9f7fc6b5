//! The question-answering pipeline.
//!
//! ```text
//! audio -> transcriber -> audio gate ─┐
//! text ───────────────────────────────┴─> domain guard -> retriever -> arbiter
//!     accepted -> assembler
//!     rejected -> fallback generator -> assembler
//! ```
//!
//! Each query runs as one sequential task. Every suspension point is
//! bounded by the configured timeout, and the index lock is only taken in
//! synchronous sections.

use crate::audio::{self, AudioInput, Transcriber, WhisperClient};
use crate::domain::DomainGuard;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::index::MemoryIndex;
use crate::ingest::Ingestor;
use crate::rag::{arbitrate, assemble, FallbackGenerator, FallbackOutput, LlmFallback, Retriever};
use crate::timeout::with_timeout;
use crate::types::{ChatResponse, Document, IndexStats, IngestStats};
use crate::vector_index::{read_index, share, SharedIndex};
use mitra_core::{AppError, AppResult, Settings};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub struct Assistant {
    settings: Settings,
    index: SharedIndex,
    retriever: Retriever,
    ingestor: Ingestor,
    generator: Arc<dyn FallbackGenerator>,
    transcriber: Option<Arc<dyn Transcriber>>,
    domain: DomainGuard,
}

impl Assistant {
    /// Wire the pipeline from explicit capabilities.
    ///
    /// Fails with `DimensionMismatch` when the embedder and index disagree
    /// on dimension.
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        index: SharedIndex,
        generator: Arc<dyn FallbackGenerator>,
    ) -> AppResult<Self> {
        let ingestor = Ingestor::new(Arc::clone(&embedder), Arc::clone(&index), &settings)?;
        let retriever = Retriever::new(Arc::clone(&embedder), Arc::clone(&index), &settings);
        let domain = DomainGuard::new(&settings.domain.keywords);

        Ok(Self {
            settings,
            index,
            retriever,
            ingestor,
            generator,
            transcriber: None,
            domain,
        })
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Build the configured providers and load the index snapshot, if any.
    pub fn from_settings(settings: Settings) -> AppResult<Self> {
        let embedder = create_provider(&settings.embedding)?;
        let index = share(load_index(&settings)?);
        let generator: Arc<dyn FallbackGenerator> = Arc::new(LlmFallback::from_settings(&settings)?);
        let transcriber: Arc<dyn Transcriber> = Arc::new(WhisperClient::from_settings(&settings));

        tracing::debug!(
            "Assistant ready (embedding: {}/{}, llm: {}/{})",
            embedder.provider_name(),
            embedder.model_name(),
            settings.llm.provider,
            settings.llm.model_name
        );

        Ok(Self::new(settings, embedder, index, generator)?.with_transcriber(transcriber))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Answer a text query.
    pub async fn answer_text(&self, query: &str) -> AppResult<ChatResponse> {
        let started = Instant::now();
        let query = crate::rag::normalize_query(query);
        if query.is_empty() {
            return Err(AppError::Embedding("Query is empty".to_string()));
        }

        self.domain.check(&query)?;

        let rag = &self.settings.rag;
        let candidates = self.retriever.retrieve(&query, rag.search_k).await?;
        let decision = arbitrate(&candidates, rag.confidence_threshold);

        let response = if decision.accepted {
            assemble(&query, &decision, None)?
        } else {
            let context: Vec<_> = candidates
                .iter()
                .take(rag.fallback_context_k)
                .map(|c| c.chunk.clone())
                .collect();
            let passages: Vec<String> = context.iter().map(|c| c.text.clone()).collect();

            let llm = &self.settings.llm;
            let answer = with_timeout(
                "generation",
                self.settings.timeouts.generation_secs,
                self.generator
                    .generate(&query, &passages, llm.temperature, llm.max_tokens),
            )
            .await?;

            assemble(&query, &decision, Some(FallbackOutput { answer, context }))?
        };

        tracing::info!(
            "Answered from {} ({}) in {:.2}s",
            response.source.as_str(),
            response.reason,
            started.elapsed().as_secs_f64()
        );

        Ok(response)
    }

    /// Transcribe, gate and answer spoken input.
    pub async fn answer_audio(&self, audio: &AudioInput) -> AppResult<ChatResponse> {
        let settings = &self.settings.audio;

        // Reject unsupported formats before uploading anything.
        audio::check_format(&audio.format, &settings.supported_formats)?;

        let transcriber = self.transcriber.as_ref().ok_or_else(|| {
            AppError::InvalidConfiguration("No transcriber configured for audio input".to_string())
        })?;

        let result = with_timeout(
            "transcription",
            self.settings.timeouts.transcription_secs,
            transcriber.transcribe(audio),
        )
        .await?;

        tracing::info!(
            "Transcribed {:.1}s of audio with confidence {:.3}",
            result.duration_seconds,
            result.confidence
        );

        let transcript = audio::gate(
            &result,
            &settings.supported_formats,
            settings.max_duration_seconds,
            settings.confidence_threshold,
        )?;

        self.answer_text(&transcript).await
    }

    /// Chunk, embed and index one document.
    pub async fn ingest(&self, document: &Document) -> AppResult<IngestStats> {
        self.ingestor.ingest(document).await
    }

    /// Load and ingest a file or every supported file under a directory.
    pub async fn ingest_path(&self, path: &Path) -> AppResult<IngestStats> {
        self.ingestor.ingest_path(path).await
    }

    /// Write the index snapshot to the configured path.
    pub fn save_index(&self) -> AppResult<()> {
        self.ingestor.save(&self.settings.index_path())
    }

    pub fn stats(&self) -> AppResult<IndexStats> {
        Ok(read_index(&self.index)?.stats())
    }
}

/// Restore the configured snapshot, or start an empty index when none
/// exists yet.
pub fn load_index(settings: &Settings) -> AppResult<MemoryIndex> {
    let path = settings.index_path();
    let store = &settings.vector_store;

    if !path.exists() {
        tracing::warn!(
            "No index snapshot at {:?}; starting with an empty knowledge base",
            path
        );
        return Ok(MemoryIndex::new(
            settings.embedding.dimensions,
            store.similarity_metric,
        ));
    }

    MemoryIndex::restore(
        &path,
        store.similarity_metric,
        store.allow_dangerous_deserialization,
    )
}
