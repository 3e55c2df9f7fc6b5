//! Ingestion, idempotence and snapshot persistence.

use super::fakes::{FakeGenerator, FixedEmbedder, FlakyEmbedder};
use crate::embeddings::create_provider;
use crate::index::MemoryIndex;
use crate::types::Document;
use crate::vector_index::{read_index, share, VectorIndex};
use crate::{load_index, Assistant, Ingestor};
use mitra_core::{AppError, Settings, SimilarityMetric};
use std::sync::Arc;
use tempfile::TempDir;

fn hashing_assistant(settings: Settings) -> Assistant {
    let embedder = create_provider(&settings.embedding).unwrap();
    let index = share(MemoryIndex::new(
        settings.embedding.dimensions,
        settings.vector_store.similarity_metric,
    ));
    Assistant::new(settings, embedder, index, Arc::new(FakeGenerator::new("unused"))).unwrap()
}

fn long_document() -> Document {
    let text = "Residents can update their demographic details such as name, address, \
                date of birth and gender at an enrolment centre or online. "
        .repeat(40);
    Document::new("update-guide.txt", text)
}

#[tokio::test]
async fn test_reingestion_does_not_grow_index() {
    let assistant = hashing_assistant(Settings::default());
    let document = long_document();

    let first = assistant.ingest(&document).await.unwrap();
    let len_after_first = assistant.stats().unwrap().chunks;
    assert!(first.chunks_added > 1);
    assert_eq!(first.chunks_unchanged, 0);

    let second = assistant.ingest(&document).await.unwrap();
    assert_eq!(second.chunks_added, 0);
    assert_eq!(second.chunks_unchanged, first.chunks_added);
    assert_eq!(assistant.stats().unwrap().chunks, len_after_first);
}

#[tokio::test]
async fn test_edited_document_replaces_previous_version() {
    let assistant = hashing_assistant(Settings::default());

    let first = assistant
        .ingest(&Document::new("faq.txt", "Enrolment fee is 50 rupees."))
        .await
        .unwrap();
    assert_eq!(first.chunks_added, 1);

    let second = assistant
        .ingest(&Document::new("faq.txt", "Enrolment is free of cost."))
        .await
        .unwrap();
    assert_eq!(second.chunks_added, 1);
    assert_eq!(second.chunks_removed, 1);
    assert_eq!(second.chunks_unchanged, 0);

    assert_eq!(assistant.stats().unwrap().chunks, 1);

    let response = assistant
        .answer_text("Enrolment is free of cost.")
        .await
        .unwrap();
    assert_eq!(response.answer, "Enrolment is free of cost.");
}

#[tokio::test]
async fn test_shorter_version_drops_trailing_chunks() {
    let mut settings = Settings::default();
    settings.rag.chunk_size = 10;
    settings.rag.chunk_overlap = 0;
    let assistant = hashing_assistant(settings);

    let long = "Aadhaar enrolment centres open daily. ".repeat(5);
    let first = assistant.ingest(&Document::new("centres.txt", long)).await.unwrap();
    assert!(first.chunks_added > 2);

    let second = assistant
        .ingest(&Document::new("centres.txt", "Aadhaar enrolment"))
        .await
        .unwrap();
    assert_eq!(assistant.stats().unwrap().chunks, 2);
    assert_eq!(second.chunks_unchanged + second.chunks_added, 2);
    assert_eq!(
        second.chunks_removed + second.chunks_unchanged,
        first.chunks_added
    );
}

#[tokio::test]
async fn test_reingesting_empty_text_removes_document() {
    let assistant = hashing_assistant(Settings::default());
    assistant.ingest(&long_document()).await.unwrap();
    let before = assistant.stats().unwrap().chunks as u32;

    let stats = assistant
        .ingest(&Document::new("update-guide.txt", ""))
        .await
        .unwrap();
    assert_eq!(stats.chunks_removed, before);
    assert_eq!(assistant.stats().unwrap().chunks, 0);
}

#[tokio::test]
async fn test_failed_ingest_leaves_no_partial_document() {
    let mut settings = Settings::default();
    settings.rag.chunk_size = 10;
    settings.rag.chunk_overlap = 0;
    let index = share(MemoryIndex::new(3, SimilarityMetric::Cosine));
    // 400 characters at size 10 is 40 chunks: two embedding batches.
    let ingestor =
        Ingestor::new(Arc::new(FlakyEmbedder::new(3, 2)), Arc::clone(&index), &settings).unwrap();

    let result = ingestor
        .ingest(&Document::new("handbook.txt", "a".repeat(400)))
        .await;

    assert!(matches!(result, Err(AppError::Embedding(_))));
    assert_eq!(read_index(&index).unwrap().len(), 0);
}

#[tokio::test]
async fn test_failed_reingest_keeps_previous_version() {
    let mut settings = Settings::default();
    settings.rag.chunk_size = 10;
    settings.rag.chunk_overlap = 0;
    let index = share(MemoryIndex::new(3, SimilarityMetric::Cosine));
    // Call 1 ingests the old version, call 2 succeeds, call 3 fails.
    let ingestor =
        Ingestor::new(Arc::new(FlakyEmbedder::new(3, 3)), Arc::clone(&index), &settings).unwrap();

    ingestor
        .ingest(&Document::new("handbook.txt", "old text"))
        .await
        .unwrap();

    let result = ingestor
        .ingest(&Document::new("handbook.txt", "b".repeat(400)))
        .await;
    assert!(result.is_err());

    let index = read_index(&index).unwrap();
    assert_eq!(index.len(), 1);
    let hits = index.search(&[1.0, 0.0, 0.0], 5).unwrap();
    assert_eq!(hits[0].0.text, "old text");
}

#[tokio::test]
async fn test_empty_document_adds_nothing() {
    let assistant = hashing_assistant(Settings::default());
    let stats = assistant.ingest(&Document::new("empty.txt", "")).await.unwrap();

    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks_added, 0);
    assert_eq!(assistant.stats().unwrap().chunks, 0);
}

#[tokio::test]
async fn test_zero_vector_chunks_are_skipped() {
    let assistant = hashing_assistant(Settings::default());
    let stats = assistant
        .ingest(&Document::new("noise.txt", "the and of to"))
        .await
        .unwrap();

    assert_eq!(stats.chunks_skipped, 1);
    assert_eq!(stats.chunks_added, 0);
}

#[tokio::test]
async fn test_wrong_embedding_length_is_dimension_mismatch() {
    let embedder = FixedEmbedder::new(3).with("short vector", vec![1.0, 0.0]);
    let index = share(MemoryIndex::new(3, SimilarityMetric::Cosine));
    let assistant = Assistant::new(
        Settings::default(),
        Arc::new(embedder),
        index,
        Arc::new(FakeGenerator::new("unused")),
    )
    .unwrap();

    let err = assistant
        .ingest(&Document::new("bad.txt", "short vector"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));
}

#[tokio::test]
async fn test_ingest_path_reads_pages_and_directories() {
    let temp = TempDir::new().unwrap();
    let docs = temp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(
        docs.join("faq.md"),
        "# Aadhaar FAQ\n\nAadhaar is a 12-digit identity number.",
    )
    .unwrap();
    std::fs::write(
        docs.join("handbook.txt"),
        "Enrolment is free of cost.\x0cBiometric update costs a fee.",
    )
    .unwrap();

    let assistant = hashing_assistant(Settings::default());
    let stats = assistant.ingest_path(&docs).await.unwrap();

    assert_eq!(stats.documents, 3);
    assert_eq!(stats.chunks_added, 3);

    let index_stats = assistant.stats().unwrap();
    assert_eq!(index_stats.documents, 3);
    assert_eq!(index_stats.dimension, 384);
}

#[tokio::test]
async fn test_snapshot_round_trip_requires_opt_in() {
    let temp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.workspace = temp.path().to_path_buf();

    let assistant = hashing_assistant(settings.clone());
    assistant.ingest(&long_document()).await.unwrap();
    assistant.save_index().unwrap();
    let saved = assistant.stats().unwrap();

    assert!(settings.index_path().exists());

    let refused = load_index(&settings);
    assert!(matches!(refused, Err(AppError::InvalidConfiguration(_))));

    settings.vector_store.allow_dangerous_deserialization = true;
    let restored = share(load_index(&settings).unwrap());
    assert_eq!(read_index(&restored).unwrap().stats(), saved);

    // The restored index answers from the ingested text.
    settings.rag.confidence_threshold = 0.1;
    let embedder = create_provider(&settings.embedding).unwrap();
    let reopened = Assistant::new(
        settings,
        embedder,
        restored,
        Arc::new(FakeGenerator::new("unused")),
    )
    .unwrap();
    let response = reopened
        .answer_text("update their demographic details")
        .await
        .unwrap();
    assert!(response.answer.contains("demographic details"));
}

#[test]
fn test_missing_snapshot_starts_empty() {
    let temp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.workspace = temp.path().to_path_buf();

    let index = load_index(&settings).unwrap();
    assert_eq!(index.stats().chunks, 0);
    assert_eq!(index.stats().dimension, settings.embedding.dimensions);
}
