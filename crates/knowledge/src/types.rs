//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use mitra_core::SimilarityMetric;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable source text with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Deterministic identifier: the source name, plus `#p<page>` for paged sources
    pub id: String,

    /// Source name (file name or path)
    pub source: String,

    /// 1-based page number, when the source is paged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    pub text: String,
}

impl Document {
    /// Create an unpaged document.
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            id: source.clone(),
            source,
            page: None,
            text: text.into(),
        }
    }

    /// Create a document for a single page of a paged source.
    pub fn with_page(source: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            id: format!("{}#p{}", source, page),
            source,
            page: Some(page),
            text: text.into(),
        }
    }
}

/// A contiguous, possibly overlapping slice of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Content-derived identifier, stable across runs
    pub id: String,

    /// Parent document id
    pub document_id: String,

    /// Source name, copied from the document for provenance
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// 0-based index within the document
    pub position: u32,

    /// Character offset of the first character within the document
    pub offset: usize,

    pub text: String,
}

/// One scored search hit for a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,

    /// Raw similarity reported by the index
    pub similarity: f32,

    /// Similarity plus the exact-match bonus, if earned. Can exceed 1.0.
    pub boosted_score: f32,

    /// Whether the query text occurs verbatim (case-insensitive) in the chunk
    pub exact_match: bool,
}

/// Why the arbiter decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    NoCandidates,
    ThresholdMet,
    BelowThreshold,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCandidates => "no_candidates",
            Self::ThresholdMet => "threshold_met",
            Self::BelowThreshold => "below_threshold",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of confidence arbitration for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrationDecision {
    pub accepted: bool,

    /// The accepted candidate; `None` when rejected
    pub chosen: Option<RetrievalCandidate>,

    /// Threshold the decision was made against
    pub threshold: f32,

    pub reason: ReasonCode,

    /// Boosted score of the best candidate, accepted or not
    pub top_score: Option<f32>,
}

/// Speech-to-text output, before gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfidenceResult {
    pub transcript: String,

    /// Transcription confidence in [0, 1]
    pub confidence: f32,

    pub duration_seconds: f64,

    /// Format tag, e.g. "wav"
    pub format: String,
}

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    KnowledgeBase,
    GenerativeFallback,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KnowledgeBase => "knowledge_base",
            Self::GenerativeFallback => "generative_fallback",
        }
    }
}

/// Human-readable provenance of a grounding chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "{}, page {}", self.document, page),
            None => f.write_str(&self.document),
        }
    }
}

/// Final answer returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The text query that was answered (the transcript for audio input)
    pub query: String,

    pub answer: String,

    pub source: AnswerSource,

    /// Chunks the answer is grounded on; may be empty for fallback answers
    pub grounding_chunk_ids: Vec<String>,

    /// Provenance of the grounding chunks, deduplicated
    pub sources: Vec<SourceRef>,

    /// Retrieval score behind the answer. For fallback answers this is the
    /// best rejected score, kept for diagnostics; it is never the model's
    /// own confidence.
    pub confidence: Option<f32>,

    /// Arbitration reason code
    pub reason: ReasonCode,

    pub timestamp: DateTime<Utc>,
}

/// Statistics from an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub documents: u32,

    /// Chunks that were not in the index before
    pub chunks_added: u32,

    /// Chunks whose id was already indexed (re-ingestion)
    pub chunks_unchanged: u32,

    /// Chunks that embedded to a zero vector and were left out
    pub chunks_skipped: u32,

    /// Chunks of a previous version of the document that no longer exist
    pub chunks_removed: u32,

    pub bytes_processed: u64,

    pub duration_secs: f64,
}

impl IngestStats {
    /// Add another run's counts. Duration is left to the caller.
    pub fn merge(&mut self, other: &IngestStats) {
        self.documents += other.documents;
        self.chunks_added += other.chunks_added;
        self.chunks_unchanged += other.chunks_unchanged;
        self.chunks_skipped += other.chunks_skipped;
        self.chunks_removed += other.chunks_removed;
        self.bytes_processed += other.bytes_processed;
    }
}

/// Statistics for a vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub metric: SimilarityMetric,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_ids_are_deterministic() {
        assert_eq!(Document::new("faq.txt", "x").id, "faq.txt");
        assert_eq!(Document::with_page("guide.pdf", 3, "x").id, "guide.pdf#p3");
    }

    #[test]
    fn test_reason_and_source_serialize_as_codes() {
        assert_eq!(
            serde_json::to_string(&ReasonCode::BelowThreshold).unwrap(),
            "\"below_threshold\""
        );
        assert_eq!(
            serde_json::to_string(&AnswerSource::GenerativeFallback).unwrap(),
            "\"generative_fallback\""
        );
        assert_eq!(AnswerSource::KnowledgeBase.as_str(), "knowledge_base");
    }

    #[test]
    fn test_source_ref_display() {
        let paged = SourceRef {
            document: "handbook.pdf".to_string(),
            page: Some(2),
        };
        assert_eq!(paged.to_string(), "handbook.pdf, page 2");
    }
}
