//! Builds the final response from an arbitration decision.

use crate::types::{AnswerSource, ArbitrationDecision, ChatResponse, Chunk, SourceRef};
use chrono::Utc;
use mitra_core::{AppError, AppResult};

/// Output of the fallback step: the generated answer and the chunks that
/// were forwarded as context.
#[derive(Debug, Clone)]
pub struct FallbackOutput {
    pub answer: String,
    pub context: Vec<Chunk>,
}

/// Merge a decision and the optional fallback output into a [`ChatResponse`].
///
/// Accepted decisions answer with the chosen chunk verbatim. Rejected ones
/// require a fallback output; their confidence is the best rejected score,
/// never a model-reported value.
pub fn assemble(
    query: &str,
    decision: &ArbitrationDecision,
    fallback: Option<FallbackOutput>,
) -> AppResult<ChatResponse> {
    if decision.accepted {
        let chosen = decision.chosen.as_ref().ok_or_else(|| {
            AppError::Generation("Accepted decision carries no candidate".to_string())
        })?;

        return Ok(ChatResponse {
            query: query.to_string(),
            answer: chosen.chunk.text.clone(),
            source: AnswerSource::KnowledgeBase,
            grounding_chunk_ids: vec![chosen.chunk.id.clone()],
            sources: source_refs(std::slice::from_ref(&chosen.chunk)),
            confidence: Some(chosen.boosted_score),
            reason: decision.reason,
            timestamp: Utc::now(),
        });
    }

    let fallback = fallback.ok_or_else(|| {
        AppError::Generation("Rejected decision has no fallback answer".to_string())
    })?;

    Ok(ChatResponse {
        query: query.to_string(),
        answer: fallback.answer,
        source: AnswerSource::GenerativeFallback,
        grounding_chunk_ids: fallback.context.iter().map(|c| c.id.clone()).collect(),
        sources: source_refs(&fallback.context),
        confidence: decision.top_score,
        reason: decision.reason,
        timestamp: Utc::now(),
    })
}

/// Provenance of `chunks`, deduplicated by (document, page) in order.
fn source_refs(chunks: &[Chunk]) -> Vec<SourceRef> {
    let mut refs: Vec<SourceRef> = Vec::new();
    for chunk in chunks {
        let source = SourceRef {
            document: chunk.source.clone(),
            page: chunk.page,
        };
        if !refs.contains(&source) {
            refs.push(source);
        }
    }
    refs
}
