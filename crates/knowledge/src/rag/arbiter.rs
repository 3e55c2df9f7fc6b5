//! Confidence arbitration: answer from the knowledge base or fall back.

use crate::types::{ArbitrationDecision, ReasonCode, RetrievalCandidate};

/// Decide whether the best candidate is reliable enough to answer with.
///
/// The candidate with the highest boosted score is chosen (the first one
/// on ties, so ranked input keeps its order). The threshold is inclusive.
pub fn arbitrate(candidates: &[RetrievalCandidate], threshold: f32) -> ArbitrationDecision {
    let top = candidates.iter().fold(None, |best: Option<&RetrievalCandidate>, c| match best {
        Some(b) if b.boosted_score >= c.boosted_score => Some(b),
        _ => Some(c),
    });

    let Some(top) = top else {
        tracing::info!("No candidates retrieved; routing to fallback");
        return ArbitrationDecision {
            accepted: false,
            chosen: None,
            threshold,
            reason: ReasonCode::NoCandidates,
            top_score: None,
        };
    };

    let accepted = top.boosted_score >= threshold;
    tracing::info!(
        "Top score {:.3} vs threshold {:.3}: {}",
        top.boosted_score,
        threshold,
        if accepted { "accepted" } else { "rejected" }
    );

    ArbitrationDecision {
        accepted,
        chosen: accepted.then(|| top.clone()),
        threshold,
        reason: if accepted {
            ReasonCode::ThresholdMet
        } else {
            ReasonCode::BelowThreshold
        },
        top_score: Some(top.boosted_score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::candidate;

    #[test]
    fn test_empty_candidates_rejected() {
        let decision = arbitrate(&[], 0.8);
        assert!(!decision.accepted);
        assert!(decision.chosen.is_none());
        assert_eq!(decision.reason, ReasonCode::NoCandidates);
        assert_eq!(decision.top_score, None);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let decision = arbitrate(&[candidate("faq.txt", 0, 0.8, 0.8)], 0.8);
        assert!(decision.accepted);
        assert_eq!(decision.reason, ReasonCode::ThresholdMet);
    }

    #[test]
    fn test_just_below_threshold_rejected() {
        let decision = arbitrate(&[candidate("faq.txt", 0, 0.79, 0.79)], 0.8);
        assert!(!decision.accepted);
        assert!(decision.chosen.is_none());
        assert_eq!(decision.reason, ReasonCode::BelowThreshold);
        assert_eq!(decision.top_score, Some(0.79));
    }

    #[test]
    fn test_highest_boosted_candidate_chosen() {
        let candidates = vec![
            candidate("faq.txt", 0, 0.70, 0.70),
            candidate("faq.txt", 800, 0.72, 0.92),
            candidate("guide.txt", 0, 0.72, 0.92),
        ];
        let decision = arbitrate(&candidates, 0.8);

        let chosen = decision.chosen.unwrap();
        assert_eq!(chosen.chunk.document_id, "faq.txt");
        assert_eq!(chosen.chunk.offset, 800);
    }

    #[test]
    fn test_boosted_score_above_one_accepted() {
        let decision = arbitrate(&[candidate("faq.txt", 0, 0.95, 1.15)], 0.8);
        assert!(decision.accepted);
        assert_eq!(decision.top_score, Some(1.15));
    }
}
