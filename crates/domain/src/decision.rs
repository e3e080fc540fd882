//! Router output: the intent decision.

use serde::{Deserialize, Serialize};

use crate::turn::FollowUpTag;

/// Well-known intents the router can emit. Intents are plain strings on the
/// wire; these constants cover the synthetic ones the core itself produces.
pub mod intent {
    pub const IDENTITY: &str = "identity";
    pub const FALLBACK_SEARCH: &str = "fallback_search";
    pub const BUILD_INSTRUCTIONS: &str = "build_instructions";
    pub const CODE_GENERATION: &str = "code_generation";
}

/// One candidate handler with the router score that put it on the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateHandler {
    pub handler_id: String,
    pub score: f64,
}

/// The feature vector behind a routing decision, recorded for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Which pipeline rule terminated classification
    /// (`identity_guard`, `affirmative_guard`, `keyword`, `fallback`).
    pub rule: String,
    /// Keywords that matched, per capability.
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    /// Raw per-capability scores before thresholding.
    #[serde(default)]
    pub capability_scores: Vec<(String, f64)>,
    #[serde(default)]
    pub context_boost: f64,
}

/// What the router decided for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDecision {
    pub primary_intent: String,
    /// Routing score in [0, 1]; not a calibrated probability.
    pub confidence: f64,
    /// Ordered candidate handlers, best first.
    pub candidates: Vec<CandidateHandler>,
    pub require_sandbox: bool,
    #[serde(default)]
    pub expected_response_tag: Option<FollowUpTag>,
    pub context_boost_applied: bool,
    pub features: FeatureVector,
}

impl IntentDecision {
    /// Router position of a handler in the candidate list, if present.
    pub fn candidate_position(&self, handler_id: &str) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c.handler_id == handler_id)
    }

    /// Router score for a handler, 0.0 when not a candidate.
    pub fn candidate_score(&self, handler_id: &str) -> f64 {
        self.candidates
            .iter()
            .find(|c| c.handler_id == handler_id)
            .map(|c| c.score)
            .unwrap_or(0.0)
    }

    pub fn candidate_ids(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.handler_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision() -> IntentDecision {
        IntentDecision {
            primary_intent: "finance".into(),
            confidence: 0.8,
            candidates: vec![
                CandidateHandler { handler_id: "fin".into(), score: 0.8 },
                CandidateHandler { handler_id: "search".into(), score: 0.4 },
            ],
            require_sandbox: false,
            expected_response_tag: None,
            context_boost_applied: false,
            features: FeatureVector::default(),
        }
    }

    #[test]
    fn candidate_lookup() {
        let d = decision();
        assert_eq!(d.candidate_position("search"), Some(1));
        assert_eq!(d.candidate_score("fin"), 0.8);
        assert_eq!(d.candidate_score("missing"), 0.0);
        assert!(d.candidate_position("missing").is_none());
    }

    #[test]
    fn candidate_ids_preserve_order() {
        assert_eq!(decision().candidate_ids(), vec!["fin", "search"]);
    }
}
