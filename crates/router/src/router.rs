//! The ordered classification pipeline.

use regex::RegexSet;

use fame_domain::capability::Capability;
use fame_domain::config::RouterConfig;
use fame_domain::decision::{intent, CandidateHandler, FeatureVector, IntentDecision};
use fame_domain::query::Query;
use fame_domain::trace::TraceEvent;
use fame_domain::turn::{FollowUpTag, Turn, TurnRole};

use crate::keywords;
use crate::patterns;

/// Resolves capabilities to handler ids. Implemented over the plugin
/// registry by the orchestrator; tests use a plain map.
pub trait HandlerDirectory: Send + Sync {
    /// Handler ids serving a capability, best first.
    fn handlers_for(&self, capability: Capability) -> Vec<String>;
}

/// Synthetic handler id for the identity responder route.
pub const IDENTITY_HANDLER: &str = "identity";

/// Classifies queries into intent decisions.
pub struct IntentRouter {
    config: RouterConfig,
    identity: RegexSet,
}

impl IntentRouter {
    pub fn new(config: RouterConfig) -> IntentRouter {
        IntentRouter {
            config,
            identity: patterns::identity_patterns(),
        }
    }

    /// Run the pipeline. Rules are strictly ordered; the first that fires
    /// terminates classification.
    pub fn classify(
        &self,
        query: &Query,
        recent_turns: &[Turn],
        directory: &dyn HandlerDirectory,
    ) -> IntentDecision {
        let decision = self
            .identity_guard(query)
            .or_else(|| self.affirmative_guard(query, recent_turns, directory))
            .unwrap_or_else(|| self.keyword_classify(query, recent_turns, directory));

        TraceEvent::IntentClassified {
            query_id: query.id.clone(),
            intent: decision.primary_intent.clone(),
            confidence: decision.confidence,
            rule: decision.features.rule.clone(),
            candidates: decision.candidates.len(),
            context_boost_applied: decision.context_boost_applied,
        }
        .emit();

        decision
    }

    // ── Rule 1: identity guard ───────────────────────────────────────

    /// Self-referential queries route to the identity responder so they
    /// never get mis-classified as web searches.
    fn identity_guard(&self, query: &Query) -> Option<IntentDecision> {
        if !self.identity.is_match(&query.text) {
            return None;
        }
        Some(IntentDecision {
            primary_intent: intent::IDENTITY.to_owned(),
            confidence: self.config.guard_confidence,
            candidates: vec![CandidateHandler {
                handler_id: IDENTITY_HANDLER.to_owned(),
                score: self.config.guard_confidence,
            }],
            require_sandbox: false,
            expected_response_tag: None,
            context_boost_applied: false,
            features: FeatureVector {
                rule: "identity_guard".into(),
                ..FeatureVector::default()
            },
        })
    }

    // ── Rule 2: affirmative follow-up guard ──────────────────────────

    /// A short "yes"/"no" right after an assistant turn that expects a
    /// follow-up resolves to the tagged intent, regardless of what the
    /// surface form would otherwise classify as.
    fn affirmative_guard(
        &self,
        query: &Query,
        recent_turns: &[Turn],
        directory: &dyn HandlerDirectory,
    ) -> Option<IntentDecision> {
        let affirmative = patterns::is_affirmative(&query.text);
        let negative = patterns::is_negative(&query.text);
        if !affirmative && !negative {
            return None;
        }

        let last_assistant = recent_turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::Assistant)?;
        let tag = last_assistant.expected_follow_up;
        if tag.is_none() {
            return None;
        }

        if negative {
            // The user declined the offer; route to the identity responder
            // for a short acknowledgement instead of any fan-out.
            return Some(IntentDecision {
                primary_intent: "declined".to_owned(),
                confidence: self.config.guard_confidence,
                candidates: vec![CandidateHandler {
                    handler_id: IDENTITY_HANDLER.to_owned(),
                    score: self.config.guard_confidence,
                }],
                require_sandbox: false,
                expected_response_tag: None,
                context_boost_applied: false,
                features: FeatureVector {
                    rule: "affirmative_guard".into(),
                    ..FeatureVector::default()
                },
            });
        }

        let follow_up_intent = tag.intent()?.to_owned();
        let capability = follow_up_capability(tag);
        let candidates: Vec<CandidateHandler> = directory
            .handlers_for(capability)
            .into_iter()
            .map(|handler_id| CandidateHandler {
                handler_id,
                score: self.config.guard_confidence,
            })
            .collect();

        Some(IntentDecision {
            primary_intent: follow_up_intent,
            confidence: self.config.guard_confidence,
            require_sandbox: capability == Capability::CodeGeneration,
            expected_response_tag: None,
            context_boost_applied: true,
            candidates,
            features: FeatureVector {
                rule: "affirmative_guard".into(),
                context_boost: 0.0,
                ..FeatureVector::default()
            },
        })
    }

    // ── Rules 3–5: keyword classifier, context boost, thresholding ───

    fn keyword_classify(
        &self,
        query: &Query,
        recent_turns: &[Turn],
        directory: &dyn HandlerDirectory,
    ) -> IntentDecision {
        let keyword_scores = keywords::score(&query.text);
        let topic = recent_topic(recent_turns);

        // Apply the context boost to capabilities related to the recent topic.
        let mut scored: Vec<(Capability, f64)> = Vec::new();
        let mut boost_applied = false;
        for capability in Capability::ALL {
            let mut score = keyword_scores.score_of(*capability);
            if topic == Some(*capability) && score > 0.0 {
                score = (score + self.config.context_boost).min(1.0);
                boost_applied = true;
            }
            if score >= self.config.low_threshold {
                scored.push((*capability, score));
            }
        }
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.as_str().cmp(b.0.as_str()))
        });

        let features = FeatureVector {
            rule: "keyword".into(),
            matched_keywords: keyword_scores.matched_keywords(),
            capability_scores: scored
                .iter()
                .map(|(c, s)| (c.as_str().to_owned(), *s))
                .collect(),
            context_boost: if boost_applied {
                self.config.context_boost
            } else {
                0.0
            },
        };

        // Expand capabilities to handlers, keeping the best score per
        // handler and capping at the configured candidate budget.
        let mut candidates: Vec<CandidateHandler> = Vec::new();
        for (capability, score) in &scored {
            for handler_id in directory.handlers_for(*capability) {
                if candidates.len() >= self.config.max_candidates {
                    break;
                }
                if !candidates.iter().any(|c| c.handler_id == handler_id) {
                    candidates.push(CandidateHandler {
                        handler_id,
                        score: *score,
                    });
                }
            }
        }

        if candidates.is_empty() {
            // Rule 5 fallback: nothing cleared the threshold (or nothing
            // serves the matched capabilities) — aggregate web search.
            let fallback_candidates: Vec<CandidateHandler> = directory
                .handlers_for(Capability::WebSearch)
                .into_iter()
                .map(|handler_id| CandidateHandler {
                    handler_id,
                    score: 0.0,
                })
                .collect();
            return IntentDecision {
                primary_intent: intent::FALLBACK_SEARCH.to_owned(),
                confidence: 0.2,
                candidates: fallback_candidates,
                require_sandbox: false,
                expected_response_tag: None,
                context_boost_applied: false,
                features: FeatureVector {
                    rule: "fallback".into(),
                    matched_keywords: keyword_scores.matched_keywords(),
                    ..FeatureVector::default()
                },
            };
        }

        let (top_capability, top_score) = scored[0];
        IntentDecision {
            primary_intent: top_capability.as_str().to_owned(),
            confidence: top_score,
            require_sandbox: top_capability == Capability::CodeGeneration,
            expected_response_tag: None,
            context_boost_applied: boost_applied,
            candidates,
            features,
        }
    }
}

/// The capability a follow-up tag resolves to.
fn follow_up_capability(tag: FollowUpTag) -> Capability {
    match tag {
        FollowUpTag::BuildInstructions | FollowUpTag::CodeGeneration => {
            Capability::CodeGeneration
        }
        FollowUpTag::WebSearch => Capability::WebSearch,
        FollowUpTag::Finance => Capability::Finance,
        FollowUpTag::None => Capability::Utility,
    }
}

/// A coherent topic carried by the recent turns, if any: the most recent
/// turn with a recorded intent or a follow-up tag wins.
fn recent_topic(recent_turns: &[Turn]) -> Option<Capability> {
    for turn in recent_turns.iter().rev() {
        if !turn.expected_follow_up.is_none() {
            return Some(follow_up_capability(turn.expected_follow_up));
        }
        if let Some(intent) = &turn.intent {
            if let Some(capability) = Capability::parse(intent) {
                return Some(capability);
            }
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapDirectory(HashMap<Capability, Vec<String>>);

    impl HandlerDirectory for MapDirectory {
        fn handlers_for(&self, capability: Capability) -> Vec<String> {
            self.0.get(&capability).cloned().unwrap_or_default()
        }
    }

    fn directory() -> MapDirectory {
        MapDirectory(HashMap::from([
            (Capability::Finance, vec!["finance".to_owned()]),
            (Capability::WebSearch, vec!["web_search".to_owned()]),
            (Capability::CodeGeneration, vec!["codegen".to_owned()]),
            (Capability::Utility, vec!["clock".to_owned()]),
            (Capability::Identity, vec!["identity".to_owned()]),
        ]))
    }

    fn query(text: &str) -> Query {
        Query::accept(
            fame_domain::query::QueryEnvelope {
                text: text.into(),
                session_id: Some("s1".into()),
                source: fame_domain::query::QuerySource::Text,
                metadata: HashMap::new(),
                deadline_ms: None,
            },
            60_000,
        )
    }

    fn router() -> IntentRouter {
        IntentRouter::new(RouterConfig::default())
    }

    #[test]
    fn identity_guard_wins_over_keywords() {
        // "what can you do" contains "what is"-adjacent search phrasing;
        // the guard must still claim it.
        let d = router().classify(&query("what can you do?"), &[], &directory());
        assert_eq!(d.primary_intent, "identity");
        assert!(d.confidence >= 0.9);
        assert_eq!(d.candidates.len(), 1);
        assert_eq!(d.candidates[0].handler_id, IDENTITY_HANDLER);
        assert_eq!(d.features.rule, "identity_guard");
    }

    #[test]
    fn identity_never_routes_web_search() {
        let probes = [
            "who are you?",
            "can you modify your own code?",
            "are you an AI",
            "tell me about yourself",
        ];
        for probe in probes {
            let d = router().classify(&query(probe), &[], &directory());
            assert!(
                d.candidates.iter().all(|c| c.handler_id != "web_search"),
                "{probe} routed to web search"
            );
        }
    }

    #[test]
    fn affirmative_resolves_follow_up() {
        let turns = vec![
            Turn::user("help me build a python wifi scanner exe", None),
            Turn::assistant(
                "I can put together build instructions. Want me to?",
                FollowUpTag::BuildInstructions,
            ),
        ];
        let d = router().classify(&query("yes"), &turns, &directory());
        assert_eq!(d.primary_intent, "build_instructions");
        assert!(d.confidence >= 0.95);
        assert!(d.require_sandbox);
        assert!(d.candidates.iter().all(|c| c.handler_id != "web_search"));
        assert_eq!(d.candidates[0].handler_id, "codegen");
    }

    #[test]
    fn affirmative_without_pending_tag_falls_through() {
        let turns = vec![Turn::assistant("hello!", FollowUpTag::None)];
        let d = router().classify(&query("yes"), &turns, &directory());
        // No tag to resolve — a bare "yes" carries no keywords either, so
        // it lands in fallback search.
        assert_eq!(d.primary_intent, "fallback_search");
    }

    #[test]
    fn negative_declines_without_fanout() {
        let turns = vec![Turn::assistant(
            "Want me to write that script?",
            FollowUpTag::CodeGeneration,
        )];
        let d = router().classify(&query("no thanks"), &turns, &directory());
        assert_eq!(d.primary_intent, "declined");
        assert_eq!(d.candidates[0].handler_id, IDENTITY_HANDLER);
    }

    #[test]
    fn keyword_classification_orders_candidates() {
        let d = router().classify(
            &query("what is the bitcoin price"),
            &[],
            &directory(),
        );
        assert_eq!(d.primary_intent, "finance");
        assert_eq!(d.candidates[0].handler_id, "finance");
        assert!(d.candidates.iter().any(|c| c.handler_id == "web_search"));
        assert_eq!(d.features.rule, "keyword");
    }

    #[test]
    fn context_boost_applies_to_topic_capability() {
        let turns = vec![
            Turn::user("write a python script for me", Some("code_generation".into())),
            Turn::assistant("sure, what should it do?", FollowUpTag::CodeGeneration),
        ];
        let boosted = router().classify(&query("generate it"), &turns, &directory());
        assert!(boosted.context_boost_applied);

        let unboosted = router().classify(&query("generate it"), &[], &directory());
        assert!(boosted.confidence > unboosted.confidence);
    }

    #[test]
    fn no_keywords_falls_back_to_search() {
        let d = router().classify(&query("mmm pancakes"), &[], &directory());
        assert_eq!(d.primary_intent, "fallback_search");
        assert_eq!(d.candidates.len(), 1);
        assert_eq!(d.candidates[0].handler_id, "web_search");
        assert_eq!(d.features.rule, "fallback");
    }

    #[test]
    fn candidate_budget_is_respected() {
        let config = RouterConfig {
            max_candidates: 1,
            ..RouterConfig::default()
        };
        let router = IntentRouter::new(config);
        let d = router.classify(&query("what is the bitcoin price"), &[], &directory());
        assert_eq!(d.candidates.len(), 1);
    }
}
