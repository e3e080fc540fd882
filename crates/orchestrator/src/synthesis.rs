//! Confidence-weighted response synthesis.

use chrono::Utc;

use fame_domain::capability::Capability;
use fame_domain::decision::{intent, IntentDecision};
use fame_domain::query::Query;
use fame_domain::response::{HandlerError, Response};
use fame_domain::result::{ErrorKind, HandlerResult};
use fame_domain::sandbox::SandboxReport;
use fame_domain::trace::TraceEvent;
use fame_domain::turn::FollowUpTag;

/// Composite score weights: handler confidence dominates, the router's
/// candidate score seconds it, source quality breaks near-ties.
const W_HANDLER: f64 = 0.6;
const W_ROUTER: f64 = 0.3;
const W_SOURCE: f64 = 0.1;

/// Standard prefix for sub-floor answers.
const UNCERTAINTY_PREFIX: &str = "I'm not fully confident in this answer. ";

/// Everything the synthesizer needs for one query.
pub struct SynthesisInput<'a> {
    pub query: &'a Query,
    pub decision: &'a IntentDecision,
    pub results: &'a [HandlerResult],
    /// Report from running the winner's code artifact, if any.
    pub sandbox_report: Option<SandboxReport>,
    /// Extra errors the orchestrator collected (e.g. a failed sandbox run).
    pub extra_errors: Vec<HandlerError>,
    /// Resolves a handler id to its primary capability.
    pub capability_of: &'a (dyn Fn(&str) -> Option<Capability> + Send + Sync),
}

/// Merges handler results into the one response a query gets.
pub struct Synthesizer {
    floor: f64,
}

impl Synthesizer {
    pub fn new(floor: f64) -> Synthesizer {
        Synthesizer { floor }
    }

    /// Index of the winning result among `results`, by composite score.
    ///
    /// Deterministic tie-breaks: higher handler confidence, then earlier
    /// router candidate position, then alphabetical handler id.
    pub fn pick_winner(
        &self,
        results: &[HandlerResult],
        decision: &IntentDecision,
        capability_of: &(dyn Fn(&str) -> Option<Capability> + Send + Sync),
    ) -> Option<usize> {
        let mut retained: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.ok)
            .map(|(i, _)| i)
            .collect();
        if retained.is_empty() {
            return None;
        }

        // The identity responder wins unconditionally when present.
        if let Some(identity) = retained.iter().copied().find(|i| {
            capability_of(&results[*i].handler_id) == Some(Capability::Identity)
        }) {
            return Some(identity);
        }

        retained.sort_by(|a, b| {
            let ra = &results[*a];
            let rb = &results[*b];
            let ca = self.composite(ra, decision, capability_of);
            let cb = self.composite(rb, decision, capability_of);
            cb.partial_cmp(&ca)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    rb.confidence
                        .partial_cmp(&ra.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then_with(|| {
                    let pa = decision
                        .candidate_position(&ra.handler_id)
                        .unwrap_or(usize::MAX);
                    let pb = decision
                        .candidate_position(&rb.handler_id)
                        .unwrap_or(usize::MAX);
                    pa.cmp(&pb)
                })
                .then_with(|| ra.handler_id.cmp(&rb.handler_id))
        });
        Some(retained[0])
    }

    fn composite(
        &self,
        result: &HandlerResult,
        decision: &IntentDecision,
        capability_of: &(dyn Fn(&str) -> Option<Capability> + Send + Sync),
    ) -> f64 {
        let source_quality = capability_of(&result.handler_id)
            .map(|c| c.source_quality())
            .unwrap_or(0.5);
        W_HANDLER * result.confidence
            + W_ROUTER * decision.candidate_score(&result.handler_id)
            + W_SOURCE * source_quality
    }

    /// Produce the response.
    pub fn synthesize(&self, input: SynthesisInput<'_>) -> Response {
        let query = input.query;
        let decision = input.decision;

        let mut errors: Vec<HandlerError> = input
            .results
            .iter()
            .filter(|r| !r.ok)
            .map(|r| HandlerError {
                handler_id: r.handler_id.clone(),
                kind: r.error_kind.unwrap_or(ErrorKind::Exception),
            })
            .collect();
        // Provider-level errors reported inside an aggregator's payload
        // surface in the envelope too.
        for result in input.results {
            collect_nested_errors(result, &mut errors);
        }
        errors.extend(input.extra_errors);

        let winner_index =
            self.pick_winner(input.results, decision, input.capability_of);

        let Some(winner_index) = winner_index else {
            // Every handler failed.
            let mut response =
                Response::fallback(&query.id, &query.session_id, &decision.primary_intent, errors);
            response.sandbox_report = input.sandbox_report;
            self.trace(&response, None);
            return response;
        };
        let winner = &input.results[winner_index];

        let is_identity =
            (input.capability_of)(&winner.handler_id) == Some(Capability::Identity);
        let composite = self.composite(winner, decision, input.capability_of);
        let degraded = !is_identity && composite < self.floor;

        let text = if degraded {
            self.degraded_text(winner, input.results, winner_index)
        } else {
            winner.text.clone().unwrap_or_default()
        };

        let expected_response_tag = expected_tag(decision, winner);

        let response = Response {
            query_id: query.id.clone(),
            session_id: query.session_id.clone(),
            text,
            confidence: if is_identity {
                winner.confidence
            } else {
                composite.min(1.0)
            },
            intent: decision.primary_intent.clone(),
            expected_response_tag,
            partial: degraded,
            contributing_handlers: if degraded {
                contributing_for_degraded(input.results, winner_index)
            } else {
                vec![winner.handler_id.clone()]
            },
            errors,
            sandbox_report: input.sandbox_report,
            timestamp: Utc::now(),
        };
        self.trace(&response, Some(&winner.handler_id));
        response
    }

    /// Sub-floor output: the winner's text labelled low-confidence, with
    /// up to two other handlers' top lines as corroboration.
    fn degraded_text(
        &self,
        winner: &HandlerResult,
        results: &[HandlerResult],
        winner_index: usize,
    ) -> String {
        let mut text = format!(
            "{UNCERTAINTY_PREFIX}{}",
            winner.text.clone().unwrap_or_default()
        );
        let corroborating: Vec<String> = results
            .iter()
            .enumerate()
            .filter(|(i, r)| *i != winner_index && r.ok && r.text.is_some())
            .take(2)
            .map(|(_, r)| {
                let first_line = r
                    .text
                    .as_deref()
                    .unwrap_or_default()
                    .lines()
                    .next()
                    .unwrap_or_default();
                format!("- {} ({})", first_line, r.handler_id)
            })
            .collect();
        if !corroborating.is_empty() {
            text.push_str("\n\nOther sources said:\n");
            text.push_str(&corroborating.join("\n"));
        }
        text
    }

    fn trace(&self, response: &Response, winner: Option<&str>) {
        TraceEvent::ResponseSynthesized {
            query_id: response.query_id.clone(),
            winner: winner.map(str::to_owned),
            confidence: response.confidence,
            partial: response.partial,
        }
        .emit();
    }
}

fn contributing_for_degraded(results: &[HandlerResult], winner_index: usize) -> Vec<String> {
    let mut contributing = vec![results[winner_index].handler_id.clone()];
    contributing.extend(
        results
            .iter()
            .enumerate()
            .filter(|(i, r)| *i != winner_index && r.ok && r.text.is_some())
            .take(2)
            .map(|(_, r)| r.handler_id.clone()),
    );
    contributing
}

/// Pull `structured.provider_errors` entries up into the envelope.
fn collect_nested_errors(result: &HandlerResult, errors: &mut Vec<HandlerError>) {
    let Some(nested) = result
        .structured
        .as_ref()
        .and_then(|s| s.get("provider_errors"))
        .and_then(|v| v.as_array())
    else {
        return;
    };
    for entry in nested {
        let Some(handler_id) = entry.get("handler_id").and_then(|v| v.as_str()) else {
            continue;
        };
        let kind = entry
            .get("kind")
            .and_then(|v| serde_json::from_value::<ErrorKind>(v.clone()).ok())
            .unwrap_or(ErrorKind::Exception);
        errors.push(HandlerError {
            handler_id: handler_id.to_owned(),
            kind,
        });
    }
}

/// Preset intent → expected-follow-up mapping. A winner can override it
/// by declaring `structured.offer_tag`.
fn expected_tag(decision: &IntentDecision, winner: &HandlerResult) -> Option<FollowUpTag> {
    if let Some(tag) = winner
        .structured
        .as_ref()
        .and_then(|s| s.get("offer_tag"))
        .and_then(|v| serde_json::from_value::<FollowUpTag>(v.clone()).ok())
    {
        return Some(tag);
    }
    match decision.primary_intent.as_str() {
        intent::CODE_GENERATION => Some(FollowUpTag::CodeGeneration),
        _ => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use fame_domain::decision::{CandidateHandler, FeatureVector};
    use fame_domain::query::{QueryEnvelope, QuerySource};
    use std::collections::HashMap;

    fn query() -> Query {
        Query::accept(
            QueryEnvelope {
                text: "test".into(),
                session_id: Some("s1".into()),
                source: QuerySource::Text,
                metadata: HashMap::new(),
                deadline_ms: None,
            },
            60_000,
        )
    }

    fn decision(intent: &str, candidates: &[(&str, f64)]) -> IntentDecision {
        IntentDecision {
            primary_intent: intent.into(),
            confidence: candidates.first().map(|c| c.1).unwrap_or(0.0),
            candidates: candidates
                .iter()
                .map(|(id, score)| CandidateHandler {
                    handler_id: (*id).to_owned(),
                    score: *score,
                })
                .collect(),
            require_sandbox: false,
            expected_response_tag: None,
            context_boost_applied: false,
            features: FeatureVector::default(),
        }
    }

    fn caps<'a>(map: &'a [(&'a str, Capability)]) -> impl Fn(&str) -> Option<Capability> + 'a {
        move |id: &str| map.iter().find(|(h, _)| *h == id).map(|(_, c)| *c)
    }

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(0.30)
    }

    #[test]
    fn highest_composite_wins() {
        let q = query();
        let d = decision("finance", &[("fin", 0.8), ("search", 0.4)]);
        let results = vec![
            HandlerResult::success("fin", "stocks are up", 0.9),
            HandlerResult::success("search", "some snippet", 0.6),
        ];
        let lookup = caps(&[
            ("fin", Capability::Finance),
            ("search", Capability::WebSearch),
        ]);
        let response = synthesizer().synthesize(SynthesisInput {
            query: &q,
            decision: &d,
            results: &results,
            sandbox_report: None,
            extra_errors: Vec::new(),
            capability_of: &lookup,
        });

        assert_eq!(response.contributing_handlers, vec!["fin"]);
        assert_eq!(response.text, "stocks are up");
        assert!(!response.partial);
        assert!(response.confidence > 0.7);
    }

    #[test]
    fn identity_wins_unconditionally() {
        let q = query();
        let d = decision("identity", &[("identity", 0.95), ("search", 0.9)]);
        let results = vec![
            HandlerResult::success("search", "a very confident snippet", 1.0),
            HandlerResult::success("identity", "I'm an assistant.", 0.7),
        ];
        let lookup = caps(&[
            ("identity", Capability::Identity),
            ("search", Capability::WebSearch),
        ]);
        let response = synthesizer().synthesize(SynthesisInput {
            query: &q,
            decision: &d,
            results: &results,
            sandbox_report: None,
            extra_errors: Vec::new(),
            capability_of: &lookup,
        });

        assert_eq!(response.contributing_handlers, vec!["identity"]);
        assert_eq!(response.text, "I'm an assistant.");
    }

    #[test]
    fn all_failed_yields_fallback() {
        let q = query();
        let d = decision("finance", &[("fin", 0.8)]);
        let results = vec![HandlerResult::failed("fin", ErrorKind::Timeout)];
        let lookup = caps(&[("fin", Capability::Finance)]);
        let response = synthesizer().synthesize(SynthesisInput {
            query: &q,
            decision: &d,
            results: &results,
            sandbox_report: None,
            extra_errors: Vec::new(),
            capability_of: &lookup,
        });

        assert!(response.partial);
        assert_eq!(response.confidence, 0.0);
        assert!(response.contributing_handlers.is_empty());
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].kind, ErrorKind::Timeout);
    }

    #[test]
    fn sub_floor_winner_degrades_gracefully() {
        let q = query();
        let d = decision("finance", &[("fin", 0.1), ("search", 0.1), ("memo", 0.1)]);
        let results = vec![
            HandlerResult::success("fin", "maybe up?\nmore detail", 0.2),
            HandlerResult::success("search", "markets mixed today\nsecond line", 0.1),
            HandlerResult::success("memo", "you asked this before", 0.05),
        ];
        let lookup = caps(&[
            ("fin", Capability::Finance),
            ("search", Capability::WebSearch),
            ("memo", Capability::Memory),
        ]);
        let response = synthesizer().synthesize(SynthesisInput {
            query: &q,
            decision: &d,
            results: &results,
            sandbox_report: None,
            extra_errors: Vec::new(),
            capability_of: &lookup,
        });

        assert!(response.partial);
        assert!(response.text.starts_with(UNCERTAINTY_PREFIX));
        assert!(response.text.contains("markets mixed today"));
        assert!(response.text.contains("you asked this before"));
        // Corroborating lines are first lines only.
        assert!(!response.text.contains("second line"));
        assert_eq!(response.contributing_handlers.len(), 3);
    }

    #[test]
    fn deterministic_tie_breaks() {
        let q = query();
        // Same confidence, same router score, same capability — the
        // alphabetical id must win.
        let d = decision("utility", &[("zeta", 0.5), ("alpha", 0.5)]);
        let results = vec![
            HandlerResult::success("zeta", "z", 0.5),
            HandlerResult::success("alpha", "a", 0.5),
        ];
        let lookup = caps(&[
            ("zeta", Capability::Utility),
            ("alpha", Capability::Utility),
        ]);
        // Position tie-break fires first: zeta is candidate 0.
        let winner = synthesizer()
            .pick_winner(&results, &d, &lookup)
            .unwrap();
        assert_eq!(results[winner].handler_id, "zeta");

        // With equal positions gone (neither listed), alphabetical wins.
        let d2 = decision("utility", &[]);
        let winner2 = synthesizer()
            .pick_winner(&results, &d2, &lookup)
            .unwrap();
        assert_eq!(results[winner2].handler_id, "alpha");
    }

    #[test]
    fn code_generation_sets_expected_tag() {
        let q = query();
        let d = decision(intent::CODE_GENERATION, &[("codegen", 0.9)]);
        let results = vec![HandlerResult::success("codegen", "here's the script", 0.9)];
        let lookup = caps(&[("codegen", Capability::CodeGeneration)]);
        let response = synthesizer().synthesize(SynthesisInput {
            query: &q,
            decision: &d,
            results: &results,
            sandbox_report: None,
            extra_errors: Vec::new(),
            capability_of: &lookup,
        });
        assert_eq!(
            response.expected_response_tag,
            Some(FollowUpTag::CodeGeneration)
        );
    }

    #[test]
    fn offer_tag_overrides_preset() {
        let q = query();
        let d = decision(intent::CODE_GENERATION, &[("codegen", 0.9)]);
        let results = vec![HandlerResult::success(
            "codegen",
            "I can write build instructions for that. Want me to?",
            0.9,
        )
        .with_structured(serde_json::json!({"offer_tag": "build_instructions"}))];
        let lookup = caps(&[("codegen", Capability::CodeGeneration)]);
        let response = synthesizer().synthesize(SynthesisInput {
            query: &q,
            decision: &d,
            results: &results,
            sandbox_report: None,
            extra_errors: Vec::new(),
            capability_of: &lookup,
        });
        assert_eq!(
            response.expected_response_tag,
            Some(FollowUpTag::BuildInstructions)
        );
    }

    #[test]
    fn nested_provider_errors_surface() {
        let q = query();
        let d = decision("fallback_search", &[("web_search", 0.2)]);
        let results = vec![HandlerResult::success("web_search", "merged results", 0.6)
            .with_structured(serde_json::json!({
                "provider_errors": [{"handler_id": "provider-2", "kind": "timeout"}]
            }))];
        let lookup = caps(&[("web_search", Capability::WebSearch)]);
        let response = synthesizer().synthesize(SynthesisInput {
            query: &q,
            decision: &d,
            results: &results,
            sandbox_report: None,
            extra_errors: Vec::new(),
            capability_of: &lookup,
        });

        assert!(response
            .errors
            .iter()
            .any(|e| e.handler_id == "provider-2" && e.kind == ErrorKind::Timeout));
        // Errors alone don't make the response partial.
        assert!(!response.partial);
    }
}
