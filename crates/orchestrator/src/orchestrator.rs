//! The per-request state machine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use fame_domain::capability::Capability;
use fame_domain::config::Config;
use fame_domain::decision::{intent, CandidateHandler, IntentDecision};
use fame_domain::query::{Query, QueryEnvelope};
use fame_domain::response::{HandlerError, Response};
use fame_domain::result::{ErrorKind, HandlerResult};
use fame_domain::trace::TraceEvent;
use fame_domain::turn::{FollowUpTag, Turn};
use fame_fanout::{query_hash, FanoutEngine, FanoutTask, SingleFlight};
use fame_metrics::Metrics;
use fame_plugins::{HandlerRequest, PluginRegistry};
use fame_router::{HandlerDirectory, IntentRouter};
use fame_safety::{GateStage, SafetyGate};
use fame_sandbox::SandboxExecutor;
use fame_sessions::SessionStore;

use crate::synthesis::{SynthesisInput, Synthesizer};

/// Floor for the fan-out deadline when most of the request budget is
/// already spent.
const MIN_DISPATCH_BUDGET_MS: u64 = 50;

/// Scheduling slack granted past the request deadline before the timeout
/// response fires. The fan-out already enforces the deadline proper; this
/// only covers synthesis and session recording.
const DEADLINE_SLACK_MS: u64 = 250;

/// Adapts the plugin registry to the router's directory seam.
struct RegistryDirectory(Arc<PluginRegistry>);

impl HandlerDirectory for RegistryDirectory {
    fn handlers_for(&self, capability: Capability) -> Vec<String> {
        self.0
            .find_by_capability(capability)
            .into_iter()
            .map(|d| d.id)
            .collect()
    }
}

/// Owns the request lifecycle and the shared subsystems.
///
/// One instance serves the whole process; every dependency is injected so
/// tests can assemble a private orchestrator.
pub struct Orchestrator {
    config: Arc<Config>,
    registry: Arc<PluginRegistry>,
    gate: Arc<SafetyGate>,
    sessions: Arc<SessionStore>,
    sandbox: Arc<dyn SandboxExecutor>,
    router: IntentRouter,
    engine: FanoutEngine,
    synthesizer: Synthesizer,
    metrics: Arc<Metrics>,
    single_flight: SingleFlight<Arc<Vec<HandlerResult>>>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<PluginRegistry>,
        gate: Arc<SafetyGate>,
        sessions: Arc<SessionStore>,
        sandbox: Arc<dyn SandboxExecutor>,
        metrics: Arc<Metrics>,
    ) -> Orchestrator {
        let router = IntentRouter::new(config.router.clone());
        let synthesizer = Synthesizer::new(config.router.synthesis_floor);
        let single_flight =
            SingleFlight::new(Duration::from_millis(config.fanout.single_flight_window_ms));
        Orchestrator {
            config,
            registry,
            gate,
            sessions,
            sandbox,
            router,
            engine: FanoutEngine::new(),
            synthesizer,
            metrics,
            single_flight,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &Arc<SafetyGate> {
        &self.gate
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Drive one query to exactly one response.
    ///
    /// Never returns an error: handler failures are captured into the
    /// response, the request deadline produces a timeout response naming
    /// the in-flight stage, and a panic anywhere in the pipeline collapses
    /// to the canonical internal-error response with an incident id.
    pub async fn handle_query(
        &self,
        envelope: QueryEnvelope,
        cancel: CancellationToken,
    ) -> Response {
        let default_deadline_ms = self.config.fanout.query_timeout_secs * 1_000;
        let query = Query::accept(envelope, default_deadline_ms);
        let _active = self.metrics.request_started();
        self.metrics.record_stage("accepted");
        TraceEvent::QueryAccepted {
            query_id: query.id.clone(),
            session_id: query.session_id.clone(),
            source: format!("{:?}", query.source).to_lowercase(),
            deadline_ms: query.deadline_ms,
        }
        .emit();

        let stage: Arc<Mutex<&'static str>> = Arc::new(Mutex::new("classify"));
        let deadline = Duration::from_millis(query.deadline_ms + DEADLINE_SLACK_MS);

        let work = {
            let stage = stage.clone();
            let query = query.clone();
            let cancel = cancel.clone();
            async move { self.process(&query, cancel, &stage).await }
        };

        let response = match tokio::time::timeout(
            deadline,
            std::panic::AssertUnwindSafe(work).catch_unwind(),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(_panic)) => {
                let incident_id = uuid::Uuid::new_v4().to_string();
                tracing::error!(
                    query_id = %query.id,
                    incident_id = %incident_id,
                    stage = *stage.lock(),
                    "request pipeline panicked"
                );
                self.metrics.record_stage("failed");
                Response::internal_error(&query.id, &query.session_id, &incident_id)
            }
            Err(_elapsed) => {
                let in_flight = *stage.lock();
                tracing::warn!(
                    query_id = %query.id,
                    stage = in_flight,
                    deadline_ms = query.deadline_ms,
                    "request deadline expired"
                );
                self.metrics.record_stage("failed");
                Response::deadline_expired(&query.id, &query.session_id, in_flight)
            }
        };

        self.metrics.record_response(response.partial);
        self.metrics.record_stage("responded");
        response
    }

    // ── Pipeline ─────────────────────────────────────────────────────

    async fn process(
        &self,
        query: &Query,
        cancel: CancellationToken,
        stage: &Mutex<&'static str>,
    ) -> Response {
        // Classified.
        let recent = self
            .sessions
            .recent(&query.session_id, self.config.sessions.max_turns);
        let directory = RegistryDirectory(self.registry.clone());
        let mut decision = self.router.classify(query, &recent, &directory);
        self.metrics.record_stage("classified");

        // Gated: filter candidates, falling back to aggregate search when
        // the gate empties the set.
        *stage.lock() = "gate";
        self.filter_candidates(&mut decision, query);
        if decision.candidates.is_empty()
            && decision.primary_intent != intent::FALLBACK_SEARCH
        {
            tracing::info!(
                query_id = %query.id,
                intent = %decision.primary_intent,
                "candidate set empty after gating, falling back to search"
            );
            decision.primary_intent = intent::FALLBACK_SEARCH.to_owned();
            decision.confidence = 0.2;
            decision.candidates = directory
                .handlers_for(Capability::WebSearch)
                .into_iter()
                .map(|handler_id| CandidateHandler {
                    handler_id,
                    score: 0.0,
                })
                .collect();
            self.filter_candidates(&mut decision, query);
        }
        self.metrics.record_stage("gated");

        if cancel.is_cancelled() {
            return Response::cancelled(&query.id, &query.session_id);
        }

        // Dispatched. Identical fallback fan-outs inside the window share
        // one execution.
        *stage.lock() = "dispatch";
        let dispatch_budget = self.remaining_budget(query);
        let results: Arc<Vec<HandlerResult>> =
            if decision.primary_intent == intent::FALLBACK_SEARCH {
                let key = query_hash(&query.text);
                let decision_ref = &decision;
                let dispatch_cancel = cancel.clone();
                self.single_flight
                    .run(key, || async move {
                        Arc::new(
                            self.dispatch(query, decision_ref, dispatch_budget, &dispatch_cancel)
                                .await,
                        )
                    })
                    .await
            } else {
                Arc::new(
                    self.dispatch(query, &decision, dispatch_budget, &cancel)
                        .await,
                )
            };
        self.metrics.record_stage("dispatched");

        let was_cancelled = cancel.is_cancelled();

        // Sandbox the winner's code artifact when required.
        *stage.lock() = "sandbox";
        let capability_of = |id: &str| self.primary_capability(id);
        let (sandbox_report, extra_errors) = self
            .run_winner_sandbox(&results, &decision, &capability_of)
            .await;

        // Synthesized.
        *stage.lock() = "synthesize";
        let mut response = self.synthesizer.synthesize(SynthesisInput {
            query,
            decision: &decision,
            results: &results,
            sandbox_report,
            extra_errors,
            capability_of: &capability_of,
        });
        if was_cancelled {
            if response.contributing_handlers.is_empty() {
                return Response::cancelled(&query.id, &query.session_id);
            }
            response.partial = true;
        }
        self.metrics.record_stage("synthesized");

        // Recorded: user turn first, then the assistant turn carrying the
        // expected-follow-up tag for the next classification.
        *stage.lock() = "record";
        self.sessions.append(
            &query.session_id,
            Turn::user(query.text.clone(), Some(decision.primary_intent.clone())),
        );
        self.sessions.append(
            &query.session_id,
            Turn::assistant(
                response.text.clone(),
                response.expected_response_tag.unwrap_or(FollowUpTag::None),
            ),
        );
        self.metrics.record_stage("recorded");

        response
    }

    /// Remove candidates the safety gate refuses, and candidates no
    /// registered handler backs.
    fn filter_candidates(&self, decision: &mut IntentDecision, query: &Query) {
        let admin_token = query.admin_token().map(str::to_owned);
        decision.candidates.retain(|candidate| {
            let Some(handler) = self.registry.get(&candidate.handler_id) else {
                tracing::warn!(
                    handler_id = %candidate.handler_id,
                    "candidate has no registered handler, dropping"
                );
                return false;
            };
            handler.descriptor().capabilities.iter().all(|capability| {
                self.gate.evaluate(
                    *capability,
                    admin_token.as_deref(),
                    Some(&candidate.handler_id),
                    GateStage::Filter,
                )
            })
        });
    }

    /// Invoke every candidate concurrently under the remaining budget.
    ///
    /// Each handler gets a final gate check immediately before invocation;
    /// a denial here (policy changed since filtering) is recorded as a
    /// `denied` result and `handle` is never called.
    async fn dispatch(
        &self,
        query: &Query,
        decision: &IntentDecision,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Vec<HandlerResult> {
        let mut denied: Vec<HandlerResult> = Vec::new();
        let mut tasks: Vec<FanoutTask> = Vec::new();

        for candidate in &decision.candidates {
            let Some(handler) = self.registry.get(&candidate.handler_id) else {
                continue;
            };
            let descriptor = handler.descriptor();

            let allowed = descriptor.capabilities.iter().all(|capability| {
                self.gate.evaluate(
                    *capability,
                    query.admin_token(),
                    Some(&descriptor.id),
                    GateStage::Invoke,
                )
            });
            if !allowed {
                denied.push(HandlerResult::failed(descriptor.id, ErrorKind::Denied));
                continue;
            }

            let request = HandlerRequest {
                query: query.clone(),
                intent: decision.primary_intent.clone(),
                deadline_ms: deadline.as_millis() as u64,
                cancel: cancel.child_token(),
            };
            tasks.push(FanoutTask::new(
                descriptor.id,
                Box::pin(async move { handler.handle(request).await }),
            ));
        }

        let mut results = self
            .engine
            .run(&query.id, tasks, deadline, cancel.child_token())
            .await;
        results.extend(denied);

        for result in &results {
            self.metrics.record_invocation(
                &result.handler_id,
                result.ok,
                result.error_kind,
                result.latency_ms,
            );
        }
        results
    }

    /// Run the winning code artifact in the sandbox when either the
    /// artifact demands it or policy does.
    async fn run_winner_sandbox(
        &self,
        results: &[HandlerResult],
        decision: &IntentDecision,
        capability_of: &(dyn Fn(&str) -> Option<Capability> + Send + Sync),
    ) -> (Option<fame_domain::SandboxReport>, Vec<HandlerError>) {
        let Some(winner_index) =
            self.synthesizer
                .pick_winner(results, decision, capability_of)
        else {
            return (None, Vec::new());
        };
        let winner = &results[winner_index];

        let policy_requires = capability_of(&winner.handler_id)
            .map(|c| self.gate.requires_sandbox(c))
            .unwrap_or(false);
        let Some(code) = winner.code_artifact() else {
            return (None, Vec::new());
        };
        if !winner.requires_sandbox() && !policy_requires && !decision.require_sandbox {
            return (None, Vec::new());
        }

        let language = winner
            .structured
            .as_ref()
            .and_then(|s| s.get("language"))
            .and_then(|v| v.as_str())
            .unwrap_or("python")
            .to_owned();
        let limits = self.config.sandbox.limits();

        match self.sandbox.run(code, &language, &limits).await {
            Ok(report) => {
                self.metrics.record_sandbox_execution();
                TraceEvent::SandboxExecuted {
                    exit_code: report.exit_code,
                    wall_ms: report.wall_ms,
                    killed_reason: format!("{:?}", report.killed_reason).to_lowercase(),
                }
                .emit();
                let mut errors = Vec::new();
                if !report.succeeded() {
                    errors.push(HandlerError {
                        handler_id: winner.handler_id.clone(),
                        kind: ErrorKind::SandboxFailed,
                    });
                }
                (Some(report), errors)
            }
            Err(error) => {
                tracing::warn!(
                    handler_id = %winner.handler_id,
                    error = %error,
                    "sandbox execution failed"
                );
                (
                    None,
                    vec![HandlerError {
                        handler_id: winner.handler_id.clone(),
                        kind: ErrorKind::SandboxFailed,
                    }],
                )
            }
        }
    }

    /// Time left until the query's deadline, floored so dispatch always
    /// gets a sliver even when classification ate the budget.
    fn remaining_budget(&self, query: &Query) -> Duration {
        let elapsed_ms = Utc::now()
            .signed_duration_since(query.accepted_at)
            .num_milliseconds()
            .max(0) as u64;
        Duration::from_millis(
            query
                .deadline_ms
                .saturating_sub(elapsed_ms)
                .max(MIN_DISPATCH_BUDGET_MS),
        )
    }

    /// First declared capability of a registered handler.
    fn primary_capability(&self, handler_id: &str) -> Option<Capability> {
        self.registry
            .list()
            .into_iter()
            .find(|d| d.id == handler_id)
            .and_then(|d| d.capabilities.first().copied())
    }
}
