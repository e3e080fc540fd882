use serde::{Deserialize, Serialize};

/// Structured trace events emitted across all FAME crates.
///
/// Events are serialized to JSON and logged through `tracing`; the gateway
/// also fans them out on the plugin event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    QueryAccepted {
        query_id: String,
        session_id: String,
        source: String,
        deadline_ms: u64,
    },
    IntentClassified {
        query_id: String,
        intent: String,
        confidence: f64,
        rule: String,
        candidates: usize,
        context_boost_applied: bool,
    },
    SafetyDecision {
        capability: String,
        allowed: bool,
        reason: String,
        handler_id: Option<String>,
    },
    FanoutStarted {
        query_id: String,
        tasks: usize,
        deadline_ms: u64,
    },
    FanoutCompleted {
        query_id: String,
        ok: usize,
        failed: usize,
        timed_out: usize,
        duration_ms: u64,
    },
    SingleFlightJoined {
        query_hash: u64,
    },
    SandboxExecuted {
        exit_code: i32,
        wall_ms: u64,
        killed_reason: String,
    },
    ResponseSynthesized {
        query_id: String,
        winner: Option<String>,
        confidence: f64,
        partial: bool,
    },
    SessionReaped {
        session_id: String,
        idle_secs: i64,
    },
    PluginLoaded {
        plugin_id: String,
        capabilities: usize,
        dangerous: bool,
    },
    PluginRejected {
        plugin_id: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "fame_event");
    }
}
