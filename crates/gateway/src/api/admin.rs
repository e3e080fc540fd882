//! Health, readiness, metrics, plugin listing, and the audit endpoint.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use fame_domain::capability::Capability;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /healthz — liveness probe, always 200
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /readyz — readiness: registry loaded + core capabilities healthy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let registry = orchestrator.registry();
    let metrics = orchestrator.metrics();

    let mut capability_status = Vec::new();
    let mut ready = !registry.is_empty();

    for capability in Capability::CORE {
        let handlers = registry.find_by_capability(*capability);
        // Ready when at least one handler serving this capability holds an
        // ok-rate of 0.5+ over its recent window.
        let healthy = handlers
            .iter()
            .any(|d| metrics.ok_rate(&d.id) >= 0.5);
        if !healthy {
            ready = false;
        }
        capability_status.push(serde_json::json!({
            "capability": capability.as_str(),
            "handlers": handlers.iter().map(|d| d.id.clone()).collect::<Vec<_>>(),
            "healthy": healthy,
        }));
    }

    let body = Json(serde_json::json!({
        "ready": ready,
        "plugins_loaded": registry.len(),
        "core_capabilities": capability_status,
    }));
    if ready {
        (StatusCode::OK, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/metrics — per-handler and process-level counters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let sessions = orchestrator.sessions().len();
    Json(serde_json::json!({
        "process": orchestrator.metrics().process_snapshot(sessions),
        "handlers": orchestrator.metrics().handler_snapshot(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/plugins — registry contents and load errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn plugins(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.orchestrator.registry();
    Json(serde_json::json!({
        "plugins": registry.list(),
        "load_errors": registry.load_errors(),
        "quarantine": state.config.plugins.quarantine,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/audit — recent safety decisions (admin token required)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct AuditParams {
    #[serde(default = "d_audit_n")]
    pub n: usize,
}

fn d_audit_n() -> usize {
    100
}

pub async fn audit(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let authorized = token
        .map(|t| state.orchestrator.gate().admin_token_valid(t))
        .unwrap_or(false);
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "admin token required" })),
        )
            .into_response();
    }

    let records = state.orchestrator.gate().recent_audit(params.n.min(1_000));
    Json(records).into_response()
}
