//! POST /v1/query — the one request entry point.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use tokio_util::sync::CancellationToken;

use fame_domain::query::QueryEnvelope;

use crate::state::AppState;

pub async fn submit(
    State(state): State<AppState>,
    Json(envelope): Json<QueryEnvelope>,
) -> impl IntoResponse {
    // The token is dropped (and the pipeline's children cancelled) if the
    // client disconnects and axum drops this future.
    let cancel = CancellationToken::new();
    let _drop_guard = cancel.clone().drop_guard();

    let response = state.orchestrator.handle_query(envelope, cancel).await;
    Json(response)
}
