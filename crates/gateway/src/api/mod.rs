//! HTTP surface.

mod admin;
mod query;
mod sessions;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// All routes: unversioned health probes plus the `/v1` API.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(admin::healthz))
        .route("/readyz", get(admin::readyz))
        .route("/v1/query", post(query::submit))
        .route("/v1/sessions", get(sessions::list))
        .route("/v1/sessions/:id/turns", get(sessions::turns))
        .route("/v1/sessions/:id", delete(sessions::clear))
        .route("/v1/plugins", get(admin::plugins))
        .route("/v1/metrics", get(admin::metrics))
        .route("/v1/audit", get(admin::audit))
}
