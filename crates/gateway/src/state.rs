use std::sync::Arc;

use fame_domain::config::Config;
use fame_orchestrator::Orchestrator;

/// Shared application state passed to all API handlers.
///
/// The orchestrator owns every subsystem (registry, gate, sessions,
/// sandbox, metrics) for the process lifetime; the state just carries the
/// handles the HTTP layer needs.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
}
