//! Process wiring: assemble the orchestrator and its subsystems.

use std::sync::Arc;

use fame_domain::config::Config;
use fame_domain::error::Result;
use fame_metrics::Metrics;
use fame_orchestrator::Orchestrator;
use fame_plugins::{EventBus, PluginContext, PluginRegistry};
use fame_safety::SafetyGate;
use fame_sandbox::{ProcessExecutor, SandboxExecutor};
use fame_sessions::SessionStore;

use crate::plugins::core_plugins;

/// Build the orchestrator: sandbox, event bus, plugin registry (with the
/// init probe), safety gate, session store, metrics.
pub async fn build_orchestrator(config: Arc<Config>) -> Result<Arc<Orchestrator>> {
    let events = EventBus::new();

    let sandbox: Arc<dyn SandboxExecutor> =
        Arc::new(ProcessExecutor::new(config.sandbox.clone()));
    tracing::info!("sandbox executor ready (process isolation)");

    let ctx = PluginContext {
        events: events.clone(),
        sandbox: sandbox.clone(),
    };
    let registry = Arc::new(
        PluginRegistry::build(&config.plugins, &ctx, core_plugins(&config)).await?,
    );

    let gate = Arc::new(SafetyGate::from_config(&config.safety, events.clone())?);
    tracing::info!("safety gate ready");

    let sessions = Arc::new(SessionStore::new(&config.sessions));
    let metrics = Arc::new(Metrics::new());

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        registry,
        gate,
        sessions.clone(),
        sandbox,
        metrics,
    ));

    // Background session reaper.
    {
        let sessions = sessions.clone();
        let interval_secs = config.sessions.reap_interval_secs.max(1);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let reaped = sessions.reap(chrono::Utc::now());
                if reaped > 0 {
                    tracing::info!(reaped, "idle sessions reaped");
                }
            }
        });
    }

    Ok(orchestrator)
}
