//! Built-in core plugin set.
//!
//! These are the handlers the gateway ships with — the same set the
//! quarantine allow-list names. Everything else arrives as an external
//! plugin through the registry.

mod clock;
mod identity;
mod search;

pub use clock::ClockHandler;
pub use identity::IdentityResponder;
pub use search::{HttpSearchProvider, WebSearchAggregator};

use std::sync::Arc;

use fame_domain::config::Config;
use fame_plugins::Handler;

/// Assemble the built-in plugin set from config.
pub fn core_plugins(config: &Config) -> Vec<Arc<dyn Handler>> {
    let mut plugins: Vec<Arc<dyn Handler>> = vec![
        Arc::new(IdentityResponder::new()),
        Arc::new(ClockHandler::new()),
    ];

    match WebSearchAggregator::from_config(config) {
        Ok(aggregator) => plugins.push(Arc::new(aggregator)),
        Err(e) => {
            tracing::warn!(error = %e, "web search aggregator not available");
        }
    }

    plugins
}
