//! Startup-time plugin registry.
//!
//! Registration is one-shot: plugins are validated, probed, and accepted
//! (or rejected with a recorded reason) during `build`. The entry list
//! lives behind an `RwLock`, so hot reload stays possible without being
//! implemented here.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use fame_domain::capability::Capability;
use fame_domain::config::PluginsConfig;
use fame_domain::error::{Error, Result};
use fame_domain::trace::TraceEvent;

use crate::contract::{Handler, HandlerDescriptor, PluginContext};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct RegisteredPlugin {
    descriptor: HandlerDescriptor,
    handler: Arc<dyn Handler>,
}

/// A plugin the registry refused to load, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct PluginLoadError {
    pub plugin_id: String,
    pub reason: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds every accepted handler for the process lifetime.
pub struct PluginRegistry {
    entries: RwLock<Vec<RegisteredPlugin>>,
    load_errors: Vec<PluginLoadError>,
}

impl PluginRegistry {
    /// Validate, probe, and register the given plugins.
    ///
    /// Rejections (duplicate id, empty capability set, failed or overlong
    /// `init`) are recorded in `load_errors` and skipped rather than
    /// aborting startup. In quarantine mode only allow-listed ids load.
    ///
    /// Returns `Error::PluginLoad` only when *no* plugin survived, since an
    /// empty registry cannot serve any query.
    pub async fn build(
        config: &PluginsConfig,
        ctx: &PluginContext,
        plugins: Vec<Arc<dyn Handler>>,
    ) -> Result<PluginRegistry> {
        let mut entries: Vec<RegisteredPlugin> = Vec::new();
        let mut load_errors: Vec<PluginLoadError> = Vec::new();
        let startup_budget = Duration::from_secs(config.startup_budget_secs);

        for handler in plugins {
            let descriptor = handler.descriptor();
            let id = descriptor.id.clone();

            if config.quarantine && !config.allow_list.iter().any(|a| a == &id) {
                tracing::warn!(plugin_id = %id, "quarantine mode: plugin not on allow-list, skipping");
                ctx.events.publish(TraceEvent::PluginRejected {
                    plugin_id: id,
                    reason: "quarantined".into(),
                });
                continue;
            }

            if let Err(reason) = validate_descriptor(&descriptor, &entries) {
                tracing::warn!(plugin_id = %id, reason = %reason, "plugin rejected");
                ctx.events.publish(TraceEvent::PluginRejected {
                    plugin_id: id.clone(),
                    reason: reason.clone(),
                });
                load_errors.push(PluginLoadError { plugin_id: id, reason });
                continue;
            }

            // Dry-run probe: init must succeed within the startup budget.
            let probe = tokio::time::timeout(startup_budget, handler.init(ctx)).await;
            let reason = match probe {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("init failed: {e}")),
                Err(_) => Some(format!(
                    "init exceeded startup budget of {}s",
                    startup_budget.as_secs()
                )),
            };
            if let Some(reason) = reason {
                tracing::warn!(plugin_id = %id, reason = %reason, "plugin rejected");
                ctx.events.publish(TraceEvent::PluginRejected {
                    plugin_id: id.clone(),
                    reason: reason.clone(),
                });
                load_errors.push(PluginLoadError { plugin_id: id, reason });
                continue;
            }

            ctx.events.publish(TraceEvent::PluginLoaded {
                plugin_id: id.clone(),
                capabilities: descriptor.capabilities.len(),
                dangerous: descriptor.dangerous,
            });
            tracing::info!(
                plugin_id = %id,
                capabilities = descriptor.capabilities.len(),
                priority = descriptor.priority,
                "plugin registered"
            );
            entries.push(RegisteredPlugin { descriptor, handler });
        }

        if entries.is_empty() {
            return Err(Error::PluginLoad(format!(
                "no plugins loaded ({} rejected)",
                load_errors.len()
            )));
        }

        tracing::info!(
            loaded = entries.len(),
            rejected = load_errors.len(),
            quarantine = config.quarantine,
            "plugin registry ready"
        );

        Ok(PluginRegistry {
            entries: RwLock::new(entries),
            load_errors,
        })
    }

    /// Look up a handler by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Handler>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| e.handler.clone())
    }

    /// All registered descriptors, in registration order.
    pub fn list(&self) -> Vec<HandlerDescriptor> {
        self.entries
            .read()
            .iter()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Handlers declaring a capability, ordered by declared priority
    /// (highest first; ties broken by id for determinism).
    pub fn find_by_capability(&self, capability: Capability) -> Vec<HandlerDescriptor> {
        let entries = self.entries.read();
        let mut found: Vec<HandlerDescriptor> = entries
            .iter()
            .filter(|e| e.descriptor.capabilities.contains(&capability))
            .map(|e| e.descriptor.clone())
            .collect();
        found.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        found
    }

    /// Capabilities covered by at least one registered handler.
    pub fn covered_capabilities(&self) -> Vec<Capability> {
        let entries = self.entries.read();
        let mut caps: Vec<Capability> = entries
            .iter()
            .flat_map(|e| e.descriptor.capabilities.iter().copied())
            .collect();
        caps.sort();
        caps.dedup();
        caps
    }

    /// Plugins rejected at startup.
    pub fn load_errors(&self) -> &[PluginLoadError] {
        &self.load_errors
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn validate_descriptor(
    descriptor: &HandlerDescriptor,
    entries: &[RegisteredPlugin],
) -> std::result::Result<(), String> {
    if descriptor.id.is_empty() {
        return Err("empty plugin id".into());
    }
    if descriptor.capabilities.is_empty() {
        return Err("plugin declares no capabilities".into());
    }
    // Second registration of an id loses.
    if entries.iter().any(|e| e.descriptor.id == descriptor.id) {
        return Err(format!("duplicate plugin id '{}'", descriptor.id));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::HandlerRequest;
    use crate::event_bus::EventBus;
    use fame_domain::result::HandlerResult;
    use fame_sandbox::LocalExecutor;

    struct StubPlugin {
        descriptor: HandlerDescriptor,
        fail_init: bool,
        slow_init: bool,
    }

    #[async_trait::async_trait]
    impl Handler for StubPlugin {
        fn descriptor(&self) -> HandlerDescriptor {
            self.descriptor.clone()
        }

        async fn init(&self, _ctx: &PluginContext) -> fame_domain::Result<()> {
            if self.slow_init {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if self.fail_init {
                return Err(Error::Other("boom".into()));
            }
            Ok(())
        }

        async fn handle(&self, req: HandlerRequest) -> fame_domain::Result<HandlerResult> {
            Ok(HandlerResult::success(
                self.descriptor.id.clone(),
                format!("echo: {}", req.query.text),
                0.5,
            ))
        }
    }

    fn stub(id: &str, caps: Vec<Capability>) -> Arc<dyn Handler> {
        Arc::new(StubPlugin {
            descriptor: HandlerDescriptor::new(id, caps),
            fail_init: false,
            slow_init: false,
        })
    }

    fn ctx() -> PluginContext {
        PluginContext {
            events: EventBus::new(),
            sandbox: Arc::new(LocalExecutor::default()),
        }
    }

    fn config() -> PluginsConfig {
        PluginsConfig {
            startup_budget_secs: 1,
            ..PluginsConfig::default()
        }
    }

    #[tokio::test]
    async fn registers_valid_plugins() {
        let registry = PluginRegistry::build(
            &config(),
            &ctx(),
            vec![
                stub("identity", vec![Capability::Identity]),
                stub("search", vec![Capability::WebSearch]),
            ],
        )
        .await
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("identity").is_some());
        assert!(registry.get("missing").is_none());
        assert!(registry.load_errors().is_empty());
    }

    #[tokio::test]
    async fn duplicate_id_second_registration_loses() {
        let registry = PluginRegistry::build(
            &config(),
            &ctx(),
            vec![
                stub("dup", vec![Capability::Finance]),
                stub("dup", vec![Capability::WebSearch]),
            ],
        )
        .await
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.load_errors().len(), 1);
        assert!(registry.load_errors()[0].reason.contains("duplicate"));
        // The surviving registration is the first one.
        assert_eq!(
            registry.find_by_capability(Capability::Finance).len(),
            1
        );
        assert!(registry.find_by_capability(Capability::WebSearch).is_empty());
    }

    #[tokio::test]
    async fn failing_init_is_rejected() {
        let bad: Arc<dyn Handler> = Arc::new(StubPlugin {
            descriptor: HandlerDescriptor::new("bad", vec![Capability::Utility]),
            fail_init: true,
            slow_init: false,
        });
        let registry = PluginRegistry::build(
            &config(),
            &ctx(),
            vec![bad, stub("good", vec![Capability::Utility])],
        )
        .await
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.load_errors()[0].plugin_id, "bad");
    }

    #[tokio::test]
    async fn slow_init_exceeds_startup_budget() {
        let slow: Arc<dyn Handler> = Arc::new(StubPlugin {
            descriptor: HandlerDescriptor::new("slow", vec![Capability::Utility]),
            fail_init: false,
            slow_init: true,
        });
        let registry = PluginRegistry::build(
            &config(),
            &ctx(),
            vec![slow, stub("fast", vec![Capability::Utility])],
        )
        .await
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.load_errors()[0].reason.contains("startup budget"));
    }

    #[tokio::test]
    async fn empty_capability_set_is_rejected() {
        let result = PluginRegistry::build(
            &config(),
            &ctx(),
            vec![stub("nocaps", vec![])],
        )
        .await;
        assert!(matches!(result, Err(Error::PluginLoad(_))));
    }

    #[tokio::test]
    async fn quarantine_loads_only_allow_list() {
        let cfg = PluginsConfig {
            quarantine: true,
            allow_list: vec!["identity".into()],
            startup_budget_secs: 1,
            ..PluginsConfig::default()
        };
        let registry = PluginRegistry::build(
            &cfg,
            &ctx(),
            vec![
                stub("identity", vec![Capability::Identity]),
                stub("search", vec![Capability::WebSearch]),
            ],
        )
        .await
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("identity").is_some());
        assert!(registry.get("search").is_none());
    }

    #[tokio::test]
    async fn capability_lookup_ordered_by_priority() {
        let low: Arc<dyn Handler> = Arc::new(StubPlugin {
            descriptor: HandlerDescriptor::new("low", vec![Capability::WebSearch])
                .with_priority(10),
            fail_init: false,
            slow_init: false,
        });
        let high: Arc<dyn Handler> = Arc::new(StubPlugin {
            descriptor: HandlerDescriptor::new("high", vec![Capability::WebSearch])
                .with_priority(90),
            fail_init: false,
            slow_init: false,
        });
        let registry = PluginRegistry::build(&config(), &ctx(), vec![low, high])
            .await
            .unwrap();

        let found = registry.find_by_capability(Capability::WebSearch);
        assert_eq!(found[0].id, "high");
        assert_eq!(found[1].id, "low");
    }

    #[tokio::test]
    async fn covered_capabilities_deduplicates() {
        let registry = PluginRegistry::build(
            &config(),
            &ctx(),
            vec![
                stub("a", vec![Capability::WebSearch, Capability::Utility]),
                stub("b", vec![Capability::WebSearch]),
            ],
        )
        .await
        .unwrap();

        let caps = registry.covered_capabilities();
        assert_eq!(caps, vec![Capability::WebSearch, Capability::Utility]);
    }
}
