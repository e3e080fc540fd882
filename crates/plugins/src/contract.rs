//! The boundary every plugin implements.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use fame_domain::capability::Capability;
use fame_domain::error::Result;
use fame_domain::query::Query;
use fame_domain::result::HandlerResult;
use fame_sandbox::SandboxExecutor;

use crate::event_bus::EventBus;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Descriptor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a plugin declares about itself at registration time.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerDescriptor {
    /// Stable handler id.
    pub id: String,
    /// Declared capabilities; must be non-empty.
    pub capabilities: Vec<Capability>,
    /// Marks handlers whose capabilities are dangerous even when enabled.
    pub dangerous: bool,
    /// Higher priority wins when several handlers serve one capability.
    pub priority: u8,
}

impl HandlerDescriptor {
    pub fn new(id: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        HandlerDescriptor {
            id: id.into(),
            capabilities,
            dangerous: false,
            priority: 50,
        }
    }

    pub fn dangerous(mut self) -> Self {
        self.dangerous = true;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Init context & per-invocation request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Manager handle passed to `init`. Grants access to the event bus and the
/// sandbox executor; plugins own nothing else of the core.
#[derive(Clone)]
pub struct PluginContext {
    pub events: EventBus,
    pub sandbox: Arc<dyn SandboxExecutor>,
}

/// One invocation of a handler.
#[derive(Clone)]
pub struct HandlerRequest {
    pub query: Query,
    /// The intent the router resolved for this invocation.
    pub intent: String,
    /// Deadline the handler must return within.
    pub deadline_ms: u64,
    /// Cooperative cancellation signal; invokers that ignore it are not
    /// awaited past the deadline.
    pub cancel: CancellationToken,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The plugin contract.
///
/// `init` runs once at startup under the registry's startup budget.
/// `handle` runs per invocation and must be safe to call concurrently;
/// long work must watch `req.cancel` and respect `req.deadline_ms`.
///
/// Handlers that generate executable code return it in `structured.code`
/// with `structured.requires_sandbox = true`; the orchestrator runs it
/// through the sandbox executor and attaches the report to the response.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    fn descriptor(&self) -> HandlerDescriptor;

    async fn init(&self, ctx: &PluginContext) -> Result<()>;

    async fn handle(&self, req: HandlerRequest) -> Result<HandlerResult>;
}
