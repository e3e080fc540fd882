//! Time and date utility handler.

use chrono::Utc;

use fame_domain::capability::Capability;
use fame_domain::error::Result;
use fame_domain::result::HandlerResult;
use fame_plugins::{Handler, HandlerDescriptor, HandlerRequest, PluginContext};

pub struct ClockHandler;

impl ClockHandler {
    pub fn new() -> ClockHandler {
        ClockHandler
    }
}

impl Default for ClockHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Handler for ClockHandler {
    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor::new("clock", vec![Capability::Utility]).with_priority(60)
    }

    async fn init(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    async fn handle(&self, req: HandlerRequest) -> Result<HandlerResult> {
        let now = Utc::now();
        let lowered = req.query.text.to_lowercase();
        let text = if lowered.contains("date") || lowered.contains("today") {
            format!("Today is {} (UTC).", now.format("%A, %B %-d %Y"))
        } else {
            format!("It's {} UTC right now.", now.format("%H:%M"))
        };
        Ok(HandlerResult::success("clock", text, 0.8)
            .with_structured(serde_json::json!({ "unix_ms": now.timestamp_millis() })))
    }
}
