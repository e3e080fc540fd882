//! The identity responder.
//!
//! Target of the router's identity guard: answers questions about the
//! assistant itself so they never reach web search. Also acknowledges
//! declined offers.

use fame_domain::capability::Capability;
use fame_domain::error::Result;
use fame_domain::result::HandlerResult;
use fame_plugins::{Handler, HandlerDescriptor, HandlerRequest, PluginContext};

const ABOUT: &str = "I'm an assistant that routes your questions to a pool of \
specialist handlers — things like web search, finance lookups, and code \
generation — and merges their answers. Ask me something and I'll pick the \
right specialists for it.";

const SELF_MODIFY: &str = "I can't change my own code. Generated code runs in \
an isolated sandbox with strict resource limits, and the dangerous \
capabilities stay disabled unless an operator enables them.";

const DECLINED: &str = "No problem — I'll leave it there. Anything else?";

pub struct IdentityResponder;

impl IdentityResponder {
    pub fn new() -> IdentityResponder {
        IdentityResponder
    }
}

impl Default for IdentityResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Handler for IdentityResponder {
    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor::new("identity", vec![Capability::Identity]).with_priority(90)
    }

    async fn init(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    async fn handle(&self, req: HandlerRequest) -> Result<HandlerResult> {
        let text = if req.intent == "declined" {
            DECLINED
        } else if mentions_self_modification(&req.query.text) {
            SELF_MODIFY
        } else {
            ABOUT
        };
        Ok(HandlerResult::success("identity", text, 0.95))
    }
}

fn mentions_self_modification(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ["modify", "rewrite", "change", "improve", "update"]
        .iter()
        .any(|verb| lowered.contains(verb))
        && (lowered.contains("yourself") || lowered.contains("your own"))
}
