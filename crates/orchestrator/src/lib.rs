//! End-to-end request lifecycle.
//!
//! The orchestrator drives every accepted query through one state machine:
//! Accepted → Classified → Gated → Dispatched → Synthesized → Recorded →
//! Responded, with a catastrophic-failure short circuit to a canonical
//! error response. It owns no business logic of its own — classification,
//! gating, fan-out, and synthesis live in their crates; this one sequences
//! them under a request-scoped deadline and cancellation signal.

pub mod orchestrator;
pub mod synthesis;

pub use orchestrator::Orchestrator;
pub use synthesis::Synthesizer;
