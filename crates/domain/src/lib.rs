//! Shared domain types for the FAME orchestrator.
//!
//! Everything other crates agree on lives here: the query/response data
//! model, the closed error-kind set, capability tags, configuration, and
//! structured trace events. This crate has no async code and no I/O beyond
//! config file loading.

pub mod capability;
pub mod config;
pub mod decision;
pub mod error;
pub mod query;
pub mod response;
pub mod result;
pub mod sandbox;
pub mod trace;
pub mod turn;

pub use capability::Capability;
pub use decision::{CandidateHandler, FeatureVector, IntentDecision};
pub use error::{Error, Result};
pub use query::{Query, QueryEnvelope, QuerySource};
pub use response::{HandlerError, Response};
pub use result::{ErrorKind, HandlerResult};
pub use sandbox::{KilledReason, SandboxLimits, SandboxReport};
pub use turn::{FollowUpTag, Turn, TurnRole};
