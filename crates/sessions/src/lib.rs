//! Per-session conversation buffers.
//!
//! Ground truth for follow-up disambiguation: the router reads the last
//! assistant turn's `expected_follow_up` tag from here. Sessions are
//! created on first use, hold a bounded FIFO of turns, and are reaped
//! after an idle timeout.

pub mod store;

pub use store::{SessionSnapshot, SessionStore};
