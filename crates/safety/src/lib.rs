//! Capability safety gate.
//!
//! The gate owns the per-capability policy table and the audit trail.
//! It is consulted twice per request: once when the router's candidate
//! list is filtered, and once immediately before each invocation as a
//! race-safe final check. Denial is never an error — it just removes the
//! candidate.

pub mod audit;
pub mod gate;

pub use audit::{AuditRecord, AuditRing};
pub use gate::{CapabilityPolicy, GateStage, RiskLevel, SafetyGate};
