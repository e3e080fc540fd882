//! Inbound query model.
//!
//! A [`QueryEnvelope`] is what any transport (HTTP, CLI, voice front-end)
//! hands to the orchestrator; [`Query::accept`] stamps it with an id,
//! session id, and accept time. A `Query` is immutable once accepted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The transport-agnostic request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryEnvelope {
    pub text: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub source: QuerySource,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Per-request deadline override in milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

/// Where the query came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    #[default]
    Text,
    Voice,
    Api,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Accepted query
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An accepted query. Immutable for the rest of the request lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct Query {
    pub id: String,
    pub session_id: String,
    pub text: String,
    pub source: QuerySource,
    pub metadata: HashMap<String, String>,
    /// Effective deadline for the whole request, in milliseconds.
    pub deadline_ms: u64,
    pub accepted_at: DateTime<Utc>,
}

impl Query {
    /// Accept an envelope: mint the query id, resolve the session id
    /// (generated when absent), and fix the effective deadline.
    pub fn accept(envelope: QueryEnvelope, default_deadline_ms: u64) -> Query {
        let session_id = envelope
            .session_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Query {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            text: envelope.text,
            source: envelope.source,
            metadata: envelope.metadata,
            deadline_ms: envelope.deadline_ms.unwrap_or(default_deadline_ms),
            accepted_at: Utc::now(),
        }
    }

    /// Admin token presented with the query, if any.
    pub fn admin_token(&self) -> Option<&str> {
        self.metadata.get("admin_token").map(|s| s.as_str())
    }
}
