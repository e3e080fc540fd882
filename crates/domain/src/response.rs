//! The single response every accepted query resolves to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::ErrorKind;
use crate::sandbox::SandboxReport;
use crate::turn::FollowUpTag;

/// A handler failure surfaced in the response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerError {
    pub handler_id: String,
    pub kind: ErrorKind,
}

/// The one response produced for an accepted query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub query_id: String,
    pub session_id: String,
    pub text: String,
    pub confidence: f64,
    pub intent: String,
    #[serde(default)]
    pub expected_response_tag: Option<FollowUpTag>,
    /// True when not all intended sources contributed.
    pub partial: bool,
    pub contributing_handlers: Vec<String>,
    #[serde(default)]
    pub errors: Vec<HandlerError>,
    #[serde(default)]
    pub sandbox_report: Option<SandboxReport>,
    /// Unix milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Response {
    /// Canned fallback when every handler failed.
    pub fn fallback(query_id: &str, session_id: &str, intent: &str, errors: Vec<HandlerError>) -> Response {
        Response {
            query_id: query_id.to_owned(),
            session_id: session_id.to_owned(),
            text: "I couldn't reach any of my sources for that just now. \
                   Please try again in a moment."
                .into(),
            confidence: 0.0,
            intent: intent.to_owned(),
            expected_response_tag: None,
            partial: true,
            contributing_handlers: Vec::new(),
            errors,
            sandbox_report: None,
            timestamp: Utc::now(),
        }
    }

    /// Canonical response for orchestrator-internal faults. Carries an
    /// incident id so operators can correlate with logs; never a stack trace.
    pub fn internal_error(query_id: &str, session_id: &str, incident_id: &str) -> Response {
        Response {
            query_id: query_id.to_owned(),
            session_id: session_id.to_owned(),
            text: format!(
                "Something went wrong on my side while handling that \
                 (incident {incident_id}). Please try again."
            ),
            confidence: 0.0,
            intent: "internal_error".into(),
            expected_response_tag: None,
            partial: true,
            contributing_handlers: Vec::new(),
            errors: Vec::new(),
            sandbox_report: None,
            timestamp: Utc::now(),
        }
    }

    /// Response for a request whose overall deadline expired, naming the
    /// stage that was in flight.
    pub fn deadline_expired(query_id: &str, session_id: &str, stage: &str) -> Response {
        Response {
            query_id: query_id.to_owned(),
            session_id: session_id.to_owned(),
            text: format!("That took too long to answer (timed out during {stage})."),
            confidence: 0.0,
            intent: "timeout".into(),
            expected_response_tag: None,
            partial: true,
            contributing_handlers: Vec::new(),
            errors: Vec::new(),
            sandbox_report: None,
            timestamp: Utc::now(),
        }
    }

    /// Response for a request cancelled before any result arrived.
    pub fn cancelled(query_id: &str, session_id: &str) -> Response {
        Response {
            query_id: query_id.to_owned(),
            session_id: session_id.to_owned(),
            text: "The request was cancelled before an answer was ready.".into(),
            confidence: 0.0,
            intent: "cancelled".into(),
            expected_response_tag: None,
            partial: true,
            contributing_handlers: Vec::new(),
            errors: Vec::new(),
            sandbox_report: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_partial_with_zero_confidence() {
        let r = Response::fallback("q1", "s1", "finance", vec![]);
        assert!(r.partial);
        assert_eq!(r.confidence, 0.0);
        assert!(r.contributing_handlers.is_empty());
    }

    #[test]
    fn internal_error_carries_incident_id() {
        let r = Response::internal_error("q1", "s1", "inc-42");
        assert!(r.text.contains("inc-42"));
        assert_eq!(r.intent, "internal_error");
    }

    #[test]
    fn deadline_response_names_stage() {
        let r = Response::deadline_expired("q1", "s1", "dispatch");
        assert!(r.text.contains("dispatch"));
        assert!(r.partial);
    }

    #[test]
    fn envelope_serializes_snake_case_errors() {
        let r = Response::fallback(
            "q1",
            "s1",
            "x",
            vec![HandlerError { handler_id: "h".into(), kind: ErrorKind::Timeout }],
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["errors"][0]["kind"], "timeout");
    }
}
