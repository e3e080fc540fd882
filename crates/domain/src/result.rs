//! Per-handler invocation results.

use serde::{Deserialize, Serialize};

/// Closed set of handler failure kinds surfaced in results and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invoker exceeded its deadline.
    Timeout,
    /// Upstream cancellation reached the invoker.
    Cancelled,
    /// Invoker raised an uncaught error or panicked.
    Exception,
    /// Safety gate refused invocation at the final check.
    Denied,
    /// Handler declared itself unhealthy.
    Unavailable,
    /// Handler rejected the request semantically.
    BadInput,
    /// Required sandbox run was killed or exited non-zero.
    SandboxFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Exception => "exception",
            ErrorKind::Denied => "denied",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::BadInput => "bad_input",
            ErrorKind::SandboxFailed => "sandbox_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one handler produced for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerResult {
    pub handler_id: String,
    pub ok: bool,
    #[serde(default)]
    pub text: Option<String>,
    /// Structured payload; code generators set `structured.code` and
    /// `structured.requires_sandbox`.
    #[serde(default)]
    pub structured: Option<serde_json::Value>,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
    pub latency_ms: u64,
}

impl HandlerResult {
    pub fn success(handler_id: impl Into<String>, text: impl Into<String>, confidence: f64) -> Self {
        HandlerResult {
            handler_id: handler_id.into(),
            ok: true,
            text: Some(text.into()),
            structured: None,
            confidence,
            sources: Vec::new(),
            error_kind: None,
            latency_ms: 0,
        }
    }

    pub fn failed(handler_id: impl Into<String>, kind: ErrorKind) -> Self {
        HandlerResult {
            handler_id: handler_id.into(),
            ok: false,
            text: None,
            structured: None,
            confidence: 0.0,
            sources: Vec::new(),
            error_kind: Some(kind),
            latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_structured(mut self, structured: serde_json::Value) -> Self {
        self.structured = Some(structured);
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Whether this result carries a code artifact that must run sandboxed.
    pub fn requires_sandbox(&self) -> bool {
        self.structured
            .as_ref()
            .and_then(|s| s.get("requires_sandbox"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// The code artifact, if present.
    pub fn code_artifact(&self) -> Option<&str> {
        self.structured
            .as_ref()
            .and_then(|s| s.get("code"))
            .and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_snake_case_wire_format() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::SandboxFailed).unwrap(),
            "\"sandbox_failed\""
        );
        assert_eq!(ErrorKind::BadInput.as_str(), "bad_input");
    }

    #[test]
    fn failed_result_has_zero_confidence() {
        let r = HandlerResult::failed("h1", ErrorKind::Timeout);
        assert!(!r.ok);
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.error_kind, Some(ErrorKind::Timeout));
    }

    #[test]
    fn sandbox_artifact_detection() {
        let r = HandlerResult::success("codegen", "here you go", 0.9).with_structured(
            serde_json::json!({"code": "print('hi')", "requires_sandbox": true}),
        );
        assert!(r.requires_sandbox());
        assert_eq!(r.code_artifact(), Some("print('hi')"));
    }

    #[test]
    fn plain_result_requires_no_sandbox() {
        let r = HandlerResult::success("h1", "text", 0.5);
        assert!(!r.requires_sandbox());
        assert!(r.code_artifact().is_none());
    }
}
