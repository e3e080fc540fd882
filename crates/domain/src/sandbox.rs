//! Sandbox limits and the execution report.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Network policy for a sandbox invocation. Denied is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    #[default]
    Denied,
    Allowed,
}

/// Mandatory resource caps for one sandbox invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Wall-clock timeout.
    pub wall: Duration,
    /// Peak memory cap in bytes.
    pub memory_bytes: u64,
    /// CPU share (fraction of one core).
    pub cpu_share: f64,
    pub network: NetworkPolicy,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        SandboxLimits {
            wall: Duration::from_secs(30),
            memory_bytes: 512 * 1024 * 1024,
            cpu_share: 0.5,
            network: NetworkPolicy::Denied,
        }
    }
}

/// Why a sandboxed process was killed, if it was.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KilledReason {
    #[default]
    None,
    Timeout,
    Memory,
    Network,
    Other,
}

/// The observable outcome of one sandbox invocation. Callers only ever see
/// the terminal state; intermediate executor states are internal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxReport {
    pub exit_code: i32,
    /// Stdout, truncated to the capture budget.
    pub stdout_truncated: String,
    /// Stderr, truncated to the capture budget.
    pub stderr_truncated: String,
    pub wall_ms: u64,
    pub peak_memory_bytes: u64,
    pub killed_reason: KilledReason,
}

impl SandboxReport {
    /// A run "succeeded" when the process exited zero and was not killed.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.killed_reason == KilledReason::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_policy() {
        let l = SandboxLimits::default();
        assert_eq!(l.wall, Duration::from_secs(30));
        assert_eq!(l.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(l.network, NetworkPolicy::Denied);
    }

    #[test]
    fn killed_run_did_not_succeed() {
        let report = SandboxReport {
            exit_code: 0,
            stdout_truncated: String::new(),
            stderr_truncated: String::new(),
            wall_ms: 5000,
            peak_memory_bytes: 0,
            killed_reason: KilledReason::Timeout,
        };
        assert!(!report.succeeded());
    }

    #[test]
    fn clean_exit_succeeded() {
        let report = SandboxReport {
            exit_code: 0,
            stdout_truncated: "ok".into(),
            stderr_truncated: String::new(),
            wall_ms: 12,
            peak_memory_bytes: 1024,
            killed_reason: KilledReason::None,
        };
        assert!(report.succeeded());
    }
}
