use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sandbox::{NetworkPolicy, SandboxLimits};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sandbox caps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Wall timeout per invocation. Env override: `FAME_SANDBOX_WALL_MS`.
    #[serde(default = "d_wall_ms")]
    pub wall_ms: u64,
    /// Memory cap in MiB. Env override: `FAME_SANDBOX_MEM_MB`.
    #[serde(default = "d_memory_mb")]
    pub memory_mb: u64,
    /// CPU share (fraction of one core). Env override: `FAME_SANDBOX_CPU`.
    #[serde(default = "d_cpu_share")]
    pub cpu_share: f64,
    /// Stdout/stderr capture budget, bytes each.
    #[serde(default = "d_capture_bytes")]
    pub capture_bytes: usize,
    #[serde(default)]
    pub allow_network: bool,
    /// Interpreter binary per language tag.
    #[serde(default = "d_interpreters")]
    pub interpreters: HashMap<String, String>,
}

impl SandboxConfig {
    /// Resolve the configured caps into per-invocation limits.
    pub fn limits(&self) -> SandboxLimits {
        SandboxLimits {
            wall: Duration::from_millis(self.wall_ms),
            memory_bytes: self.memory_mb * 1024 * 1024,
            cpu_share: self.cpu_share,
            network: if self.allow_network {
                NetworkPolicy::Allowed
            } else {
                NetworkPolicy::Denied
            },
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            wall_ms: d_wall_ms(),
            memory_mb: d_memory_mb(),
            cpu_share: d_cpu_share(),
            capture_bytes: d_capture_bytes(),
            allow_network: false,
            interpreters: d_interpreters(),
        }
    }
}

fn d_wall_ms() -> u64 {
    30_000
}

fn d_memory_mb() -> u64 {
    512
}

fn d_cpu_share() -> f64 {
    0.5
}

fn d_capture_bytes() -> usize {
    64 * 1024
}

fn d_interpreters() -> HashMap<String, String> {
    HashMap::from([
        ("python".to_owned(), "python3".to_owned()),
        ("javascript".to_owned(), "node".to_owned()),
        ("shell".to_owned(), "sh".to_owned()),
    ])
}
