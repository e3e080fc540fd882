use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Safety gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Bounded in-memory audit ring capacity.
    #[serde(default = "d_audit_capacity")]
    pub audit_capacity: usize,
    /// Optional JSONL audit sink. When absent the ring is in-memory only.
    #[serde(default)]
    pub audit_path: Option<PathBuf>,
    /// Environment variable holding the comma-separated admin token list.
    #[serde(default = "d_admin_tokens_env")]
    pub admin_tokens_env: String,
    /// Per-capability `enabled` overrides layered over the default policy.
    /// Keys are capability tags (`"finance"`, `"security"`, …).
    #[serde(default)]
    pub enabled_overrides: HashMap<String, bool>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        SafetyConfig {
            audit_capacity: d_audit_capacity(),
            audit_path: None,
            admin_tokens_env: d_admin_tokens_env(),
            enabled_overrides: HashMap::new(),
        }
    }
}

fn d_audit_capacity() -> usize {
    10_000
}

fn d_admin_tokens_env() -> String {
    "FAME_ADMIN_TOKENS".into()
}
