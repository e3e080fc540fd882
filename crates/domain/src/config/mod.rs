mod fanout;
mod plugins;
mod router;
mod safety;
mod sandbox;
mod server;
mod sessions;

pub use fanout::*;
pub use plugins::*;
pub use router::*;
pub use safety::*;
pub use sandbox::*;
pub use server::*;
pub use sessions::*;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl Config {
    /// Load config from a TOML file (missing file = defaults), then apply
    /// `FAME_*` environment overrides.
    pub fn load(path: &Path) -> Result<Config> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply the recognized `FAME_*` environment variables on top of
    /// whatever the file provided. Unparseable values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(secs) = env_parse::<u64>("FAME_QUERY_TIMEOUT") {
            self.fanout.query_timeout_secs = secs;
        }
        if std::env::var("FAME_QUARANTINE_CORE").is_ok() {
            self.plugins.quarantine = true;
        }
        if let Some(turns) = env_parse::<usize>("FAME_SESSION_TURNS") {
            self.sessions.max_turns = turns;
        }
        if let Some(secs) = env_parse::<u64>("FAME_SESSION_IDLE_TIMEOUT_S") {
            self.sessions.idle_timeout_secs = secs;
        }
        if let Some(ms) = env_parse::<u64>("FAME_SANDBOX_WALL_MS") {
            self.sandbox.wall_ms = ms;
        }
        if let Some(mb) = env_parse::<u64>("FAME_SANDBOX_MEM_MB") {
            self.sandbox.memory_mb = mb;
        }
        if let Some(cpu) = env_parse::<f64>("FAME_SANDBOX_CPU") {
            self.sandbox.cpu_share = cpu;
        }
    }

    /// Validate the configuration, returning every issue found.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.sessions.max_turns == 0 {
            issues.push(ConfigIssue::error(
                "sessions.max_turns",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.router.low_threshold) {
            issues.push(ConfigIssue::error(
                "router.low_threshold",
                "must be within [0, 1]",
            ));
        }
        if self.router.max_candidates == 0 {
            issues.push(ConfigIssue::error(
                "router.max_candidates",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.router.synthesis_floor) {
            issues.push(ConfigIssue::error(
                "router.synthesis_floor",
                "must be within [0, 1]",
            ));
        }
        if self.fanout.query_timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                "fanout.query_timeout_secs",
                "must be at least 1 second",
            ));
        }
        if self.sandbox.wall_ms == 0 {
            issues.push(ConfigIssue::error("sandbox.wall_ms", "must be non-zero"));
        }
        if self.sandbox.cpu_share <= 0.0 || self.sandbox.cpu_share > 8.0 {
            issues.push(ConfigIssue::error(
                "sandbox.cpu_share",
                "must be in (0, 8]",
            ));
        }
        if self.sandbox.memory_mb < 16 {
            issues.push(ConfigIssue::warning(
                "sandbox.memory_mb",
                "less than 16 MiB — most interpreters will not start",
            ));
        }
        if self.plugins.quarantine && self.plugins.allow_list.is_empty() {
            issues.push(ConfigIssue::warning(
                "plugins.allow_list",
                "quarantine enabled with an empty allow-list — no plugins will load",
            ));
        }
        if self.fanout.provider_priority.is_empty() {
            issues.push(ConfigIssue::warning(
                "fanout.provider_priority",
                "empty priority list — search results will keep arrival order",
            ));
        }

        issues
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "unparseable env override, ignoring");
                None
            }
        },
        Err(_) => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn error(field: &str, message: &str) -> ConfigIssue {
        ConfigIssue {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: &str) -> ConfigIssue {
        ConfigIssue {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}
