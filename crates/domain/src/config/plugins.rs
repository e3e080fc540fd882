use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plugin registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Quarantine mode: only allow-listed plugin ids load.
    /// Env trigger: `FAME_QUARANTINE_CORE` (any value).
    #[serde(default)]
    pub quarantine: bool,
    /// The quarantine allow-list.
    #[serde(default = "d_allow_list")]
    pub allow_list: Vec<String>,
    /// Budget for each plugin's `init` during startup.
    #[serde(default = "d_startup_budget_secs")]
    pub startup_budget_secs: u64,
    /// Built-in HTTP search provider adapters.
    #[serde(default)]
    pub search_providers: Vec<SearchProviderConfig>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        PluginsConfig {
            quarantine: false,
            allow_list: d_allow_list(),
            startup_budget_secs: d_startup_budget_secs(),
            search_providers: Vec::new(),
        }
    }
}

fn d_allow_list() -> Vec<String> {
    vec!["identity".into(), "clock".into(), "web_search".into()]
}

fn d_startup_budget_secs() -> u64 {
    5
}

/// One configured HTTP search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProviderConfig {
    /// Stable provider id (`"serpapi"`, `"google_cse"`, `"bing"`, `"news"`).
    pub id: String,
    /// Endpoint queried with `?q=<query>`.
    pub endpoint: String,
    /// Environment variable holding the provider API key, if required.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "d_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn d_provider_timeout_ms() -> u64 {
    10_000
}
