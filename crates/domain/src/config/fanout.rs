use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parallel fan-out
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Shared deadline for a fan-out run, and the default per-request
    /// deadline. Env override: `FAME_QUERY_TIMEOUT` (seconds).
    #[serde(default = "d_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Identical queries inside this window share one in-flight execution.
    #[serde(default = "d_single_flight_window_ms")]
    pub single_flight_window_ms: u64,
    /// Search providers ranked best-first.
    #[serde(default = "d_provider_priority")]
    pub provider_priority: Vec<String>,
    /// Cap on merged search results after dedup.
    #[serde(default = "d_max_results")]
    pub max_results: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        FanoutConfig {
            query_timeout_secs: d_query_timeout_secs(),
            single_flight_window_ms: d_single_flight_window_ms(),
            provider_priority: d_provider_priority(),
            max_results: d_max_results(),
        }
    }
}

fn d_query_timeout_secs() -> u64 {
    60
}

fn d_single_flight_window_ms() -> u64 {
    5_000
}

fn d_provider_priority() -> Vec<String> {
    vec![
        "serpapi".into(),
        "google_cse".into(),
        "bing".into(),
        "news".into(),
    ]
}

fn d_max_results() -> usize {
    10
}
