use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conversation buffer settings. Sessions are created on first use and
/// reaped once idle for longer than `idle_timeout_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Bounded turn capacity per session; oldest turns are evicted FIFO.
    /// Env override: `FAME_SESSION_TURNS`.
    #[serde(default = "d_max_turns")]
    pub max_turns: usize,
    /// Idle timeout before a session is reaped.
    /// Env override: `FAME_SESSION_IDLE_TIMEOUT_S`.
    #[serde(default = "d_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// How often the background reaper sweeps.
    #[serde(default = "d_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        SessionsConfig {
            max_turns: d_max_turns(),
            idle_timeout_secs: d_idle_timeout_secs(),
            reap_interval_secs: d_reap_interval_secs(),
        }
    }
}

fn d_max_turns() -> usize {
    5
}

fn d_idle_timeout_secs() -> u64 {
    1_800
}

fn d_reap_interval_secs() -> u64 {
    60
}
