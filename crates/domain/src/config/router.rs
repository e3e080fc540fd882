use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent router & synthesis thresholds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Candidates below this keyword score are dropped.
    #[serde(default = "d_low_threshold")]
    pub low_threshold: f64,
    /// Top-M candidates kept after thresholding.
    #[serde(default = "d_max_candidates")]
    pub max_candidates: usize,
    /// Fixed boost added to capability scores related to the recent topic.
    #[serde(default = "d_context_boost")]
    pub context_boost: f64,
    /// Confidence assigned by the identity and affirmative guards.
    #[serde(default = "d_guard_confidence")]
    pub guard_confidence: f64,
    /// Composite score below which the synthesizer degrades gracefully.
    #[serde(default = "d_synthesis_floor")]
    pub synthesis_floor: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            low_threshold: d_low_threshold(),
            max_candidates: d_max_candidates(),
            context_boost: d_context_boost(),
            guard_confidence: d_guard_confidence(),
            synthesis_floor: d_synthesis_floor(),
        }
    }
}

fn d_low_threshold() -> f64 {
    0.30
}

fn d_max_candidates() -> usize {
    5
}

fn d_context_boost() -> f64 {
    0.30
}

fn d_guard_confidence() -> f64 {
    0.95
}

fn d_synthesis_floor() -> f64 {
    0.30
}
