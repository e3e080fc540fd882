//! Keyword tables mapping query text onto capability scores.

use std::collections::HashMap;

use fame_domain::capability::Capability;

/// Score contributed by each keyword hit. One hit clears the default
/// routing threshold exactly.
const HIT_WEIGHT: f64 = 0.30;

/// Keyword table per capability. Single-word entries match whole tokens;
/// multi-word entries match as substrings of the normalized text.
fn capability_keywords() -> Vec<(Capability, &'static [&'static str])> {
    vec![
        (
            Capability::Finance,
            &[
                "stock", "stocks", "price", "market", "portfolio", "invest",
                "investment", "crypto", "bitcoin", "ethereum", "ticker",
                "shares", "earnings", "dividend", "trading",
            ][..],
        ),
        (
            Capability::WebSearch,
            &[
                "search", "find", "look up", "latest", "news", "what is",
                "who is", "where is", "when did", "website", "article",
            ][..],
        ),
        (
            Capability::CodeGeneration,
            &[
                "code", "script", "program", "function", "write a", "build",
                "exe", "executable", "compile", "python", "javascript",
                "implement", "generate", "scanner",
            ][..],
        ),
        (
            Capability::Memory,
            &[
                "remember", "recall", "last time", "previously", "you said",
                "forget", "remind me what",
            ][..],
        ),
        (
            Capability::Utility,
            &[
                "time", "date", "today", "convert", "calculate", "timer",
                "timezone", "clock",
            ][..],
        ),
        (
            Capability::Security,
            &[
                "vulnerability", "exploit", "port scan", "penetration",
                "malware", "password crack",
            ][..],
        ),
        (
            Capability::NetworkControl,
            &["wifi", "network", "firewall", "vpn", "bandwidth"][..],
        ),
        (
            Capability::SystemModify,
            &["install", "uninstall", "registry", "reboot", "system setting"][..],
        ),
    ]
}

/// Per-capability keyword scores for one query.
#[derive(Debug, Default)]
pub struct KeywordScores {
    /// capability → (score, matched keywords).
    pub scores: HashMap<Capability, (f64, Vec<String>)>,
}

impl KeywordScores {
    pub fn score_of(&self, capability: Capability) -> f64 {
        self.scores.get(&capability).map(|(s, _)| *s).unwrap_or(0.0)
    }

    /// All matched keywords across capabilities, for the feature vector.
    pub fn matched_keywords(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .scores
            .values()
            .flat_map(|(_, kws)| kws.iter().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

/// Tokenize and score the text against every capability table.
pub fn score(text: &str) -> KeywordScores {
    let normalized = text.to_lowercase();
    let tokens: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let mut scores = HashMap::new();
    for (capability, keywords) in capability_keywords() {
        let mut hits = Vec::new();
        for keyword in keywords {
            let matched = if keyword.contains(' ') {
                normalized.contains(keyword)
            } else {
                tokens.contains(keyword)
            };
            if matched {
                hits.push((*keyword).to_owned());
            }
        }
        if !hits.is_empty() {
            let score = (hits.len() as f64 * HIT_WEIGHT).min(1.0);
            scores.insert(capability, (score, hits));
        }
    }

    KeywordScores { scores }
}
