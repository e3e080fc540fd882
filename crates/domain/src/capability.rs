//! Capability tags — what a handler can do.
//!
//! Capabilities are handler properties; intents are router output. The two
//! vocabularies are deliberately separate: the router maps an intent onto
//! the handlers whose declared capabilities serve it.

use serde::{Deserialize, Serialize};

/// Capability tag a handler may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Finance,
    WebSearch,
    CodeGeneration,
    Identity,
    Memory,
    Utility,
    Security,
    NetworkControl,
    SystemModify,
}

impl Capability {
    /// All known capabilities, used to validate plugin declarations.
    pub const ALL: &'static [Capability] = &[
        Capability::Finance,
        Capability::WebSearch,
        Capability::CodeGeneration,
        Capability::Identity,
        Capability::Memory,
        Capability::Utility,
        Capability::Security,
        Capability::NetworkControl,
        Capability::SystemModify,
    ];

    /// Capabilities that must be covered for the process to report ready.
    pub const CORE: &'static [Capability] = &[
        Capability::Identity,
        Capability::WebSearch,
        Capability::Utility,
    ];

    /// Capabilities disabled by default; enabling requires an admin token.
    pub const DANGEROUS: &'static [Capability] = &[
        Capability::Security,
        Capability::NetworkControl,
        Capability::SystemModify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Finance => "finance",
            Capability::WebSearch => "web_search",
            Capability::CodeGeneration => "code_generation",
            Capability::Identity => "identity",
            Capability::Memory => "memory",
            Capability::Utility => "utility",
            Capability::Security => "security",
            Capability::NetworkControl => "network_control",
            Capability::SystemModify => "system_modify",
        }
    }

    pub fn parse(s: &str) -> Option<Capability> {
        match s {
            "finance" => Some(Capability::Finance),
            "web_search" => Some(Capability::WebSearch),
            "code_generation" => Some(Capability::CodeGeneration),
            "identity" => Some(Capability::Identity),
            "memory" => Some(Capability::Memory),
            "utility" => Some(Capability::Utility),
            "security" => Some(Capability::Security),
            "network_control" => Some(Capability::NetworkControl),
            "system_modify" => Some(Capability::SystemModify),
            _ => None,
        }
    }

    /// Fixed source-quality constant used by the synthesizer's composite
    /// score. Identity/official answers outrank structured API data, which
    /// outranks search snippets.
    pub fn source_quality(&self) -> f64 {
        match self {
            Capability::Identity => 1.0,
            Capability::Finance | Capability::Memory | Capability::CodeGeneration => 0.8,
            Capability::Utility => 0.7,
            Capability::WebSearch => 0.5,
            Capability::Security | Capability::NetworkControl | Capability::SystemModify => 0.6,
        }
    }

    pub fn is_dangerous(&self) -> bool {
        Capability::DANGEROUS.contains(self)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_all_capabilities() {
        for cap in Capability::ALL {
            assert_eq!(Capability::parse(cap.as_str()), Some(*cap));
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(Capability::parse("quantum_trading"), None);
    }

    #[test]
    fn dangerous_set_is_dangerous() {
        for cap in Capability::DANGEROUS {
            assert!(cap.is_dangerous());
        }
        assert!(!Capability::WebSearch.is_dangerous());
    }

    #[test]
    fn identity_outranks_search_quality() {
        assert!(Capability::Identity.source_quality() > Capability::WebSearch.source_quality());
    }
}
