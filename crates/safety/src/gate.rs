//! Policy table and gate decisions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};

use fame_domain::capability::Capability;
use fame_domain::config::SafetyConfig;
use fame_domain::error::{Error, Result};
use fame_domain::trace::TraceEvent;
use fame_plugins::EventBus;

use crate::audit::{AuditRecord, AuditRing};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Per-capability policy entry.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityPolicy {
    pub enabled: bool,
    pub risk: RiskLevel,
    pub requires_admin_token: bool,
    pub requires_sandbox: bool,
}

/// Where in the request lifecycle a gate check happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    /// Candidate filtering after classification.
    Filter,
    /// Race-safe final check immediately before invocation.
    Invoke,
}

impl GateStage {
    fn as_str(&self) -> &'static str {
        match self {
            GateStage::Filter => "filter",
            GateStage::Invoke => "invoke",
        }
    }
}

type PolicyTable = HashMap<Capability, CapabilityPolicy>;

/// Default policy: dangerous capabilities disabled behind an admin token,
/// code generation sandboxed, everything else enabled.
fn default_policy() -> PolicyTable {
    Capability::ALL
        .iter()
        .map(|cap| {
            let policy = match cap {
                Capability::Security | Capability::NetworkControl | Capability::SystemModify => {
                    CapabilityPolicy {
                        enabled: false,
                        risk: RiskLevel::Critical,
                        requires_admin_token: true,
                        requires_sandbox: false,
                    }
                }
                Capability::CodeGeneration => CapabilityPolicy {
                    enabled: true,
                    risk: RiskLevel::Medium,
                    requires_admin_token: false,
                    requires_sandbox: true,
                },
                Capability::Finance => CapabilityPolicy {
                    enabled: true,
                    risk: RiskLevel::Medium,
                    requires_admin_token: false,
                    requires_sandbox: false,
                },
                _ => CapabilityPolicy {
                    enabled: true,
                    risk: RiskLevel::Low,
                    requires_admin_token: false,
                    requires_sandbox: false,
                },
            };
            (*cap, policy)
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The capability safety gate.
///
/// Policy reads clone an `Arc` snapshot; policy writes swap the whole
/// table, so checks in flight keep a consistent view.
pub struct SafetyGate {
    policy: RwLock<Arc<PolicyTable>>,
    /// SHA-256 hashes of the configured admin tokens.
    admin_token_hashes: Vec<Vec<u8>>,
    audit: AuditRing,
    events: EventBus,
}

impl SafetyGate {
    /// Build the gate from config. Admin tokens are read once from the
    /// configured environment variable and stored only as hashes.
    pub fn from_config(config: &SafetyConfig, events: EventBus) -> Result<SafetyGate> {
        let mut policy = default_policy();
        for (tag, enabled) in &config.enabled_overrides {
            match Capability::parse(tag) {
                Some(cap) => {
                    if let Some(entry) = policy.get_mut(&cap) {
                        entry.enabled = *enabled;
                    }
                }
                None => {
                    tracing::warn!(capability = %tag, "unknown capability in safety overrides, ignoring");
                }
            }
        }

        let admin_token_hashes = match std::env::var(&config.admin_tokens_env) {
            Ok(raw) if !raw.is_empty() => raw
                .split(',')
                .map(|t| Sha256::digest(t.trim().as_bytes()).to_vec())
                .collect(),
            _ => Vec::new(),
        };
        if admin_token_hashes.is_empty() {
            tracing::warn!(
                env_var = %config.admin_tokens_env,
                "no admin tokens configured — dangerous capabilities cannot be enabled"
            );
        } else {
            tracing::info!(tokens = admin_token_hashes.len(), "admin tokens loaded");
        }

        let audit = AuditRing::new(config.audit_capacity, config.audit_path.as_deref())
            .map_err(Error::Io)?;

        Ok(SafetyGate {
            policy: RwLock::new(Arc::new(policy)),
            admin_token_hashes,
            audit,
            events,
        })
    }

    /// Whether `token` matches a configured admin token.
    pub fn admin_token_valid(&self, token: &str) -> bool {
        let hash = Sha256::digest(token.as_bytes()).to_vec();
        self.admin_token_hashes.iter().any(|h| h == &hash)
    }

    /// Evaluate one capability at one stage. Every call is audited.
    ///
    /// A disabled capability that requires an admin token is allowed for
    /// this query when a valid token is presented; otherwise denied.
    pub fn evaluate(
        &self,
        capability: Capability,
        admin_token: Option<&str>,
        handler_id: Option<&str>,
        stage: GateStage,
    ) -> bool {
        let policy = self.snapshot();
        let (allowed, reason) = match policy.get(&capability) {
            None => (false, "capability has no policy entry".to_owned()),
            Some(entry) if entry.enabled => (true, "enabled".to_owned()),
            Some(entry) if entry.requires_admin_token => match admin_token {
                Some(token) if self.admin_token_valid(token) => {
                    (true, "disabled capability enabled by admin token".to_owned())
                }
                Some(_) => (false, "invalid admin token".to_owned()),
                None => (false, "disabled; admin token required".to_owned()),
            },
            Some(_) => (false, "disabled by policy".to_owned()),
        };

        self.audit.record(AuditRecord {
            timestamp: chrono::Utc::now(),
            capability: capability.as_str().to_owned(),
            allowed,
            reason: reason.clone(),
            handler_id: handler_id.map(str::to_owned),
            stage: stage.as_str().to_owned(),
        });
        self.events.publish(TraceEvent::SafetyDecision {
            capability: capability.as_str().to_owned(),
            allowed,
            reason,
            handler_id: handler_id.map(str::to_owned),
        });

        allowed
    }

    /// Whether policy demands sandboxed execution for this capability.
    pub fn requires_sandbox(&self, capability: Capability) -> bool {
        self.snapshot()
            .get(&capability)
            .map(|p| p.requires_sandbox)
            .unwrap_or(false)
    }

    /// Enable or disable a capability at runtime. Dangerous capabilities
    /// need a valid admin token. The table is swapped atomically.
    pub fn set_enabled(
        &self,
        capability: Capability,
        enabled: bool,
        admin_token: Option<&str>,
    ) -> Result<()> {
        let needs_token = self
            .snapshot()
            .get(&capability)
            .map(|p| p.requires_admin_token)
            .unwrap_or(true);
        if needs_token && enabled {
            let token = admin_token.ok_or_else(|| {
                Error::Auth(format!("enabling {capability} requires an admin token"))
            })?;
            if !self.admin_token_valid(token) {
                return Err(Error::Auth("invalid admin token".into()));
            }
        }

        let mut guard = self.policy.write();
        let mut table = (**guard).clone();
        if let Some(entry) = table.get_mut(&capability) {
            entry.enabled = enabled;
        }
        *guard = Arc::new(table);

        tracing::info!(capability = %capability, enabled, "capability policy changed");
        Ok(())
    }

    /// A consistent snapshot of the policy table.
    pub fn snapshot(&self) -> Arc<PolicyTable> {
        self.policy.read().clone()
    }

    /// Recent audit records, newest last.
    pub fn recent_audit(&self, n: usize) -> Vec<AuditRecord> {
        self.audit.recent(n)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_with_env(env_name: &str) -> SafetyGate {
        let config = SafetyConfig {
            admin_tokens_env: env_name.into(),
            ..SafetyConfig::default()
        };
        SafetyGate::from_config(&config, EventBus::new()).unwrap()
    }

    #[test]
    fn dangerous_capabilities_denied_by_default() {
        let gate = gate_with_env("FAME_TEST_TOKENS_UNSET");
        assert!(!gate.evaluate(Capability::Security, None, None, GateStage::Filter));
        assert!(!gate.evaluate(Capability::NetworkControl, None, None, GateStage::Filter));
        assert!(!gate.evaluate(Capability::SystemModify, None, None, GateStage::Filter));
        assert!(gate.evaluate(Capability::WebSearch, None, None, GateStage::Filter));
    }

    #[test]
    fn admin_token_enables_per_query() {
        std::env::set_var("FAME_TEST_TOKENS_A", "sesame,open");
        let gate = gate_with_env("FAME_TEST_TOKENS_A");

        assert!(gate.evaluate(
            Capability::Security,
            Some("sesame"),
            Some("sec-scan"),
            GateStage::Invoke
        ));
        assert!(!gate.evaluate(
            Capability::Security,
            Some("wrong"),
            None,
            GateStage::Invoke
        ));
    }

    #[test]
    fn every_decision_is_audited() {
        let gate = gate_with_env("FAME_TEST_TOKENS_UNSET");
        gate.evaluate(Capability::WebSearch, None, Some("search"), GateStage::Filter);
        gate.evaluate(Capability::Security, None, None, GateStage::Invoke);

        let audit = gate.recent_audit(10);
        assert_eq!(audit.len(), 2);
        assert!(audit[0].allowed);
        assert_eq!(audit[0].stage, "filter");
        assert!(!audit[1].allowed);
        assert_eq!(audit[1].stage, "invoke");
    }

    #[test]
    fn code_generation_requires_sandbox() {
        let gate = gate_with_env("FAME_TEST_TOKENS_UNSET");
        assert!(gate.requires_sandbox(Capability::CodeGeneration));
        assert!(!gate.requires_sandbox(Capability::WebSearch));
    }

    #[test]
    fn set_enabled_swaps_policy() {
        std::env::set_var("FAME_TEST_TOKENS_B", "root-token");
        let gate = gate_with_env("FAME_TEST_TOKENS_B");

        // Enabling a dangerous capability without a token fails.
        assert!(gate
            .set_enabled(Capability::Security, true, None)
            .is_err());
        assert!(gate
            .set_enabled(Capability::Security, true, Some("bogus"))
            .is_err());

        gate.set_enabled(Capability::Security, true, Some("root-token"))
            .unwrap();
        assert!(gate.evaluate(Capability::Security, None, None, GateStage::Filter));

        // Disabling never needs a token.
        gate.set_enabled(Capability::Security, false, None).unwrap();
        assert!(!gate.evaluate(Capability::Security, None, None, GateStage::Filter));
    }

    #[test]
    fn config_overrides_apply() {
        let config = SafetyConfig {
            enabled_overrides: std::collections::HashMap::from([
                ("finance".to_owned(), false),
            ]),
            admin_tokens_env: "FAME_TEST_TOKENS_UNSET".into(),
            ..SafetyConfig::default()
        };
        let gate = SafetyGate::from_config(&config, EventBus::new()).unwrap();
        assert!(!gate.evaluate(Capability::Finance, None, None, GateStage::Filter));
    }
}
