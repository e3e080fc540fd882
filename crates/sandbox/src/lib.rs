//! Sandboxed execution of untrusted code snippets.
//!
//! The executor contract is deliberately small: hand it a code blob, a
//! language tag, and mandatory limits; get back a terminal
//! [`SandboxReport`]. Intermediate states (staging, running, collecting)
//! are internal — callers only ever observe the report.
//!
//! [`ProcessExecutor`] is the reference implementation: per-invocation
//! process isolation with rlimit-backed caps. [`LocalExecutor`] exists for
//! development and refuses to run whenever the limits demand isolation it
//! cannot provide.

pub mod process;

pub use process::ProcessExecutor;

use fame_domain::error::{Error, Result};
use fame_domain::sandbox::{NetworkPolicy, SandboxLimits, SandboxReport};

/// How strongly an executor isolates the code it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IsolationLevel {
    /// No isolation at all (development only).
    None,
    /// Separate process with rlimit caps; no network namespace.
    Process,
    /// Full container isolation.
    Container,
}

/// Runs one code blob under mandatory caps.
///
/// Invocations are independent: implementations create, execute, and tear
/// down their isolation per call, and must guarantee cleanup on every exit
/// path — no leaked child processes, including host-side cancellation.
#[async_trait::async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn run(
        &self,
        code: &str,
        language: &str,
        limits: &SandboxLimits,
    ) -> Result<SandboxReport>;

    fn isolation(&self) -> IsolationLevel;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Development executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Development-only executor with no isolation.
///
/// Refuses any invocation whose limits demand network denial, because a
/// bare process on the host cannot enforce it.
#[derive(Default)]
pub struct LocalExecutor {
    inner: ProcessExecutor,
}

impl LocalExecutor {
    pub fn new(config: fame_domain::config::SandboxConfig) -> Self {
        LocalExecutor {
            inner: ProcessExecutor::new(config),
        }
    }
}

#[async_trait::async_trait]
impl SandboxExecutor for LocalExecutor {
    async fn run(
        &self,
        code: &str,
        language: &str,
        limits: &SandboxLimits,
    ) -> Result<SandboxReport> {
        if limits.network == NetworkPolicy::Denied {
            return Err(Error::Sandbox(
                "local executor cannot enforce network denial; use the process executor \
                 or allow network in the sandbox limits"
                    .into(),
            ));
        }
        self.inner.run(code, language, limits).await
    }

    fn isolation(&self) -> IsolationLevel {
        IsolationLevel::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_executor_refuses_network_denial() {
        let executor = LocalExecutor::default();
        let limits = SandboxLimits::default(); // network: Denied
        let result = executor.run("echo hi", "shell", &limits).await;
        assert!(matches!(result, Err(Error::Sandbox(_))));
    }

    #[test]
    fn isolation_levels_are_ordered() {
        assert!(IsolationLevel::None < IsolationLevel::Process);
        assert!(IsolationLevel::Process < IsolationLevel::Container);
    }
}
