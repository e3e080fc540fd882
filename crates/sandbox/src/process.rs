//! Process-level sandbox executor.
//!
//! Each invocation stages the snippet into a fresh temp directory, spawns
//! the interpreter as its own process with a cleared environment and
//! rlimit-backed caps, and force-kills it when the wall timeout fires.
//! `kill_on_drop` guarantees no child survives host-side cancellation.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use fame_domain::config::SandboxConfig;
use fame_domain::error::{Error, Result};
use fame_domain::sandbox::{KilledReason, SandboxLimits, SandboxReport};

use crate::{IsolationLevel, SandboxExecutor};

/// Reference sandbox: one process per invocation, rlimit caps, forced
/// teardown on timeout.
///
/// Network denial at this isolation level is best-effort: the cleared
/// environment removes proxy credentials, but a hostile snippet can still
/// open sockets. Deployments that need hard network denial put a container
/// executor in front of this one.
pub struct ProcessExecutor {
    config: SandboxConfig,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        ProcessExecutor {
            config: SandboxConfig::default(),
        }
    }
}

impl ProcessExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        ProcessExecutor { config }
    }

    fn snippet_filename(language: &str) -> &'static str {
        match language {
            "python" => "snippet.py",
            "javascript" => "snippet.js",
            _ => "snippet.sh",
        }
    }
}

#[async_trait::async_trait]
impl SandboxExecutor for ProcessExecutor {
    async fn run(
        &self,
        code: &str,
        language: &str,
        limits: &SandboxLimits,
    ) -> Result<SandboxReport> {
        let interpreter = self
            .config
            .interpreters
            .get(language)
            .ok_or_else(|| Error::Sandbox(format!("unsupported language '{language}'")))?
            .clone();

        // Preparing: stage the snippet into a throwaway directory.
        let staging = tempfile::tempdir().map_err(Error::Io)?;
        let snippet = staging.path().join(Self::snippet_filename(language));
        std::fs::write(&snippet, code)?;
        tracing::debug!(language = %language, interpreter = %interpreter, "sandbox staged");

        let mut cmd = build_command(&interpreter, &snippet, limits);
        cmd.current_dir(staging.path())
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Sandbox(format!("failed to spawn sandbox process: {e}")))?;

        // Running: drain both pipes concurrently so a chatty child never
        // blocks on a full pipe, capping what we keep.
        let cap = self.config.capture_bytes;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(read_capped(stdout_pipe, cap));
        let stderr_task = tokio::spawn(read_capped(stderr_pipe, cap));

        let (status, mut killed_reason) = tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| Error::Sandbox(format!("waiting for sandbox process: {e}")))?;
                (status, KilledReason::None)
            }
            _ = tokio::time::sleep(limits.wall) => {
                let _ = child.start_kill();
                let status = child
                    .wait()
                    .await
                    .map_err(|e| Error::Sandbox(format!("reaping timed-out sandbox: {e}")))?;
                (status, KilledReason::Timeout)
            }
        };

        // Collecting.
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let wall_ms = started.elapsed().as_millis() as u64;

        let exit_code = status.code().unwrap_or(-1);
        if killed_reason == KilledReason::None {
            killed_reason = classify_signal_exit(&status);
        }

        let report = SandboxReport {
            exit_code,
            stdout_truncated: String::from_utf8_lossy(&stdout).into_owned(),
            stderr_truncated: String::from_utf8_lossy(&stderr).into_owned(),
            wall_ms,
            peak_memory_bytes: children_peak_rss_bytes(),
            killed_reason,
        };

        tracing::debug!(
            exit_code = report.exit_code,
            wall_ms = report.wall_ms,
            killed_reason = ?report.killed_reason,
            "sandbox terminated"
        );

        // Terminated: `staging` and the child guard drop here; the temp
        // directory is removed and any straggler process is killed.
        Ok(report)
    }

    fn isolation(&self) -> IsolationLevel {
        IsolationLevel::Process
    }
}

/// Build the interpreter command with rlimit caps applied.
///
/// On Unix the caps ride through a `sh` prelude: address-space rlimit for
/// the memory cap and a CPU-time rlimit derived from `wall × cpu_share`.
#[cfg(unix)]
fn build_command(interpreter: &str, snippet: &std::path::Path, limits: &SandboxLimits) -> Command {
    let mem_kib = limits.memory_bytes / 1024;
    let cpu_secs = (limits.wall.as_secs_f64() * limits.cpu_share).ceil().max(1.0) as u64;
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(format!(
        "ulimit -v {mem_kib} 2>/dev/null; ulimit -t {cpu_secs} 2>/dev/null; \
         exec {interpreter} '{}'",
        snippet.display()
    ));
    cmd
}

#[cfg(not(unix))]
fn build_command(interpreter: &str, snippet: &std::path::Path, _limits: &SandboxLimits) -> Command {
    let mut cmd = Command::new(interpreter);
    cmd.arg(snippet);
    cmd
}

/// Read a pipe to EOF, keeping at most `cap` bytes.
async fn read_capped<R>(pipe: Option<R>, cap: usize) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let Some(mut pipe) = pipe else {
        return Vec::new();
    };
    let mut chunk = vec![0u8; 8192];
    let mut kept = Vec::new();
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if kept.len() < cap {
                    let take = n.min(cap - kept.len());
                    kept.extend_from_slice(&chunk[..take]);
                }
                // Past the cap we keep draining so the child never stalls
                // on a full pipe.
            }
        }
    }
    kept
}

/// Map a signal-terminated exit onto a kill reason. Rlimit breaches
/// surface as SIGKILL or SIGABRT from the kernel/allocator.
#[cfg(unix)]
fn classify_signal_exit(status: &std::process::ExitStatus) -> KilledReason {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(libc::SIGKILL) | Some(libc::SIGABRT) => KilledReason::Memory,
        Some(_) => KilledReason::Other,
        None => KilledReason::None,
    }
}

#[cfg(not(unix))]
fn classify_signal_exit(_status: &std::process::ExitStatus) -> KilledReason {
    KilledReason::None
}

/// Peak RSS of reaped children in bytes.
///
/// `getrusage(RUSAGE_CHILDREN)` reports the maximum across all children the
/// process has reaped, so concurrent invocations share the high-water mark;
/// good enough for the report's observability purpose.
#[cfg(unix)]
fn children_peak_rss_bytes() -> u64 {
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_CHILDREN, &mut usage) == 0 {
            (usage.ru_maxrss as u64) * 1024
        } else {
            0
        }
    }
}

#[cfg(not(unix))]
fn children_peak_rss_bytes() -> u64 {
    0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limits(wall: Duration) -> SandboxLimits {
        SandboxLimits {
            wall,
            ..SandboxLimits::default()
        }
    }

    #[tokio::test]
    async fn clean_run_captures_stdout() {
        let executor = ProcessExecutor::default();
        let report = executor
            .run("echo hello from the box", "shell", &limits(Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(report.exit_code, 0);
        assert_eq!(report.killed_reason, KilledReason::None);
        assert!(report.stdout_truncated.contains("hello from the box"));
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn stderr_is_captured_separately() {
        let executor = ProcessExecutor::default();
        let report = executor
            .run("echo oops >&2; exit 3", "shell", &limits(Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(report.exit_code, 3);
        assert!(report.stderr_truncated.contains("oops"));
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn wall_timeout_kills_the_process() {
        let executor = ProcessExecutor::default();
        let report = executor
            .run("sleep 30", "shell", &limits(Duration::from_millis(500)))
            .await
            .unwrap();

        assert_eq!(report.killed_reason, KilledReason::Timeout);
        assert!(report.wall_ms >= 450, "wall_ms = {}", report.wall_ms);
        assert!(report.wall_ms < 5_000, "wall_ms = {}", report.wall_ms);
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn output_is_truncated_to_the_budget() {
        let config = SandboxConfig {
            capture_bytes: 128,
            ..SandboxConfig::default()
        };
        let executor = ProcessExecutor::new(config);
        let report = executor
            .run(
                "i=0; while [ $i -lt 200 ]; do echo aaaaaaaaaaaaaaaa; i=$((i+1)); done",
                "shell",
                &limits(Duration::from_secs(10)),
            )
            .await
            .unwrap();

        assert_eq!(report.exit_code, 0);
        assert!(report.stdout_truncated.len() <= 128);
    }

    #[tokio::test]
    async fn unknown_language_is_rejected() {
        let executor = ProcessExecutor::default();
        let result = executor
            .run("whatever", "cobol", &limits(Duration::from_secs(1)))
            .await;
        assert!(matches!(result, Err(Error::Sandbox(_))));
    }
}
