//! The concurrent region: N invokers, one deadline.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use fame_domain::error::Error;
use fame_domain::result::{ErrorKind, HandlerResult};
use fame_domain::trace::TraceEvent;

/// One invoker handed to the engine.
pub struct FanoutTask {
    pub task_id: String,
    pub future: BoxFuture<'static, fame_domain::Result<HandlerResult>>,
}

impl FanoutTask {
    pub fn new(
        task_id: impl Into<String>,
        future: BoxFuture<'static, fame_domain::Result<HandlerResult>>,
    ) -> FanoutTask {
        FanoutTask {
            task_id: task_id.into(),
            future,
        }
    }
}

/// Runs invokers concurrently under a shared deadline.
///
/// Isolation guarantees:
/// - a panic in one invoker becomes a failed result (`exception`) and
///   never affects the others;
/// - on deadline, outstanding invokers are cancelled and recorded as
///   `timeout`; whatever they eventually produce is discarded;
/// - on upstream cancellation, results that already arrived are kept and
///   the rest are recorded as `cancelled`.
#[derive(Default)]
pub struct FanoutEngine;

impl FanoutEngine {
    pub fn new() -> FanoutEngine {
        FanoutEngine
    }

    pub async fn run(
        &self,
        query_id: &str,
        tasks: Vec<FanoutTask>,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Vec<HandlerResult> {
        let started = Instant::now();
        TraceEvent::FanoutStarted {
            query_id: query_id.to_owned(),
            tasks: tasks.len(),
            deadline_ms: deadline.as_millis() as u64,
        }
        .emit();

        let mut outstanding: HashSet<String> =
            tasks.iter().map(|t| t.task_id.clone()).collect();
        let mut join_set: JoinSet<(String, HandlerResult)> = JoinSet::new();

        for task in tasks {
            let task_id = task.task_id;
            join_set.spawn(run_isolated(task_id, task.future));
        }

        let mut results: Vec<HandlerResult> = Vec::new();
        let deadline_sleep = tokio::time::sleep(deadline);
        tokio::pin!(deadline_sleep);

        loop {
            tokio::select! {
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok((task_id, result))) => {
                        outstanding.remove(&task_id);
                        results.push(result);
                    }
                    // Aborted task; its timeout/cancel record is handled below.
                    Some(Err(_)) => {}
                },
                _ = &mut deadline_sleep => {
                    cancel.cancel();
                    join_set.abort_all();
                    for task_id in outstanding.drain() {
                        results.push(
                            HandlerResult::failed(task_id, ErrorKind::Timeout)
                                .with_latency(deadline.as_millis() as u64),
                        );
                    }
                    break;
                }
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    for task_id in outstanding.drain() {
                        results.push(HandlerResult::failed(task_id, ErrorKind::Cancelled));
                    }
                    break;
                }
            }
        }

        let ok = results.iter().filter(|r| r.ok).count();
        let timed_out = results
            .iter()
            .filter(|r| r.error_kind == Some(ErrorKind::Timeout))
            .count();
        TraceEvent::FanoutCompleted {
            query_id: query_id.to_owned(),
            ok,
            failed: results.len() - ok,
            timed_out,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        results
    }
}

/// Run one invoker, folding errors and panics into a failed result.
async fn run_isolated(
    task_id: String,
    future: BoxFuture<'static, fame_domain::Result<HandlerResult>>,
) -> (String, HandlerResult) {
    let started = Instant::now();
    let outcome = std::panic::AssertUnwindSafe(future).catch_unwind().await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(Ok(mut result)) => {
            if result.latency_ms == 0 {
                result.latency_ms = latency_ms;
            }
            result
        }
        Ok(Err(error)) => {
            let kind = match error {
                Error::Timeout(_) => ErrorKind::Timeout,
                Error::Cancelled(_) => ErrorKind::Cancelled,
                _ => ErrorKind::Exception,
            };
            tracing::warn!(task_id = %task_id, error = %error, "invoker failed");
            HandlerResult::failed(task_id.clone(), kind).with_latency(latency_ms)
        }
        Err(_) => {
            tracing::error!(task_id = %task_id, "invoker panicked");
            HandlerResult::failed(task_id.clone(), ErrorKind::Exception)
                .with_latency(latency_ms)
        }
    };

    (task_id, result)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
