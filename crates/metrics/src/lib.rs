//! Health and metrics.
//!
//! Per-handler rolling counters and latency rings, plus process-level
//! gauges. Counters are atomic increments; the latency ring uses atomic
//! slots so the hot path never takes a lock. Percentiles are computed on
//! snapshot, not on record.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use fame_domain::result::ErrorKind;

/// Latency samples kept per handler.
const LATENCY_RING_SIZE: usize = 256;

/// Recent outcomes kept per handler for the readiness ok-rate window.
const OUTCOME_WINDOW: usize = 50;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-handler stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ERROR_KINDS: &[ErrorKind] = &[
    ErrorKind::Timeout,
    ErrorKind::Cancelled,
    ErrorKind::Exception,
    ErrorKind::Denied,
    ErrorKind::Unavailable,
    ErrorKind::BadInput,
    ErrorKind::SandboxFailed,
];

fn kind_index(kind: ErrorKind) -> usize {
    ERROR_KINDS
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(ERROR_KINDS.len() - 1)
}

struct HandlerStats {
    invocations: AtomicU64,
    ok: AtomicU64,
    errors: [AtomicU64; 7],
    latency_ring: Vec<AtomicU64>,
    latency_next: AtomicUsize,
    latency_count: AtomicUsize,
    /// Recent ok/err outcomes for the readiness window.
    outcomes: Mutex<VecDeque<bool>>,
}

impl HandlerStats {
    fn new() -> HandlerStats {
        HandlerStats {
            invocations: AtomicU64::new(0),
            ok: AtomicU64::new(0),
            errors: Default::default(),
            latency_ring: (0..LATENCY_RING_SIZE).map(|_| AtomicU64::new(0)).collect(),
            latency_next: AtomicUsize::new(0),
            latency_count: AtomicUsize::new(0),
            outcomes: Mutex::new(VecDeque::with_capacity(OUTCOME_WINDOW)),
        }
    }

    fn record(&self, ok: bool, error_kind: Option<ErrorKind>, latency_ms: u64) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.ok.fetch_add(1, Ordering::Relaxed);
        } else if let Some(kind) = error_kind {
            self.errors[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
        }

        let slot = self.latency_next.fetch_add(1, Ordering::Relaxed) % LATENCY_RING_SIZE;
        self.latency_ring[slot].store(latency_ms, Ordering::Relaxed);
        // Saturates at ring size; only used to know how much of the ring
        // is meaningful.
        let _ = self
            .latency_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                (c < LATENCY_RING_SIZE).then_some(c + 1)
            });

        let mut outcomes = self.outcomes.lock();
        if outcomes.len() >= OUTCOME_WINDOW {
            outcomes.pop_front();
        }
        outcomes.push_back(ok);
    }

    fn latencies(&self) -> Vec<u64> {
        let count = self.latency_count.load(Ordering::Relaxed);
        self.latency_ring[..count]
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .collect()
    }

    /// Fraction of ok outcomes over the recent window. A handler that was
    /// never invoked counts as healthy.
    fn ok_rate(&self) -> f64 {
        let outcomes = self.outcomes.lock();
        if outcomes.is_empty() {
            return 1.0;
        }
        let ok = outcomes.iter().filter(|o| **o).count();
        ok as f64 / outcomes.len() as f64
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshots
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct HandlerMetrics {
    pub handler_id: String,
    pub invocations: u64,
    pub ok: u64,
    pub errors: HashMap<String, u64>,
    pub ok_rate: f64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub uptime_secs: u64,
    pub active_requests: u64,
    pub sessions: usize,
    pub sandbox_executions: u64,
    pub requests_last_minute: usize,
    pub responses_total: u64,
    pub responses_partial: u64,
    /// Lifecycle transitions seen, by stage name.
    pub stages: HashMap<String, u64>,
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64) * p).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-wide metrics registry. Cheap to clone behind an `Arc`.
pub struct Metrics {
    started_at: Instant,
    handlers: RwLock<HashMap<String, Arc<HandlerStats>>>,
    active_requests: AtomicU64,
    sandbox_executions: AtomicU64,
    responses_total: AtomicU64,
    responses_partial: AtomicU64,
    request_times: Mutex<VecDeque<Instant>>,
    stages: Mutex<HashMap<String, u64>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics {
            started_at: Instant::now(),
            handlers: RwLock::new(HashMap::new()),
            active_requests: AtomicU64::new(0),
            sandbox_executions: AtomicU64::new(0),
            responses_total: AtomicU64::new(0),
            responses_partial: AtomicU64::new(0),
            request_times: Mutex::new(VecDeque::new()),
            stages: Mutex::new(HashMap::new()),
        }
    }

    /// Count one lifecycle transition.
    pub fn record_stage(&self, stage: &str) {
        *self.stages.lock().entry(stage.to_owned()).or_insert(0) += 1;
    }

    fn stats_for(&self, handler_id: &str) -> Arc<HandlerStats> {
        {
            let handlers = self.handlers.read();
            if let Some(stats) = handlers.get(handler_id) {
                return stats.clone();
            }
        }
        let mut handlers = self.handlers.write();
        handlers
            .entry(handler_id.to_owned())
            .or_insert_with(|| Arc::new(HandlerStats::new()))
            .clone()
    }

    /// Record one handler invocation outcome.
    pub fn record_invocation(
        &self,
        handler_id: &str,
        ok: bool,
        error_kind: Option<ErrorKind>,
        latency_ms: u64,
    ) {
        self.stats_for(handler_id).record(ok, error_kind, latency_ms);
    }

    /// Track an in-flight request; the guard decrements on drop.
    pub fn request_started(self: &Arc<Self>) -> ActiveRequestGuard {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        let mut times = self.request_times.lock();
        let now = Instant::now();
        times.push_back(now);
        while let Some(front) = times.front() {
            if now.duration_since(*front).as_secs() >= 60 {
                times.pop_front();
            } else {
                break;
            }
        }
        ActiveRequestGuard {
            metrics: self.clone(),
        }
    }

    pub fn record_response(&self, partial: bool) {
        self.responses_total.fetch_add(1, Ordering::Relaxed);
        if partial {
            self.responses_partial.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_sandbox_execution(&self) {
        self.sandbox_executions.fetch_add(1, Ordering::Relaxed);
    }

    /// Ok-rate of one handler over its recent window; 1.0 if unknown.
    pub fn ok_rate(&self, handler_id: &str) -> f64 {
        self.handlers
            .read()
            .get(handler_id)
            .map(|s| s.ok_rate())
            .unwrap_or(1.0)
    }

    /// Per-handler snapshot, sorted by handler id.
    pub fn handler_snapshot(&self) -> Vec<HandlerMetrics> {
        let handlers = self.handlers.read();
        let mut snapshot: Vec<HandlerMetrics> = handlers
            .iter()
            .map(|(id, stats)| {
                let mut latencies = stats.latencies();
                latencies.sort_unstable();
                let errors = ERROR_KINDS
                    .iter()
                    .map(|kind| {
                        (
                            kind.as_str().to_owned(),
                            stats.errors[kind_index(*kind)].load(Ordering::Relaxed),
                        )
                    })
                    .filter(|(_, count)| *count > 0)
                    .collect();
                HandlerMetrics {
                    handler_id: id.clone(),
                    invocations: stats.invocations.load(Ordering::Relaxed),
                    ok: stats.ok.load(Ordering::Relaxed),
                    errors,
                    ok_rate: stats.ok_rate(),
                    latency_p50_ms: percentile(&latencies, 0.50),
                    latency_p95_ms: percentile(&latencies, 0.95),
                    latency_p99_ms: percentile(&latencies, 0.99),
                }
            })
            .collect();
        snapshot.sort_by(|a, b| a.handler_id.cmp(&b.handler_id));
        snapshot
    }

    pub fn process_snapshot(&self, sessions: usize) -> ProcessMetrics {
        let now = Instant::now();
        let requests_last_minute = {
            let times = self.request_times.lock();
            times
                .iter()
                .filter(|t| now.duration_since(**t).as_secs() < 60)
                .count()
        };
        ProcessMetrics {
            uptime_secs: self.started_at.elapsed().as_secs(),
            active_requests: self.active_requests.load(Ordering::Relaxed),
            sessions,
            sandbox_executions: self.sandbox_executions.load(Ordering::Relaxed),
            requests_last_minute,
            responses_total: self.responses_total.load(Ordering::Relaxed),
            responses_partial: self.responses_partial.load(Ordering::Relaxed),
            stages: self.stages.lock().clone(),
        }
    }

    /// Total invocations of one handler, for test assertions on "no call
    /// happened" properties.
    pub fn invocations(&self, handler_id: &str) -> u64 {
        self.handlers
            .read()
            .get(handler_id)
            .map(|s| s.invocations.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// RAII guard for the active-request gauge.
pub struct ActiveRequestGuard {
    metrics: Arc<Metrics>,
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.metrics.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
