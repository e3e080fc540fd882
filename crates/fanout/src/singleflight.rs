//! Fallback-spam guard: identical queries share one in-flight execution.

use std::collections::HashMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use fame_domain::trace::TraceEvent;

/// Hash of the normalized query text, used as the single-flight key.
pub fn query_hash(text: &str) -> u64 {
    let normalized: String = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    normalized.hash(&mut hasher);
    hasher.finish()
}

enum Role<T> {
    Leader(watch::Sender<Option<T>>),
    Follower(watch::Receiver<Option<T>>),
}

/// Coalesces identical work started inside a short window.
///
/// The first caller for a key becomes the leader and runs the work; later
/// callers for the same key block on the leader's result. The entry stays
/// live for the configured window after completion so immediate repeats
/// still share the value.
pub struct SingleFlight<T: Clone> {
    window: Duration,
    inflight: Arc<Mutex<HashMap<u64, watch::Receiver<Option<T>>>>>,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new(window: Duration) -> SingleFlight<T> {
        SingleFlight {
            window,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `work` for `key`, or join an execution already in flight.
    pub async fn run<F, Fut>(&self, key: u64, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let role = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&key) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key, rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Follower(mut rx) => {
                TraceEvent::SingleFlightJoined { query_hash: key }.emit();
                loop {
                    if let Some(value) = rx.borrow().clone() {
                        return value;
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
                // Leader vanished without publishing (cancelled mid-run).
                // Fall back to doing the work ourselves.
                work().await
            }
            Role::Leader(tx) => {
                let value = work().await;
                let _ = tx.send(Some(value.clone()));

                // Keep the entry around for the window, then forget it.
                let inflight = self.inflight.clone();
                let window = self.window;
                tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    inflight.lock().remove(&key);
                });

                value
            }
        }
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hash_normalizes_case_and_whitespace() {
        assert_eq!(query_hash("What Is Rust"), query_hash("  what   is rust "));
        assert_ne!(query_hash("what is rust"), query_hash("what is go"));
    }

    #[tokio::test]
    async fn concurrent_identical_queries_execute_once() {
        let flight = Arc::new(SingleFlight::<String>::new(Duration::from_secs(5)));
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let flight = flight.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run(7, || async {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        "answer".to_owned()
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "answer");
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_run_independently() {
        let flight = SingleFlight::<u32>::new(Duration::from_millis(10));
        let a = flight.run(1, || async { 1 }).await;
        let b = flight.run(2, || async { 2 }).await;
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn entry_expires_after_window() {
        let flight = SingleFlight::<u32>::new(Duration::from_millis(20));
        flight.run(9, || async { 1 }).await;
        assert_eq!(flight.inflight_len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(flight.inflight_len(), 0);

        // A repeat after expiry runs fresh work.
        let v = flight.run(9, || async { 2 }).await;
        assert_eq!(v, 2);
    }

    #[tokio::test]
    async fn late_caller_inside_window_gets_cached_value() {
        let flight = SingleFlight::<u32>::new(Duration::from_secs(5));
        let first = flight.run(3, || async { 42 }).await;
        // Work already finished; a second call inside the window must not
        // re-execute.
        let second = flight.run(3, || async { 99 }).await;
        assert_eq!(first, 42);
        assert_eq!(second, 42);
    }
}
