use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use fame_domain::config::SessionsConfig;
use fame_domain::trace::TraceEvent;
use fame_domain::turn::{Turn, TurnRole};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Session {
    turns: VecDeque<Turn>,
    last_activity: DateTime<Utc>,
}

/// Read-only view of one session for listing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub turns: usize,
    pub last_activity: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thread-safe map of session id → bounded turn buffer.
///
/// The outer map lock is held only to resolve the slot; each session has
/// its own lock, so sessions never contend with each other.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
    max_turns: usize,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(config: &SessionsConfig) -> SessionStore {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            max_turns: config.max_turns.max(1),
            idle_timeout: Duration::seconds(config.idle_timeout_secs as i64),
        }
    }

    fn slot(&self, session_id: &str) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(session_id.to_owned())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Session {
                    turns: VecDeque::with_capacity(self.max_turns),
                    last_activity: Utc::now(),
                }))
            })
            .clone()
    }

    /// Append a turn, evicting the oldest when over capacity.
    ///
    /// Timestamps within a session are kept strictly monotonic: a turn
    /// carrying a timestamp at or before the previous one is stamped just
    /// after it.
    pub fn append(&self, session_id: &str, mut turn: Turn) {
        let slot = self.slot(session_id);
        let mut session = slot.lock();

        if let Some(last) = session.turns.back() {
            if turn.timestamp <= last.timestamp {
                turn.timestamp = last.timestamp + Duration::milliseconds(1);
            }
        }

        if session.turns.len() >= self.max_turns {
            session.turns.pop_front();
        }
        session.turns.push_back(turn);
        session.last_activity = Utc::now();
    }

    /// The last `k` turns, oldest first.
    pub fn recent(&self, session_id: &str, k: usize) -> Vec<Turn> {
        let sessions = self.sessions.lock();
        let Some(slot) = sessions.get(session_id) else {
            return Vec::new();
        };
        let slot = slot.clone();
        drop(sessions);

        let session = slot.lock();
        session
            .turns
            .iter()
            .skip(session.turns.len().saturating_sub(k))
            .cloned()
            .collect()
    }

    /// The most recent assistant turn, if any.
    pub fn last_assistant_turn(&self, session_id: &str) -> Option<Turn> {
        self.recent(session_id, self.max_turns)
            .into_iter()
            .rev()
            .find(|t| t.role == TurnRole::Assistant)
    }

    /// Drop all turns for a session. The session itself stays resolvable.
    pub fn clear(&self, session_id: &str) {
        let sessions = self.sessions.lock();
        if let Some(slot) = sessions.get(session_id) {
            let slot = slot.clone();
            drop(sessions);
            let mut session = slot.lock();
            session.turns.clear();
            session.last_activity = Utc::now();
        }
    }

    /// Remove sessions idle past the timeout. Returns how many went.
    pub fn reap(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|id, slot| {
            let session = slot.lock();
            let idle = now.signed_duration_since(session.last_activity);
            let keep = idle < self.idle_timeout;
            if !keep {
                TraceEvent::SessionReaped {
                    session_id: id.clone(),
                    idle_secs: idle.num_seconds(),
                }
                .emit();
            }
            keep
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Snapshots of every live session, for the sessions API.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.lock();
        sessions
            .iter()
            .map(|(id, slot)| {
                let session = slot.lock();
                SessionSnapshot {
                    session_id: id.clone(),
                    turns: session.turns.len(),
                    last_activity: session.last_activity,
                }
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
