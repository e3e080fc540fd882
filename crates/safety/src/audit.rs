//! Bounded audit trail for safety decisions.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// One safety decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub capability: String,
    pub allowed: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler_id: Option<String>,
    /// `"filter"` or `"invoke"`.
    pub stage: String,
}

/// In-memory ring of recent decisions with an optional JSONL sink.
///
/// The ring is bounded; the sink (when configured) receives every record
/// append-only and is never read back.
pub struct AuditRing {
    entries: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
    sink: Option<Mutex<File>>,
}

impl AuditRing {
    pub fn new(capacity: usize, sink_path: Option<&Path>) -> std::io::Result<AuditRing> {
        let sink = match sink_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                tracing::info!(path = %path.display(), "audit sink open");
                Some(Mutex::new(file))
            }
            None => None,
        };
        Ok(AuditRing {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            sink,
        })
    }

    pub fn record(&self, record: AuditRecord) {
        if let Some(sink) = &self.sink {
            if let Ok(line) = serde_json::to_string(&record) {
                let mut file = sink.lock();
                if let Err(e) = writeln!(file, "{line}") {
                    tracing::warn!(error = %e, "audit sink write failed");
                }
            }
        }

        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    /// Most recent `n` records, newest last.
    pub fn recent(&self, n: usize) -> Vec<AuditRecord> {
        let entries = self.entries.lock();
        entries
            .iter()
            .skip(entries.len().saturating_sub(n))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(capability: &str, allowed: bool) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            capability: capability.into(),
            allowed,
            reason: "test".into(),
            handler_id: None,
            stage: "filter".into(),
        }
    }

    #[test]
    fn ring_is_bounded() {
        let ring = AuditRing::new(3, None).unwrap();
        for i in 0..10 {
            ring.record(record(&format!("cap{i}"), true));
        }
        assert_eq!(ring.len(), 3);
        let recent = ring.recent(10);
        assert_eq!(recent[0].capability, "cap7");
        assert_eq!(recent[2].capability, "cap9");
    }

    #[test]
    fn recent_returns_newest_last() {
        let ring = AuditRing::new(100, None).unwrap();
        ring.record(record("a", true));
        ring.record(record("b", false));
        let recent = ring.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].capability, "b");
    }

    #[test]
    fn sink_receives_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let ring = AuditRing::new(10, Some(&path)).unwrap();
        ring.record(record("security", false));
        ring.record(record("web_search", true));

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["capability"], "security");
        assert_eq!(first["allowed"], false);
    }
}
