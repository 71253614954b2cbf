//! Bounded in-memory log of reconciliation actions, newest first.
//!
//! This is the only shared mutable state in the engine. All mutation happens
//! under one mutex, so the bound holds and entries stay in completion order no
//! matter how many tasks append concurrently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Maximum number of entries retained.
pub const OPERATION_LOG_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogKind {
    Success,
    Failure,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct OperationLog {
    entries: Mutex<VecDeque<OperationLogEntry>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry, evicting the oldest once the log is full.
    pub fn append(&self, kind: LogKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            LogKind::Failure => tracing::warn!(kind = ?kind, "{message}"),
            LogKind::Success | LogKind::Info => tracing::info!(kind = ?kind, "{message}"),
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // Timestamp is taken inside the lock so it is monotonic with position.
        entries.push_front(OperationLogEntry {
            timestamp: Utc::now(),
            kind,
            message,
        });
        entries.truncate(OPERATION_LOG_CAPACITY);
    }

    /// Snapshot of the log, most recent first.
    pub fn entries(&self) -> Vec<OperationLogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn keeps_only_the_last_twenty_newest_first() {
        let log = OperationLog::new();
        for i in 0..25 {
            log.append(LogKind::Info, format!("entry {i}"));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 20);
        assert_eq!(entries[0].message, "entry 24");
        assert_eq!(entries[19].message, "entry 5");
        for pair in entries.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let log = OperationLog::new();
        log.append(LogKind::Success, "first");
        let snapshot = log.entries();
        log.append(LogKind::Failure, "second");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn concurrent_appends_respect_the_bound() {
        let log = Arc::new(OperationLog::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.append(LogKind::Info, format!("t{t}-{i}"));
                        assert!(log.len() <= OPERATION_LOG_CAPACITY);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), OPERATION_LOG_CAPACITY);
    }

    #[test]
    fn kinds_serialize_screaming() {
        let json = serde_json::to_string(&LogKind::Failure).unwrap();
        assert_eq!(json, "\"FAILURE\"");
    }
}
