//! Bounded audit ring shared by the security surfaces.

use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;

/// One access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Decision timestamp (Unix milliseconds).
    pub timestamp: i64,
    /// Context or principal the decision applied to.
    pub context_id: String,
    /// The operation that was checked.
    pub operation: String,
    /// Whether access was granted.
    pub allowed: bool,
    /// Human-readable rationale.
    pub reason: String,
}

impl AuditEntry {
    /// Record a decision made now.
    pub fn now(
        context_id: impl Into<String>,
        operation: impl Into<String>,
        allowed: bool,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            context_id: context_id.into(),
            operation: operation.into(),
            allowed,
            reason: reason.into(),
        }
    }
}

/// Ring buffer of the most recent audit entries, trimmed on every write.
#[derive(Debug)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
}

impl AuditLog {
    /// Create a log bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest past capacity.
    pub fn append(&mut self, entry: AuditEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Snapshot of all retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Retained entries for one context, oldest first.
    pub fn entries_for(&self, context_id: &str) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.context_id == context_id)
            .cloned()
            .collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_trims_to_capacity() {
        let mut log = AuditLog::new(3);
        for i in 0..5 {
            log.append(AuditEntry::now("ctx", format!("op{i}"), true, "ok"));
        }
        assert_eq!(log.len(), 3);
        let entries = log.entries();
        assert_eq!(entries[0].operation, "op2");
        assert_eq!(entries[2].operation, "op4");
    }

    #[test]
    fn test_entries_for_context() {
        let mut log = AuditLog::new(10);
        log.append(AuditEntry::now("a", "read", true, "ok"));
        log.append(AuditEntry::now("b", "write", false, "denied"));
        log.append(AuditEntry::now("a", "write", false, "denied"));
        assert_eq!(log.entries_for("a").len(), 2);
        assert_eq!(log.entries_for("b").len(), 1);
        assert!(log.entries_for("c").is_empty());
    }
}
