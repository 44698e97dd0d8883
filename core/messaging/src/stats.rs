//! Bus statistics.

use serde::Deserialize;
use serde::Serialize;

/// Counters maintained by the bus. Cheap to copy out; callers receive a
/// snapshot, never a live view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Messages accepted by `enqueue` over the queue's lifetime.
    pub total_enqueued: u64,
    /// Messages handed to the iterator.
    pub total_delivered: u64,
    /// Messages dropped because they outlived the TTL.
    pub total_expired: u64,
    /// Rejected enqueues plus `error()` signals.
    pub error_count: u64,
    /// Messages currently queued.
    pub current_size: usize,
    /// Last mutation timestamp (Unix milliseconds).
    pub last_activity_ms: i64,
}

impl QueueStats {
    pub(crate) fn touch(&mut self) {
        self.last_activity_ms = chrono::Utc::now().timestamp_millis();
    }
}
