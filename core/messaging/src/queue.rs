//! The [`MessageQueue`] and its single asynchronous iterator.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;
use tracing::trace;

use qi_error::ErrorCode;
use qi_error::QiError;
use qi_error::Result;
use qi_protocol::Message;

use crate::stats::QueueStats;

/// Cleanup hook invoked exactly once by [`MessageQueue::destroy`].
pub type CleanupHook = Box<dyn FnOnce() + Send>;

/// Construction options for the bus.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Partition messages by priority and drain highest-first. When
    /// disabled, strict FIFO applies globally.
    pub priority_ordering: bool,
    /// Capacity cap; `enqueue` past it fails with `QUEUE_FULL`.
    pub max_size: Option<usize>,
    /// Messages older than this are dropped at peek/dequeue time.
    pub message_ttl: Option<Duration>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            priority_ordering: true,
            max_size: None,
            message_ttl: None,
        }
    }
}

#[derive(Default)]
struct QueueState {
    /// One FIFO lane per priority; index = `MessagePriority::lane()`.
    lanes: [VecDeque<Message>; 4],
    done: bool,
    error: Option<QiError>,
    paused: bool,
    destroyed: bool,
    iterating: bool,
    stats: QueueStats,
}

impl QueueState {
    fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    /// Pop the next deliverable message, dropping expired ones.
    fn pop_ready(&mut self, options: &QueueOptions, now_ms: i64) -> Option<Message> {
        let lane_order: &[usize] = if options.priority_ordering {
            &[3, 2, 1, 0]
        } else {
            &[0]
        };
        for &lane in lane_order {
            while let Some(message) = self.lanes[lane].pop_front() {
                if is_expired(&message, options, now_ms) {
                    self.stats.total_expired += 1;
                    trace!(message_id = %message.id, "Dropping expired message");
                    continue;
                }
                return Some(message);
            }
        }
        None
    }

    /// Clone the next deliverable message, dropping expired ones.
    fn peek_ready(&mut self, options: &QueueOptions, now_ms: i64) -> Option<Message> {
        let lane_order: &[usize] = if options.priority_ordering {
            &[3, 2, 1, 0]
        } else {
            &[0]
        };
        for &lane in lane_order {
            while let Some(message) = self.lanes[lane].front() {
                if is_expired(message, options, now_ms) {
                    self.lanes[lane].pop_front();
                    self.stats.total_expired += 1;
                    continue;
                }
                return Some(message.clone());
            }
        }
        None
    }
}

fn is_expired(message: &Message, options: &QueueOptions, now_ms: i64) -> bool {
    match options.message_ttl {
        Some(ttl) => message.age_ms(now_ms) > ttl.as_millis() as i64,
        None => false,
    }
}

/// Priority-ordered async queue with TTL, pause/resume, and a
/// `done`/`error` lifecycle.
///
/// All methods are non-blocking except [`QueueIterator::next`], which
/// suspends precisely when the queue is empty and neither done nor
/// errored. At most one iteration may be active at a time.
pub struct MessageQueue {
    options: QueueOptions,
    state: Mutex<QueueState>,
    notify: Notify,
    cleanup: Mutex<Option<CleanupHook>>,
}

impl MessageQueue {
    /// Create a queue with the given options.
    pub fn new(options: QueueOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            cleanup: Mutex::new(None),
        })
    }

    /// Create a queue with default options.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(QueueOptions::default())
    }

    /// Register a hook invoked once when the queue is destroyed.
    pub fn set_cleanup_hook(&self, hook: CleanupHook) {
        *self.lock_cleanup() = Some(hook);
    }

    /// Enqueue a message. Never suspends.
    ///
    /// Fails with `QUEUE_DESTROYED` / `QUEUE_DONE` / `QUEUE_ERROR` /
    /// `QUEUE_FULL` depending on lifecycle state and capacity.
    pub fn enqueue(&self, message: Message) -> Result<()> {
        let mut state = self.lock_state();
        if state.destroyed {
            state.stats.error_count += 1;
            return Err(queue_closed());
        }
        if let Some(error) = &state.error {
            let message = error.message.clone();
            state.stats.error_count += 1;
            return Err(QiError::validation(
                ErrorCode::QueueError,
                format!("Queue has errored: {}", message),
            ));
        }
        if state.done {
            state.stats.error_count += 1;
            return Err(QiError::validation(
                ErrorCode::QueueDone,
                "Queue is done; no further messages are accepted",
            ));
        }
        if let Some(max) = self.options.max_size {
            if state.len() >= max {
                state.stats.error_count += 1;
                return Err(QiError::validation(
                    ErrorCode::QueueFull,
                    format!("Queue is full (max size {max})"),
                ));
            }
        }

        let lane = if self.options.priority_ordering {
            message.priority.lane()
        } else {
            0
        };
        trace!(message_id = %message.id, priority = ?message.priority, "Enqueue");
        state.lanes[lane].push_back(message);
        state.stats.total_enqueued += 1;
        state.stats.current_size = state.len();
        state.stats.touch();
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    /// Signal that no more messages will be produced. Pending messages
    /// still drain; the iterator then completes.
    pub fn done(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.destroyed {
            return Err(queue_closed());
        }
        state.done = true;
        state.stats.touch();
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Put the queue into the errored state. Pending messages still
    /// drain; the iterator then rejects with the stored error.
    pub fn error(&self, error: QiError) -> Result<()> {
        let mut state = self.lock_state();
        if state.destroyed {
            return Err(queue_closed());
        }
        if state.error.is_none() {
            state.error = Some(error);
        }
        state.stats.error_count += 1;
        state.stats.touch();
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Clone the next deliverable message without removing it.
    pub fn peek(&self) -> Option<Message> {
        let mut state = self.lock_state();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let message = state.peek_ready(&self.options, now_ms);
        state.stats.current_size = state.len();
        message
    }

    /// Number of currently queued messages.
    pub fn size(&self) -> usize {
        self.lock_state().len()
    }

    /// Drop all queued messages.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.destroyed {
            return Err(queue_closed());
        }
        for lane in &mut state.lanes {
            lane.clear();
        }
        state.stats.current_size = 0;
        state.stats.touch();
        Ok(())
    }

    /// Suspend delivery. Queued messages are retained in order.
    pub fn pause(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.destroyed {
            return Err(queue_closed());
        }
        state.paused = true;
        Ok(())
    }

    /// Resume delivery after [`pause`](Self::pause).
    pub fn resume(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.destroyed {
            return Err(queue_closed());
        }
        state.paused = false;
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Whether delivery is currently paused.
    pub fn is_paused(&self) -> bool {
        self.lock_state().paused
    }

    /// Whether `done()` has been signalled.
    pub fn is_done(&self) -> bool {
        self.lock_state().done
    }

    /// Empty all state and invoke the cleanup hook. A pending iterator
    /// completes cleanly; every later operation fails `QUEUE_DESTROYED`.
    pub fn destroy(&self) {
        let hook = {
            let mut state = self.lock_state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            for lane in &mut state.lanes {
                lane.clear();
            }
            state.stats.current_size = 0;
            state.stats.touch();
            self.lock_cleanup().take()
        };
        debug!("Message queue destroyed");
        self.notify.notify_one();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Snapshot of the bus counters.
    pub fn stats(&self) -> QueueStats {
        let mut state = self.lock_state();
        state.stats.current_size = state.len();
        state.stats
    }

    /// Begin the single active iteration.
    ///
    /// Fails with `ALREADY_STARTED` while another iterator is live; the
    /// slot is released when the returned iterator is dropped.
    pub fn iterate(&self) -> Result<QueueIterator<'_>> {
        let mut state = self.lock_state();
        if state.iterating {
            return Err(QiError::validation(
                ErrorCode::AlreadyStarted,
                "Queue iteration has already started",
            ));
        }
        state.iterating = true;
        Ok(QueueIterator {
            queue: self,
            finished: false,
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_cleanup(&self) -> std::sync::MutexGuard<'_, Option<CleanupHook>> {
        match self.cleanup.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("options", &self.options)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

fn queue_closed() -> QiError {
    QiError::validation(ErrorCode::QueueDestroyed, "Queue has been destroyed")
}

/// The single active iteration over a [`MessageQueue`].
pub struct QueueIterator<'a> {
    queue: &'a MessageQueue,
    finished: bool,
}

impl QueueIterator<'_> {
    /// Yield the next message.
    ///
    /// Returns `Ok(Some(_))` for each deliverable message, `Ok(None)`
    /// once the queue is done (or destroyed) and drained, and
    /// `Err(stored)` once the queue has errored and drained. Suspends
    /// while the queue is empty and live, or paused.
    pub async fn next(&mut self) -> Result<Option<Message>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            // Register for wakeup before inspecting state so a
            // notification between the check and the await is not lost.
            let notified = self.queue.notify.notified();
            {
                let mut state = self.queue.lock_state();
                if state.destroyed {
                    self.finished = true;
                    return Ok(None);
                }
                if !state.paused {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    if let Some(message) = state.pop_ready(&self.queue.options, now_ms) {
                        state.stats.total_delivered += 1;
                        state.stats.current_size = state.len();
                        state.stats.touch();
                        return Ok(Some(message));
                    }
                    if let Some(error) = state.error.clone() {
                        self.finished = true;
                        return Err(error);
                    }
                    if state.done {
                        self.finished = true;
                        return Ok(None);
                    }
                }
            }
            notified.await;
        }
    }
}

impl Drop for QueueIterator<'_> {
    fn drop(&mut self) {
        self.queue.lock_state().iterating = false;
    }
}

#[cfg(test)]
#[path = "queue.test.rs"]
mod tests;
