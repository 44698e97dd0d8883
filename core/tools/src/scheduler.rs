//! Concurrency scheduling for tool execution.
//!
//! The scheduler enforces the max-concurrency cap through a semaphore
//! and serializes non-concurrency-safe tools with a shared/exclusive
//! lock: safe tools take shared access, unsafe tools take exclusive
//! access and therefore wait for every active tool to finish.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::OwnedRwLockReadGuard;
use tokio::sync::OwnedRwLockWriteGuard;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::RwLock;
use tokio::sync::Semaphore;

use qi_protocol::ToolCall;

/// Batch ordering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    /// Keep the caller's order.
    Fifo,
    /// Order by the numeric `priority` input field, highest first.
    Priority,
    /// Order by estimated cost (input size), smallest first.
    ShortestJobFirst,
    /// Interleave calls across tool names.
    RoundRobin,
    /// Pick a policy from the batch shape.
    #[default]
    Adaptive,
}

/// Permit held for the duration of one tool execution.
#[derive(Debug)]
pub struct SchedulerPermit {
    _permit: OwnedSemaphorePermit,
    _access: Access,
}

#[derive(Debug)]
enum Access {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

/// Semaphore-capped scheduler with shared/exclusive tool access.
#[derive(Debug, Clone)]
pub struct ToolScheduler {
    capacity: Arc<Semaphore>,
    access: Arc<RwLock<()>>,
    max_concurrency: usize,
}

impl ToolScheduler {
    /// Create a scheduler with the given concurrency cap.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            capacity: Arc::new(Semaphore::new(max_concurrency.max(1))),
            access: Arc::new(RwLock::new(())),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// The configured concurrency cap.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Acquire a slot. Safe tools share; unsafe tools exclude all
    /// others and wait for active tools to drain.
    pub async fn acquire(&self, concurrency_safe: bool) -> SchedulerPermit {
        if concurrency_safe {
            let access = Access::Shared(self.access.clone().read_owned().await);
            let permit = self
                .capacity
                .clone()
                .acquire_owned()
                .await
                .unwrap_or_else(|_| unreachable!("scheduler semaphore is never closed"));
            SchedulerPermit {
                _permit: permit,
                _access: access,
            }
        } else {
            // Exclusive access first: waits for all shared holders.
            let access = Access::Exclusive(self.access.clone().write_owned().await);
            let permit = self
                .capacity
                .clone()
                .acquire_owned()
                .await
                .unwrap_or_else(|_| unreachable!("scheduler semaphore is never closed"));
            SchedulerPermit {
                _permit: permit,
                _access: access,
            }
        }
    }

    /// Order a batch according to `policy`.
    pub fn order(calls: Vec<ToolCall>, policy: SchedulingPolicy) -> Vec<ToolCall> {
        match policy {
            SchedulingPolicy::Fifo => calls,
            SchedulingPolicy::Priority => {
                let mut ordered = calls;
                ordered.sort_by_key(|call| std::cmp::Reverse(call_priority(call)));
                ordered
            }
            SchedulingPolicy::ShortestJobFirst => {
                let mut ordered = calls;
                ordered.sort_by_key(estimated_cost);
                ordered
            }
            SchedulingPolicy::RoundRobin => round_robin(calls),
            SchedulingPolicy::Adaptive => {
                let policy = Self::adapt(&calls);
                Self::order(calls, policy)
            }
        }
    }

    /// Choose a concrete policy for a batch: tiny batches stay FIFO,
    /// batches with explicit priorities are priority-ordered, batches
    /// with widely varying input sizes run shortest-first.
    fn adapt(calls: &[ToolCall]) -> SchedulingPolicy {
        if calls.len() <= 2 {
            return SchedulingPolicy::Fifo;
        }
        if calls.iter().any(|call| call.input.get("priority").is_some()) {
            return SchedulingPolicy::Priority;
        }
        let costs: Vec<usize> = calls.iter().map(estimated_cost).collect();
        let min = costs.iter().min().copied().unwrap_or(0);
        let max = costs.iter().max().copied().unwrap_or(0);
        if min > 0 && max / min >= 4 {
            return SchedulingPolicy::ShortestJobFirst;
        }
        SchedulingPolicy::Fifo
    }
}

fn call_priority(call: &ToolCall) -> i64 {
    call.input
        .get("priority")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0)
}

fn estimated_cost(call: &ToolCall) -> usize {
    call.input.to_string().len()
}

fn round_robin(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    let mut by_tool: HashMap<String, VecDeque<ToolCall>> = HashMap::new();
    let mut tool_order: Vec<String> = Vec::new();
    for call in calls {
        if !by_tool.contains_key(&call.tool_name) {
            tool_order.push(call.tool_name.clone());
        }
        by_tool
            .entry(call.tool_name.clone())
            .or_default()
            .push_back(call);
    }

    let mut ordered = Vec::new();
    loop {
        let mut drained = true;
        for tool in &tool_order {
            if let Some(queue) = by_tool.get_mut(tool) {
                if let Some(call) = queue.pop_front() {
                    ordered.push(call);
                    drained = false;
                }
            }
        }
        if drained {
            break;
        }
    }
    ordered
}

#[cfg(test)]
#[path = "scheduler.test.rs"]
mod tests;
