use super::*;
use pretty_assertions::assert_eq;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

fn call(tool: &str, input: serde_json::Value) -> ToolCall {
    ToolCall::new(tool, input)
}

fn names(calls: &[ToolCall]) -> Vec<&str> {
    calls.iter().map(|c| c.tool_name.as_str()).collect()
}

#[test]
fn test_fifo_keeps_order() {
    let batch = vec![call("A", serde_json::json!({})), call("B", serde_json::json!({}))];
    let ordered = ToolScheduler::order(batch, SchedulingPolicy::Fifo);
    assert_eq!(names(&ordered), vec!["A", "B"]);
}

#[test]
fn test_priority_ordering() {
    let batch = vec![
        call("low", serde_json::json!({"priority": 1})),
        call("high", serde_json::json!({"priority": 9})),
        call("mid", serde_json::json!({"priority": 5})),
    ];
    let ordered = ToolScheduler::order(batch, SchedulingPolicy::Priority);
    assert_eq!(names(&ordered), vec!["high", "mid", "low"]);
}

#[test]
fn test_shortest_job_first() {
    let batch = vec![
        call("big", serde_json::json!({"data": "x".repeat(500)})),
        call("small", serde_json::json!({})),
        call("medium", serde_json::json!({"data": "x".repeat(50)})),
    ];
    let ordered = ToolScheduler::order(batch, SchedulingPolicy::ShortestJobFirst);
    assert_eq!(names(&ordered), vec!["small", "medium", "big"]);
}

#[test]
fn test_round_robin_interleaves_tools() {
    let batch = vec![
        call("A", serde_json::json!({"n": 1})),
        call("A", serde_json::json!({"n": 2})),
        call("B", serde_json::json!({"n": 1})),
        call("A", serde_json::json!({"n": 3})),
        call("B", serde_json::json!({"n": 2})),
    ];
    let ordered = ToolScheduler::order(batch, SchedulingPolicy::RoundRobin);
    assert_eq!(names(&ordered), vec!["A", "B", "A", "B", "A"]);
}

#[test]
fn test_adaptive_uses_priority_when_present() {
    let batch = vec![
        call("a", serde_json::json!({"priority": 1})),
        call("b", serde_json::json!({"priority": 3})),
        call("c", serde_json::json!({"priority": 2})),
    ];
    let ordered = ToolScheduler::order(batch, SchedulingPolicy::Adaptive);
    assert_eq!(names(&ordered), vec!["b", "c", "a"]);
}

#[test]
fn test_adaptive_small_batch_is_fifo() {
    let batch = vec![
        call("first", serde_json::json!({"priority": 1})),
        call("second", serde_json::json!({"priority": 9})),
    ];
    let ordered = ToolScheduler::order(batch, SchedulingPolicy::Adaptive);
    assert_eq!(names(&ordered), vec!["first", "second"]);
}

#[tokio::test]
async fn test_concurrency_cap_enforced() {
    let scheduler = ToolScheduler::new(2);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let scheduler = scheduler.clone();
        let active = active.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            let _permit = scheduler.acquire(true).await;
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            active.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_unsafe_tool_runs_exclusively() {
    let scheduler = ToolScheduler::new(4);
    let active = Arc::new(AtomicUsize::new(0));
    let overlap_with_unsafe = Arc::new(AtomicUsize::new(0));
    let unsafe_running = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for index in 0..5 {
        let scheduler = scheduler.clone();
        let active = active.clone();
        let overlap = overlap_with_unsafe.clone();
        let unsafe_running = unsafe_running.clone();
        let is_safe = index != 2;
        handles.push(tokio::spawn(async move {
            let _permit = scheduler.acquire(is_safe).await;
            active.fetch_add(1, Ordering::SeqCst);
            if is_safe {
                if unsafe_running.load(Ordering::SeqCst) > 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
            } else {
                unsafe_running.fetch_add(1, Ordering::SeqCst);
                // While exclusive, nothing else is active.
                if active.load(Ordering::SeqCst) > 1 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            if !is_safe {
                unsafe_running.fetch_sub(1, Ordering::SeqCst);
            }
            active.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(overlap_with_unsafe.load(Ordering::SeqCst), 0);
}
