use super::*;
use crate::tool::Tool;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use qi_protocol::MessagePayload;
use qi_protocol::PermissionCheckResult;
use qi_protocol::Role;
use serde_json::Value;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Fails with the given code a fixed number of times, then succeeds.
struct FlakyTool {
    failures_remaining: AtomicU32,
    code: ErrorCode,
    executions: AtomicUsize,
}

impl FlakyTool {
    fn new(failures: u32, code: ErrorCode) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            code,
            executions: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Tool for FlakyTool {
    fn name(&self) -> &str {
        "WriteTool"
    }

    fn description(&self) -> &str {
        "Write a file, flakily"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<Value> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(QiError::from_code(self.code, "transient failure"));
        }
        Ok(serde_json::json!({"written": true}))
    }
}

/// Always fails with a canned pre-built error.
struct RawErrorTool {
    error: QiError,
    executions: AtomicUsize,
}

impl RawErrorTool {
    fn new(error: QiError) -> Self {
        Self {
            error,
            executions: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Tool for RawErrorTool {
    fn name(&self) -> &str {
        "RawTool"
    }

    fn description(&self) -> &str {
        "Fails with a canned error"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<Value> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

struct DeniedTool {
    executions: AtomicUsize,
}

#[async_trait]
impl Tool for DeniedTool {
    fn name(&self) -> &str {
        "BashTool"
    }

    fn description(&self) -> &str {
        "Run a shell command"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn check_permissions(&self, _input: &Value, _ctx: &ToolContext) -> PermissionCheckResult {
        PermissionCheckResult::denied("No permission rule found", Some(Role::Guest))
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<Value> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({}))
    }
}

struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "SlowTool"
    }

    fn description(&self) -> &str {
        "Sleeps for a long time"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<Value> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(serde_json::json!({}))
    }
}

struct StrictTool;

#[async_trait]
impl Tool for StrictTool {
    fn name(&self) -> &str {
        "StrictTool"
    }

    fn description(&self) -> &str {
        "Requires a message and rejects empty ones"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        })
    }

    async fn validate(&self, input: &Value) -> ValidationOutcome {
        match input.get("message").and_then(Value::as_str) {
            Some(message) if !message.is_empty() => ValidationOutcome::Valid,
            _ => ValidationOutcome::invalid("message must not be empty"),
        }
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value> {
        Ok(serde_json::json!({"echo": input["message"]}))
    }
}

fn executor_with(
    tool: Arc<dyn Tool>,
    retry: RetryPolicy,
) -> (ToolExecutor, Arc<MessageQueue>) {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(tool).unwrap();
    let queue = MessageQueue::with_defaults();
    let config = ExecutorConfig {
        retry,
        ..ExecutorConfig::default()
    };
    let executor = ToolExecutor::new(registry, config).with_queue(queue.clone());
    (executor, queue)
}

async fn drain_progress(queue: &Arc<MessageQueue>) -> Vec<ProgressUpdate> {
    queue.done().unwrap();
    let mut updates = Vec::new();
    let mut iter = queue.iterate().unwrap();
    while let Some(message) = iter.next().await.unwrap() {
        if let MessagePayload::Progress(update) = message.payload {
            updates.push(update);
        }
    }
    updates
}

#[tokio::test]
async fn test_happy_path_result_and_progress() {
    let (executor, queue) = executor_with(Arc::new(FlakyTool::new(0, ErrorCode::SystemError)), RetryPolicy::default());

    let result = executor
        .execute(ToolCall::new("WriteTool", serde_json::json!({})))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.tool_name, "WriteTool");
    assert_eq!(result.metrics.attempts, 1);
    assert!(result.metrics.success);
    assert_eq!(result.metadata.executor_version, EXECUTOR_VERSION);
    assert_eq!(result.output, serde_json::json!({"written": true}));

    let updates = drain_progress(&queue).await;
    assert_eq!(updates.len(), 6);
    assert_eq!(updates[0].phase, ExecutionPhase::Discovery);
    assert_eq!(updates[1].progress, 0.4);
    assert_eq!(updates[2].progress, 0.6);
    assert_eq!(updates.last().unwrap().progress, 1.0);
    assert_eq!(updates.last().unwrap().message, "Execution completed");
}

#[tokio::test]
async fn test_progress_is_strictly_monotonic() {
    let (executor, queue) = executor_with(
        Arc::new(FlakyTool::new(1, ErrorCode::SystemError)),
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        },
    );

    executor
        .execute(ToolCall::new("WriteTool", serde_json::json!({})))
        .await
        .unwrap();

    let updates = drain_progress(&queue).await;
    for pair in updates.windows(2) {
        assert!(
            pair[1].progress > pair[0].progress,
            "progress must strictly increase: {} then {}",
            pair[0].progress,
            pair[1].progress
        );
    }
}

#[tokio::test]
async fn test_retry_exhaustion_emits_six_messages_and_execution_failed() {
    let tool = Arc::new(FlakyTool::new(2, ErrorCode::SystemError));
    let (executor, queue) = executor_with(
        tool.clone(),
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            retryable_errors: vec![ErrorCode::SystemError],
            ..RetryPolicy::default()
        },
    );

    let error = executor
        .execute(ToolCall::new("WriteTool", serde_json::json!({})))
        .await
        .err()
        .unwrap();

    assert_eq!(error.code, ErrorCode::ExecutionFailed);
    assert!(error.message.contains("2 attempts"));
    assert_eq!(error.context.get("attempts").map(String::as_str), Some("2"));
    assert_eq!(tool.executions.load(Ordering::SeqCst), 2);

    // discovery, validation, authorization, two attempts, terminal.
    let updates = drain_progress(&queue).await;
    assert_eq!(updates.len(), 6);
    assert_eq!(updates.last().unwrap().message, "Execution failed");
    assert_eq!(updates.last().unwrap().progress, 1.0);
}

#[tokio::test]
async fn test_attempts_are_min_of_failures_plus_one_and_max() {
    // k failures under maxAttempts=4 → k+1 attempts.
    let tool = Arc::new(FlakyTool::new(2, ErrorCode::SystemError));
    let (executor, _queue) = executor_with(
        tool.clone(),
        RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        },
    );
    let result = executor
        .execute(ToolCall::new("WriteTool", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(result.metrics.attempts, 3);
    assert_eq!(tool.executions.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_non_retryable_errors_fail_fast() {
    let tool = Arc::new(FlakyTool::new(5, ErrorCode::ValidationError));
    let (executor, _queue) = executor_with(
        tool.clone(),
        RetryPolicy {
            max_attempts: 3,
            retryable_errors: vec![ErrorCode::SystemError],
            ..RetryPolicy::default()
        },
    );

    let error = executor
        .execute(ToolCall::new("WriteTool", serde_json::json!({})))
        .await
        .err()
        .unwrap();
    assert_eq!(error.code, ErrorCode::ValidationError);
    assert_eq!(tool.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_permission_markers_transform_in_pipeline() {
    // The tool reports a business error, but the message carries a
    // permission marker; the pipeline maps it before deciding on retry.
    let tool = Arc::new(RawErrorTool::new(QiError::business(
        ErrorCode::ExecutionError,
        "access denied by sandbox profile",
    )));
    let (executor, _queue) = executor_with(tool.clone(), RetryPolicy::default());

    let error = executor
        .execute(ToolCall::new("RawTool", serde_json::json!({})))
        .await
        .err()
        .unwrap();

    assert_eq!(error.code, ErrorCode::PermissionDenied);
    assert_eq!(error.category, qi_error::ErrorCategory::Validation);
    assert_eq!(
        error.context.get("originalError").map(String::as_str),
        Some("access denied by sandbox profile")
    );
    // Mapped to a non-retryable category: one attempt only.
    assert_eq!(tool.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_markers_transform_in_pipeline() {
    let tool = Arc::new(RawErrorTool::new(QiError::validation(
        ErrorCode::InvalidInput,
        "upstream connection timed out",
    )));
    let (executor, _queue) = executor_with(tool.clone(), RetryPolicy::none());

    let error = executor
        .execute(ToolCall::new("RawTool", serde_json::json!({})))
        .await
        .err()
        .unwrap();

    // The timeout marker outranks the tool's own validation code.
    assert_eq!(error.code, ErrorCode::ExecutionTimeout);
    assert_eq!(error.category, qi_error::ErrorCategory::System);
    assert_eq!(
        error.context.get("originalError").map(String::as_str),
        Some("upstream connection timed out")
    );
}

#[tokio::test]
async fn test_unmatched_messages_keep_the_tool_code_for_retry() {
    // No pattern matches "transient failure", so the tool's SYSTEM_ERROR
    // survives transformation and the configured retryable set applies.
    let tool = Arc::new(RawErrorTool::new(QiError::system(
        ErrorCode::SystemError,
        "transient failure",
    )));
    let (executor, _queue) = executor_with(
        tool.clone(),
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            retryable_errors: vec![ErrorCode::SystemError],
            ..RetryPolicy::default()
        },
    );

    let error = executor
        .execute(ToolCall::new("RawTool", serde_json::json!({})))
        .await
        .err()
        .unwrap();

    assert_eq!(error.code, ErrorCode::ExecutionFailed);
    assert_eq!(tool.executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_permission_denial_never_executes() {
    let tool = Arc::new(DeniedTool {
        executions: AtomicUsize::new(0),
    });
    let (executor, _queue) = executor_with(tool.clone(), RetryPolicy::default());

    let error = executor
        .execute(ToolCall::new("BashTool", serde_json::json!({})))
        .await
        .err()
        .unwrap();

    assert_eq!(error.code, ErrorCode::PermissionDenied);
    assert_eq!(error.category, qi_error::ErrorCategory::Validation);
    assert!(error.message.contains("No permission rule found"));
    assert_eq!(
        error.context.get("requiredLevel").map(String::as_str),
        Some("GUEST")
    );
    assert_eq!(tool.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_timeout_maps_to_execution_timeout() {
    let (executor, _queue) = executor_with(Arc::new(SlowTool), RetryPolicy::none());

    let error = executor
        .execute_with_options(
            ToolCall::new("SlowTool", serde_json::json!({})),
            CancellationToken::new(),
            Some(Duration::from_millis(20)),
            None,
        )
        .await
        .err()
        .unwrap();
    assert_eq!(error.code, ErrorCode::ExecutionTimeout);
    assert_eq!(
        error.context.get("phase").map(String::as_str),
        Some("execution")
    );
}

#[tokio::test]
async fn test_schema_validation_failure() {
    let (executor, _queue) = executor_with(Arc::new(StrictTool), RetryPolicy::default());
    let error = executor
        .execute(ToolCall::new("StrictTool", serde_json::json!({})))
        .await
        .err()
        .unwrap();
    assert_eq!(error.code, ErrorCode::SchemaValidationFailed);
}

#[tokio::test]
async fn test_business_validation_failure() {
    let (executor, _queue) = executor_with(Arc::new(StrictTool), RetryPolicy::default());
    let error = executor
        .execute(ToolCall::new(
            "StrictTool",
            serde_json::json!({"message": ""}),
        ))
        .await
        .err()
        .unwrap();
    assert_eq!(error.code, ErrorCode::BusinessValidationFailed);
}

#[tokio::test]
async fn test_unknown_tool_fails_in_discovery() {
    let registry = Arc::new(ToolRegistry::new());
    let executor = ToolExecutor::new(registry, ExecutorConfig::default());
    let error = executor
        .execute(ToolCall::new("Missing", serde_json::json!({})))
        .await
        .err()
        .unwrap();
    assert_eq!(error.code, ErrorCode::ToolNotFound);
    assert_eq!(
        error.context.get("phase").map(String::as_str),
        Some("discovery")
    );
}

#[tokio::test]
async fn test_cancellation_aborts_execution() {
    let (executor, _queue) = executor_with(Arc::new(SlowTool), RetryPolicy::none());
    let token = CancellationToken::new();

    let cancel = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        })
    };

    let error = executor
        .execute_cancellable(ToolCall::new("SlowTool", serde_json::json!({})), token)
        .await
        .err()
        .unwrap();
    assert_eq!(error.code, ErrorCode::Cancelled);
    cancel.await.unwrap();
}

#[tokio::test]
async fn test_batch_execution() {
    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(Arc::new(FlakyTool::new(0, ErrorCode::SystemError)))
        .unwrap();
    let executor = ToolExecutor::new(registry, ExecutorConfig::default());

    let calls = vec![
        ToolCall::new("WriteTool", serde_json::json!({"n": 1})),
        ToolCall::new("WriteTool", serde_json::json!({"n": 2})),
        ToolCall::new("Missing", serde_json::json!({})),
    ];
    let results = executor.execute_batch(calls, SchedulingPolicy::Fifo).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 2);
}

#[tokio::test]
async fn test_stats_track_outcomes() {
    let (executor, _queue) = executor_with(
        Arc::new(FlakyTool::new(1, ErrorCode::SystemError)),
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        },
    );
    executor
        .execute(ToolCall::new("WriteTool", serde_json::json!({})))
        .await
        .unwrap();
    let error = executor
        .execute(ToolCall::new("Absent", serde_json::json!({})))
        .await
        .err()
        .unwrap();
    assert_eq!(error.code, ErrorCode::ToolNotFound);

    let stats = executor.stats();
    assert_eq!(stats.total_calls, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retried_calls, 1);
    assert!(stats.last_activity_ms > 0);
}
