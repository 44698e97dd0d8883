//! The six-phase tool execution pipeline.
//!
//! Per call: discovery → validation → authorization → execution (with
//! retry and timeout) → processing → finalization. Progress messages
//! are enqueued on the bus between phases; `progress` values for one
//! call id are strictly monotonic and finish at 1.0.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use qi_error::ErrorCode;
use qi_error::QiError;
use qi_error::Result;
use qi_messaging::MessageQueue;
use qi_protocol::ExecutionMetrics;
use qi_protocol::ExecutionPhase;
use qi_protocol::Message;
use qi_protocol::ProgressUpdate;
use qi_protocol::ToolCall;
use qi_protocol::ToolResult;
use qi_protocol::ToolResultMetadata;
use qi_security::PermissionContext;

use crate::registry::ToolRegistry;
use crate::retry::RetryPolicy;
use crate::scheduler::SchedulingPolicy;
use crate::scheduler::ToolScheduler;
use crate::tool::ToolContext;
use crate::tool::ValidationOutcome;
use crate::transform::transform_tool_error;

/// Version recorded in result metadata.
pub const EXECUTOR_VERSION: &str = "1.0.0";

/// Default maximum concurrent tool executions.
pub const DEFAULT_MAX_TOOL_CONCURRENCY: usize = 10;

/// Configuration for the tool executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-call execution timeout.
    ///
    /// Overridable per call via
    /// [`ToolExecutor::execute_with_options`].
    pub default_timeout: Duration,
    /// Retry policy applied to the execution phase.
    pub retry: RetryPolicy,
    /// Maximum concurrent tool executions.
    ///
    /// Configurable via the `QI_MAX_TOOL_CONCURRENCY` environment
    /// variable. Default: 10.
    pub max_concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let max_concurrency = std::env::var("QI_MAX_TOOL_CONCURRENCY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_TOOL_CONCURRENCY);
        Self {
            default_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            max_concurrency,
        }
    }
}

/// Aggregate pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutorStats {
    /// Calls that entered the pipeline.
    pub total_calls: u64,
    /// Calls that finished successfully.
    pub succeeded: u64,
    /// Calls that failed in any phase.
    pub failed: u64,
    /// Execution attempts across all calls.
    pub total_attempts: u64,
    /// Calls that needed more than one attempt.
    pub retried_calls: u64,
    /// Mean wall-clock execution time.
    pub avg_execution_ms: f64,
    /// Last pipeline activity (Unix milliseconds).
    pub last_activity_ms: i64,
}

/// Drives tool calls through the six-phase pipeline.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    config: ExecutorConfig,
    scheduler: ToolScheduler,
    queue: Option<Arc<MessageQueue>>,
    permission: PermissionContext,
    stats: Mutex<ExecutorStats>,
    total_execution_ms: Mutex<f64>,
}

impl ToolExecutor {
    /// Create an executor over a registry.
    pub fn new(registry: Arc<ToolRegistry>, config: ExecutorConfig) -> Self {
        let scheduler = ToolScheduler::new(config.max_concurrency);
        Self {
            registry,
            config,
            scheduler,
            queue: None,
            permission: PermissionContext::default(),
            stats: Mutex::new(ExecutorStats::default()),
            total_execution_ms: Mutex::new(0.0),
        }
    }

    /// Emit progress messages onto this bus.
    pub fn with_queue(mut self, queue: Arc<MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Principal applied to every call's permission check.
    pub fn with_permission_context(mut self, permission: PermissionContext) -> Self {
        self.permission = permission;
        self
    }

    /// Execute a call with the configured defaults.
    pub async fn execute(&self, call: ToolCall) -> Result<ToolResult> {
        self.execute_with_options(call, CancellationToken::new(), None, None)
            .await
    }

    /// Execute a call under an externally owned cancellation token.
    pub async fn execute_cancellable(
        &self,
        call: ToolCall,
        cancel_token: CancellationToken,
    ) -> Result<ToolResult> {
        self.execute_with_options(call, cancel_token, None, None).await
    }

    /// Execute a call with per-call timeout and retry overrides.
    pub async fn execute_with_options(
        &self,
        call: ToolCall,
        cancel_token: CancellationToken,
        timeout: Option<Duration>,
        retry: Option<RetryPolicy>,
    ) -> Result<ToolResult> {
        let concurrency_safe = self
            .registry
            .get(&call.tool_name)
            .map(|tool| tool.is_concurrency_safe())
            .unwrap_or(true);
        let _permit = self.scheduler.acquire(concurrency_safe).await;

        let result = self
            .run_pipeline(call, cancel_token, timeout, retry)
            .await;
        self.record_outcome(&result);
        result
    }

    /// Execute a batch under the given scheduling policy. Results are
    /// returned in the scheduled order.
    pub async fn execute_batch(
        &self,
        calls: Vec<ToolCall>,
        policy: SchedulingPolicy,
    ) -> Vec<Result<ToolResult>> {
        let ordered = ToolScheduler::order(calls, policy);
        let futures: Vec<_> = ordered
            .into_iter()
            .map(|call| self.execute(call))
            .collect();
        futures::future::join_all(futures).await
    }

    /// Snapshot of the pipeline counters.
    pub fn stats(&self) -> ExecutorStats {
        *self.lock_stats()
    }

    async fn run_pipeline(
        &self,
        call: ToolCall,
        cancel_token: CancellationToken,
        timeout: Option<Duration>,
        retry: Option<RetryPolicy>,
    ) -> Result<ToolResult> {
        let started = Instant::now();
        let started_at = chrono::Utc::now().timestamp_millis();
        let call_id = call.call_id.clone();
        let tool_name = call.tool_name.clone();
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let policy = retry.unwrap_or_else(|| self.config.retry.clone());

        let mut ctx = ToolContext::new(&call_id)
            .with_cancel_token(cancel_token.clone())
            .with_permission(self.permission.clone());
        if let Some(context_id) = &call.context_id {
            ctx = ctx.with_context_id(context_id.clone());
        }

        // Phase 1: discovery.
        let tool = self.registry.get(&tool_name).map_err(|error| {
            self.emit_terminal_failure(&call_id);
            error
                .with_context("phase", ExecutionPhase::Discovery.as_str())
                .with_context("callId", &call_id)
        })?;
        self.emit_progress(&call_id, ExecutionPhase::Discovery, 0.2, "Tool resolved");

        // Phase 2: validation. Schema first, then business rules.
        if let ValidationOutcome::Invalid { errors } = tool.parse_input(&call.input) {
            self.emit_terminal_failure(&call_id);
            return Err(QiError::validation(
                ErrorCode::SchemaValidationFailed,
                format!("Input schema check failed: {}", errors.join(", ")),
            )
            .with_context("toolName", &tool_name)
            .with_context("callId", &call_id)
            .with_context("phase", ExecutionPhase::Validation.as_str()));
        }
        if let ValidationOutcome::Invalid { errors } = tool.validate(&call.input).await {
            self.emit_terminal_failure(&call_id);
            return Err(QiError::validation(
                ErrorCode::BusinessValidationFailed,
                format!("Business validation failed: {}", errors.join(", ")),
            )
            .with_context("toolName", &tool_name)
            .with_context("callId", &call_id)
            .with_context("phase", ExecutionPhase::Validation.as_str()));
        }
        self.emit_progress(&call_id, ExecutionPhase::Validation, 0.4, "Input validated");

        // Phase 3: authorization via the tool's own permission check.
        let check = tool.check_permissions(&call.input, &ctx).await;
        if !check.allowed {
            self.emit_terminal_failure(&call_id);
            let mut error = QiError::permission_denied(
                check
                    .reason
                    .unwrap_or_else(|| format!("Tool '{tool_name}' denied")),
            )
            .with_context("toolName", &tool_name)
            .with_context("callId", &call_id)
            .with_context("phase", ExecutionPhase::Authorization.as_str());
            if let Some(level) = check.required_level {
                error = error.with_context("requiredLevel", level.as_ref());
            }
            return Err(error);
        }
        self.emit_progress(&call_id, ExecutionPhase::Authorization, 0.6, "Authorized");

        // Phase 4: execution under timeout and retry.
        let max_attempts = policy.max_attempts.max(1);
        let mut attempts = 0u32;
        let output = loop {
            attempts += 1;
            self.emit_progress(
                &call_id,
                ExecutionPhase::Execution,
                0.6 + 0.3 * (f64::from(attempts) / f64::from(max_attempts)),
                format!("Executing {tool_name} (attempt {attempts}/{max_attempts})"),
            );

            let attempt = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    Err(QiError::cancelled(&format!("Tool '{tool_name}'")))
                }
                result = tokio::time::timeout(timeout, tool.execute(call.input.clone(), &ctx)) => {
                    match result {
                        // Raw tool errors pass through the message-pattern
                        // mapping before the retry decision.
                        Ok(inner) => inner.map_err(|raw| {
                            transform_tool_error(
                                raw,
                                &tool_name,
                                &call_id,
                                ExecutionPhase::Execution,
                                started.elapsed().as_millis() as i64,
                            )
                        }),
                        Err(_) => Err(QiError::execution_timeout(
                            &format!("Tool '{tool_name}'"),
                            timeout.as_millis() as u64,
                        )),
                    }
                }
            };

            match attempt {
                Ok(output) => break output,
                Err(error) if error.code == ErrorCode::Cancelled => {
                    self.emit_terminal_failure(&call_id);
                    return Err(error
                        .with_context("toolName", &tool_name)
                        .with_context("callId", &call_id)
                        .with_context("phase", ExecutionPhase::Execution.as_str())
                        .with_context("attempts", attempts.to_string()));
                }
                Err(error) => {
                    let retryable = policy.is_retryable(error.code);
                    if retryable && attempts < max_attempts {
                        let delay = policy.delay_after(attempts);
                        debug!(
                            tool = %tool_name,
                            call_id = %call_id,
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying after retryable error"
                        );
                        tokio::select! {
                            biased;
                            _ = cancel_token.cancelled() => {
                                self.emit_terminal_failure(&call_id);
                                return Err(QiError::cancelled(&format!("Tool '{tool_name}'"))
                                    .with_context("callId", &call_id)
                                    .with_context("attempts", attempts.to_string()));
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }

                    self.emit_terminal_failure(&call_id);
                    self.note_attempts(attempts);
                    let execution_time_ms = started.elapsed().as_millis() as i64;
                    if retryable {
                        // Retries exhausted.
                        warn!(tool = %tool_name, call_id = %call_id, attempts, "Retries exhausted");
                        return Err(QiError::system(
                            ErrorCode::ExecutionFailed,
                            format!(
                                "Tool '{tool_name}' failed after {attempts} attempts: {}",
                                error.message
                            ),
                        )
                        .with_context("toolName", &tool_name)
                        .with_context("callId", &call_id)
                        .with_context("phase", ExecutionPhase::Execution.as_str())
                        .with_context("attempts", attempts.to_string())
                        .with_context("executionTime", execution_time_ms.to_string())
                        .with_context("originalError", &error.message));
                    }
                    return Err(error
                        .with_context("toolName", &tool_name)
                        .with_context("callId", &call_id)
                        .with_context("phase", ExecutionPhase::Execution.as_str())
                        .with_context("attempts", attempts.to_string())
                        .with_context("executionTime", execution_time_ms.to_string()));
                }
            }
        };
        self.note_attempts(attempts);

        // Phase 5: processing. Enrich with executor metadata.
        let execution_time_ms = started.elapsed().as_millis() as i64;
        let finished_at = chrono::Utc::now().timestamp_millis();
        let metadata = ToolResultMetadata {
            execution_time_ms,
            executor_version: EXECUTOR_VERSION.to_string(),
            timestamp: finished_at,
        };
        self.emit_progress(&call_id, ExecutionPhase::Processing, 0.95, "Processing result");

        // Phase 6: finalization.
        self.emit_progress(
            &call_id,
            ExecutionPhase::Finalization,
            1.0,
            "Execution completed",
        );
        Ok(ToolResult {
            call_id,
            tool_name,
            success: true,
            output,
            metrics: ExecutionMetrics {
                started_at,
                finished_at,
                attempts,
                success: true,
            },
            metadata,
            error: None,
        })
    }

    fn emit_progress(
        &self,
        call_id: &str,
        phase: ExecutionPhase,
        progress: f64,
        message: impl Into<String>,
    ) {
        let Some(queue) = &self.queue else {
            return;
        };
        let update = ProgressUpdate {
            call_id: call_id.to_string(),
            phase,
            progress,
            message: message.into(),
        };
        if let Err(error) = queue.enqueue(Message::progress(update)) {
            debug!(call_id = %call_id, error = %error, "Progress message dropped");
        }
    }

    /// Terminal progress for a failed call; always 1.0 so per-call
    /// progress stays monotonic and closes out.
    fn emit_terminal_failure(&self, call_id: &str) {
        self.emit_progress(call_id, ExecutionPhase::Finalization, 1.0, "Execution failed");
    }

    fn note_attempts(&self, attempts: u32) {
        let mut stats = self.lock_stats();
        stats.total_attempts += u64::from(attempts);
        if attempts > 1 {
            stats.retried_calls += 1;
        }
    }

    fn record_outcome(&self, result: &Result<ToolResult>) {
        let mut stats = self.lock_stats();
        stats.total_calls += 1;
        stats.last_activity_ms = chrono::Utc::now().timestamp_millis();
        match result {
            Ok(tool_result) => {
                stats.succeeded += 1;
                let mut total = self.lock_total_ms();
                *total += tool_result.metadata.execution_time_ms as f64;
                stats.avg_execution_ms = *total / stats.succeeded.max(1) as f64;
            }
            Err(_) => {
                stats.failed += 1;
            }
        }
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, ExecutorStats> {
        match self.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_total_ms(&self) -> std::sync::MutexGuard<'_, f64> {
        match self.total_execution_ms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "executor.test.rs"]
mod tests;
