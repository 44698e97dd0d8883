//! Tool call/result records and pipeline progress types.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use qi_error::QiError;

/// Concurrency safety declared by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencySafety {
    /// Can run in parallel with other tools.
    #[default]
    Safe,
    /// Must hold the executor exclusively (e.g. file writes, shell).
    Unsafe,
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call.
    pub call_id: String,
    /// Name of the tool to execute.
    pub tool_name: String,
    /// Tool input document.
    pub input: Value,
    /// Owning context id, if any.
    pub context_id: Option<String>,
    /// Creation timestamp (Unix milliseconds).
    pub timestamp: i64,
}

impl ToolCall {
    /// Create a call with a fresh id.
    pub fn new(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            input,
            context_id: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Attach the owning context id.
    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }
}

/// Attempt-level metrics recorded by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Execution start (Unix milliseconds).
    pub started_at: i64,
    /// Execution end (Unix milliseconds).
    pub finished_at: i64,
    /// Number of attempts made (>= 1).
    pub attempts: u32,
    /// Whether the final attempt succeeded.
    pub success: bool,
}

/// Executor-attached result metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultMetadata {
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: i64,
    /// Version of the executor that produced the result.
    pub executor_version: String,
    /// Finalization timestamp (Unix milliseconds).
    pub timestamp: i64,
}

/// The final outcome of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the originating call.
    pub call_id: String,
    /// Name of the executed tool.
    pub tool_name: String,
    /// Whether execution succeeded.
    pub success: bool,
    /// Tool output document (empty on failure).
    pub output: Value,
    /// Attempt metrics.
    pub metrics: ExecutionMetrics,
    /// Executor metadata.
    pub metadata: ToolResultMetadata,
    /// The failure, when `success` is false.
    pub error: Option<QiError>,
}

/// Phase of the six-phase execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Discovery,
    Validation,
    Authorization,
    Execution,
    Processing,
    Finalization,
}

impl ExecutionPhase {
    /// Get the phase as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Discovery => "discovery",
            ExecutionPhase::Validation => "validation",
            ExecutionPhase::Authorization => "authorization",
            ExecutionPhase::Execution => "execution",
            ExecutionPhase::Processing => "processing",
            ExecutionPhase::Finalization => "finalization",
        }
    }
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline progress for one tool call.
///
/// Progress values for a single `call_id` are strictly monotonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Id of the tool call this update belongs to.
    pub call_id: String,
    /// Pipeline phase that produced the update.
    pub phase: ExecutionPhase,
    /// Completion fraction in [0, 1].
    pub progress: f64,
    /// Human-readable status line.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_ids_are_unique() {
        let a = ToolCall::new("Read", serde_json::json!({}));
        let b = ToolCall::new("Read", serde_json::json!({}));
        assert_ne!(a.call_id, b.call_id);
        assert!(a.timestamp > 0);
    }

    #[test]
    fn test_phase_rendering() {
        assert_eq!(ExecutionPhase::Discovery.as_str(), "discovery");
        assert_eq!(ExecutionPhase::Finalization.to_string(), "finalization");
    }

    #[test]
    fn test_result_serde_roundtrip() {
        let result = ToolResult {
            call_id: "c1".to_string(),
            tool_name: "Echo".to_string(),
            success: true,
            output: serde_json::json!({"text": "ok"}),
            metrics: ExecutionMetrics {
                started_at: 1,
                finished_at: 2,
                attempts: 1,
                success: true,
            },
            metadata: ToolResultMetadata {
                execution_time_ms: 1,
                executor_version: "1.0.0".to_string(),
                timestamp: 2,
            },
            error: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ToolResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.call_id, "c1");
        assert!(parsed.success);
    }
}
