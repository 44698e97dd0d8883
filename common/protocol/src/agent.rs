//! Agent request/response types and classification output.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// How a piece of user input was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationType {
    /// Slash-command (`/status`).
    Command,
    /// Natural-language prompt for the model.
    Prompt,
    /// Input referencing files/resources via `@path` tokens.
    Workflow,
}

impl ClassificationType {
    /// Get the type as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationType::Command => "command",
            ClassificationType::Prompt => "prompt",
            ClassificationType::Workflow => "workflow",
        }
    }
}

impl std::fmt::Display for ClassificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which path produced the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    /// Deterministic rule engine.
    RuleBased,
    /// Model-assisted escalation.
    LlmAssisted,
    /// Rule result used because the model path timed out or failed.
    Fallback,
}

/// Structured data extracted during classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedInput {
    /// Command name and arguments (text after `/`).
    Command { name: String, args: Vec<String> },
    /// The prompt text, trimmed.
    Prompt { text: String },
    /// Workflow text plus the `@path` references found in it.
    Workflow { text: String, file_refs: Vec<String> },
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned input type.
    pub input_type: ClassificationType,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Path that produced the result.
    pub method: ClassificationMethod,
    /// Short human-readable justification.
    pub reasoning: String,
    /// Structured extraction.
    pub extracted: ExtractedInput,
    /// Free-form metadata (e.g. indicator hit counts).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// A request submitted to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Unique request id.
    pub id: String,
    /// Raw user input.
    pub input: String,
    /// Conversation context the request belongs to.
    pub context_id: Option<String>,
    /// Free-form request metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl AgentRequest {
    /// Create a request with a fresh id.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            input: input.into(),
            context_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach the owning context id.
    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }
}

/// Plain response object returned across the public boundary.
///
/// This is deliberately not a `Result`: callers outside the core never see
/// the tagged union.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Final content for the user.
    pub content: String,
    /// Classified type of the request, when classification ran.
    pub response_type: Option<ClassificationType>,
    /// Whether the request succeeded.
    pub success: bool,
    /// Error message, when `success` is false.
    pub error: Option<String>,
    /// Wall-clock handling time in milliseconds.
    pub execution_time_ms: i64,
    /// Free-form response metadata (`cancelled`, `degraded`, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl AgentResponse {
    /// A successful response.
    pub fn success(content: impl Into<String>, response_type: ClassificationType) -> Self {
        Self {
            content: content.into(),
            response_type: Some(response_type),
            success: true,
            error: None,
            execution_time_ms: 0,
            metadata: HashMap::new(),
        }
    }

    /// A failed response carrying an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            response_type: None,
            success: false,
            error: Some(error.into()),
            execution_time_ms: 0,
            metadata: HashMap::new(),
        }
    }

    /// Set the handling time.
    pub fn with_execution_time(mut self, execution_time_ms: i64) -> Self {
        self.execution_time_ms = execution_time_ms;
        self
    }

    /// Attach a metadata key/value pair.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Events yielded by the orchestrator's streaming surface.
///
/// Within one request the order is `Classification → Processing* →
/// (Result | Error)`; nothing follows the terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Classification finished.
    Classification {
        input_type: ClassificationType,
        confidence: f64,
    },
    /// Intermediate content (stream chunk or progress note).
    Processing { content: String },
    /// Terminal success with the final content.
    Result { content: String },
    /// Terminal failure.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_factories() {
        let ok = AgentResponse::success("done", ClassificationType::Command)
            .with_execution_time(12)
            .with_metadata("command", "status");
        assert!(ok.success);
        assert_eq!(ok.response_type, Some(ClassificationType::Command));
        assert_eq!(ok.execution_time_ms, 12);

        let failed = AgentResponse::failure("request was cancelled");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("request was cancelled"));
    }

    #[test]
    fn test_stream_event_tagging() {
        let event = AgentStreamEvent::Classification {
            input_type: ClassificationType::Prompt,
            confidence: 0.92,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"classification\""));
        assert!(json.contains("\"prompt\""));
    }

    #[test]
    fn test_request_builder() {
        let request = AgentRequest::new("explain recursion").with_context("ctx-main");
        assert_eq!(request.context_id.as_deref(), Some("ctx-main"));
        assert!(!request.id.is_empty());
    }
}
