//! The [`Tool`] trait and execution context.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use qi_error::Result;
use qi_protocol::ConcurrencySafety;
use qi_protocol::PermissionCheckResult;
use qi_security::PermissionContext;

/// Outcome of a non-throwing input check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Input is acceptable.
    Valid,
    /// Input is rejected; `errors` are human-readable.
    Invalid { errors: Vec<String> },
}

impl ValidationOutcome {
    /// An invalid outcome with one error.
    pub fn invalid(error: impl Into<String>) -> Self {
        Self::Invalid {
            errors: vec![error.into()],
        }
    }

    /// True for [`ValidationOutcome::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }
}

/// Per-call execution context handed to a tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Id of the call being executed.
    pub call_id: String,
    /// Owning conversation/isolated context, if any.
    pub context_id: Option<String>,
    /// Working directory for the call.
    pub cwd: PathBuf,
    /// Cancellation signal; tools should observe it at suspension
    /// points.
    pub cancel_token: CancellationToken,
    /// Principal information for permission checks.
    pub permission: PermissionContext,
    /// Free-form call metadata.
    pub metadata: HashMap<String, String>,
}

impl ToolContext {
    /// Create a context for a call.
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            context_id: None,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            cancel_token: CancellationToken::new(),
            permission: PermissionContext::default(),
            metadata: HashMap::new(),
        }
    }

    /// Set the owning context id.
    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Set the permission principal.
    pub fn with_permission(mut self, permission: PermissionContext) -> Self {
        self.permission = permission;
        self
    }
}

/// A tool pluggable into the execution pipeline.
///
/// Tools self-describe (name, version, schema, concurrency safety) and
/// implement the per-phase checks the executor drives: a non-throwing
/// schema check, a business-rule check, a permission check, and the
/// execution itself.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Tool version recorded in result metadata.
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Concurrency safety declaration.
    ///
    /// Default is `Safe`; override for tools that mutate shared state.
    fn concurrency_safety(&self) -> ConcurrencySafety {
        ConcurrencySafety::Safe
    }

    /// JSON schema for the tool input.
    fn input_schema(&self) -> Value;

    /// Non-throwing schema check.
    ///
    /// The default verifies the required fields from
    /// [`input_schema`](Tool::input_schema) are present.
    fn parse_input(&self, input: &Value) -> ValidationOutcome {
        let schema = self.input_schema();
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for field in required {
                if let Some(field_name) = field.as_str() {
                    if input.get(field_name).is_none() {
                        return ValidationOutcome::invalid(format!(
                            "Missing required field: {field_name}"
                        ));
                    }
                }
            }
        }
        ValidationOutcome::Valid
    }

    /// Business-rule check, run after the schema check passes.
    async fn validate(&self, _input: &Value) -> ValidationOutcome {
        ValidationOutcome::Valid
    }

    /// Permission check for this input and context.
    ///
    /// Default allows. Override for tools that touch protected
    /// resources.
    async fn check_permissions(
        &self,
        _input: &Value,
        _ctx: &ToolContext,
    ) -> PermissionCheckResult {
        PermissionCheckResult::allowed()
    }

    /// Execute the tool.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value>;

    /// True when the tool may run alongside others.
    fn is_concurrency_safe(&self) -> bool {
        matches!(self.concurrency_safety(), ConcurrencySafety::Safe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "Echo"
        }

        fn description(&self) -> &str {
            "Echo the message back"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string"}
                },
                "required": ["message"]
            })
        }

        async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value> {
            Ok(serde_json::json!({"echo": input["message"]}))
        }
    }

    #[test]
    fn test_default_parse_checks_required_fields() {
        let tool = EchoTool;
        assert!(tool.parse_input(&serde_json::json!({"message": "hi"})).is_valid());

        let outcome = tool.parse_input(&serde_json::json!({}));
        assert!(!outcome.is_valid());
        if let ValidationOutcome::Invalid { errors } = outcome {
            assert!(errors[0].contains("message"));
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let tool = EchoTool;
        assert!(tool.is_concurrency_safe());
        assert_eq!(tool.version(), "1.0.0");
        assert!(tool.validate(&serde_json::json!({})).await.is_valid());
        let ctx = ToolContext::new("call-1");
        assert!(
            tool.check_permissions(&serde_json::json!({}), &ctx)
                .await
                .allowed
        );
    }
}
