//! Stable error codes.
//!
//! Codes are a closed set so every dispatch on them is exhaustively
//! checked. The wire rendering is the SCREAMING_SNAKE_CASE name.

use serde::Deserialize;
use serde::Serialize;
use strum::AsRefStr;
use strum::EnumIter;
use strum::EnumString;

use crate::ErrorCategory;

/// Stable error code carried by every [`QiError`](crate::QiError).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ====== Queue lifecycle ======
    /// Enqueue past the configured capacity.
    QueueFull,
    /// Enqueue after `done()` was signalled.
    QueueDone,
    /// Enqueue after `error()` was signalled.
    QueueError,
    /// Any operation after `destroy()`.
    QueueDestroyed,
    /// A second concurrent iteration was started.
    AlreadyStarted,

    // ====== Context lifecycle ======
    /// Context id is not registered.
    ContextNotFound,
    /// Context read or access after its expiry.
    ContextExpired,
    /// Security boundary registration failed during context creation.
    BoundaryRegistrationFailed,

    // ====== Security / permissions ======
    /// Path falls outside the allowed set.
    PathRestricted,
    /// Tool is blocked for this context.
    ToolBlocked,
    /// Command is blocked for this context.
    CommandBlocked,
    /// Network access is not granted.
    NetworkRestricted,
    /// System access is not granted.
    SystemRestricted,
    /// No permission rule allows the operation.
    PermissionDenied,
    /// Role assignment with an unknown role.
    InvalidRole,
    /// Duplicate or malformed permission rule.
    InvalidRule,

    // ====== Tool pipeline ======
    /// Tool name could not be resolved.
    ToolNotFound,
    /// Input failed the schema check.
    SchemaValidationFailed,
    /// Input failed the business-rule check.
    BusinessValidationFailed,
    /// Generic validation failure (transformed raw errors).
    ValidationError,
    /// Execution exceeded its timeout.
    ExecutionTimeout,
    /// Execution failed (transformed raw errors).
    ExecutionError,
    /// Execution failed after exhausting retries.
    ExecutionFailed,

    // ====== Agent / classification ======
    /// Forbidden orchestrator state transition.
    InvalidTransition,
    /// Classification failed in both the rule and model paths.
    ClassificationFailed,
    /// Request was cancelled by the user.
    Cancelled,
    /// Malformed request input.
    InvalidInput,

    // ====== Session / infra ======
    /// Session id is not registered.
    SessionNotFound,
    /// Generic retryable infrastructure failure.
    SystemError,
}

impl ErrorCode {
    /// Default category for errors created with this code.
    pub const fn default_category(&self) -> ErrorCategory {
        match self {
            ErrorCode::QueueFull
            | ErrorCode::QueueDone
            | ErrorCode::QueueError
            | ErrorCode::QueueDestroyed
            | ErrorCode::AlreadyStarted
            | ErrorCode::SchemaValidationFailed
            | ErrorCode::BusinessValidationFailed
            | ErrorCode::ValidationError
            | ErrorCode::InvalidTransition
            | ErrorCode::InvalidRole
            | ErrorCode::InvalidRule
            | ErrorCode::InvalidInput => ErrorCategory::Validation,

            ErrorCode::PathRestricted
            | ErrorCode::ToolBlocked
            | ErrorCode::CommandBlocked
            | ErrorCode::NetworkRestricted
            | ErrorCode::SystemRestricted
            | ErrorCode::PermissionDenied => ErrorCategory::Authorization,

            ErrorCode::ContextNotFound
            | ErrorCode::ContextExpired
            | ErrorCode::ToolNotFound
            | ErrorCode::SessionNotFound
            | ErrorCode::Cancelled
            | ErrorCode::ClassificationFailed => ErrorCategory::Business,

            ErrorCode::BoundaryRegistrationFailed
            | ErrorCode::ExecutionTimeout
            | ErrorCode::ExecutionError
            | ErrorCode::ExecutionFailed
            | ErrorCode::SystemError => ErrorCategory::System,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_stable_rendering() {
        assert_eq!(ErrorCode::ContextNotFound.as_ref(), "CONTEXT_NOT_FOUND");
        assert_eq!(ErrorCode::PathRestricted.as_ref(), "PATH_RESTRICTED");
        assert_eq!(ErrorCode::ToolNotFound.as_ref(), "TOOL_NOT_FOUND");
        assert_eq!(ErrorCode::PermissionDenied.as_ref(), "PERMISSION_DENIED");
        assert_eq!(ErrorCode::ExecutionTimeout.as_ref(), "EXECUTION_TIMEOUT");
        assert_eq!(ErrorCode::QueueFull.as_ref(), "QUEUE_FULL");
    }

    #[test]
    fn test_parse_roundtrip() {
        let code = ErrorCode::from_str("EXECUTION_FAILED").unwrap();
        assert_eq!(code, ErrorCode::ExecutionFailed);
        assert!(ErrorCode::from_str("NOT_A_CODE").is_err());
    }

    #[test]
    fn test_default_categories() {
        assert_eq!(
            ErrorCode::PermissionDenied.default_category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            ErrorCode::ExecutionTimeout.default_category(),
            ErrorCategory::System
        );
        assert_eq!(
            ErrorCode::SchemaValidationFailed.default_category(),
            ErrorCategory::Validation
        );
    }
}
