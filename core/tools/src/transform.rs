//! Raw-error to categorized-error transformation.

use qi_error::ErrorCode;
use qi_error::QiError;
use qi_protocol::ExecutionPhase;

/// Map a raw error message to a categorized [`QiError`].
///
/// Patterns are checked in priority order: timeout markers first, then
/// permission/access markers, then validation markers; anything else is
/// a SYSTEM execution error. The context always carries the tool name,
/// call id, phase, execution time, and the original message.
pub fn transform_error(
    raw: &str,
    tool_name: &str,
    call_id: &str,
    phase: ExecutionPhase,
    execution_time_ms: i64,
) -> QiError {
    let lower = raw.to_lowercase();

    const TIMEOUT_MARKERS: [&str; 3] = ["timeout", "timed out", "deadline"];
    const PERMISSION_MARKERS: [&str; 4] =
        ["permission", "access denied", "unauthorized", "forbidden"];
    const VALIDATION_MARKERS: [&str; 4] = ["validation", "invalid", "schema", "malformed"];

    let error = if TIMEOUT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        QiError::system(
            ErrorCode::ExecutionTimeout,
            format!("Tool '{tool_name}' timed out: {raw}"),
        )
    } else if PERMISSION_MARKERS.iter().any(|marker| lower.contains(marker)) {
        QiError::validation(
            ErrorCode::PermissionDenied,
            format!("Tool '{tool_name}' was denied: {raw}"),
        )
    } else if VALIDATION_MARKERS.iter().any(|marker| lower.contains(marker)) {
        QiError::validation(
            ErrorCode::ValidationError,
            format!("Tool '{tool_name}' input rejected: {raw}"),
        )
    } else {
        QiError::system(
            ErrorCode::ExecutionError,
            format!("Tool '{tool_name}' failed: {raw}"),
        )
    };

    error
        .with_context("toolName", tool_name)
        .with_context("callId", call_id)
        .with_context("phase", phase.as_str())
        .with_context("executionTime", execution_time_ms.to_string())
        .with_context("originalError", raw)
}

/// Map a tool-returned [`QiError`] through the message patterns.
///
/// A pattern hit overrides the tool's own categorization. When no
/// pattern matches, the tool's code and category are kept so configured
/// retryable sets still match; the diagnostic context is attached
/// either way.
pub fn transform_tool_error(
    error: QiError,
    tool_name: &str,
    call_id: &str,
    phase: ExecutionPhase,
    execution_time_ms: i64,
) -> QiError {
    let transformed = transform_error(&error.message, tool_name, call_id, phase, execution_time_ms);
    if transformed.code != ErrorCode::ExecutionError {
        return transformed;
    }
    let original_message = error.message.clone();
    error
        .with_context("toolName", tool_name)
        .with_context("callId", call_id)
        .with_context("phase", phase.as_str())
        .with_context("executionTime", execution_time_ms.to_string())
        .with_context("originalError", original_message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qi_error::ErrorCategory;

    fn transform(raw: &str) -> QiError {
        transform_error(raw, "WriteTool", "call-1", ExecutionPhase::Execution, 42)
    }

    #[test]
    fn test_timeout_markers_win() {
        // "timed out" outranks the "invalid" marker also present.
        let err = transform("operation timed out with invalid state");
        assert_eq!(err.code, ErrorCode::ExecutionTimeout);
        assert_eq!(err.category, ErrorCategory::System);
    }

    #[test]
    fn test_permission_markers() {
        let err = transform("access denied by policy");
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert_eq!(err.category, ErrorCategory::Validation);
    }

    #[test]
    fn test_validation_markers() {
        let err = transform("schema mismatch in field x");
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.category, ErrorCategory::Validation);
    }

    #[test]
    fn test_fallback_is_system_execution_error() {
        let err = transform("disk exploded");
        assert_eq!(err.code, ErrorCode::ExecutionError);
        assert_eq!(err.category, ErrorCategory::System);
    }

    #[test]
    fn test_context_is_always_attached() {
        let err = transform("anything");
        assert_eq!(err.context.get("toolName").map(String::as_str), Some("WriteTool"));
        assert_eq!(err.context.get("callId").map(String::as_str), Some("call-1"));
        assert_eq!(err.context.get("phase").map(String::as_str), Some("execution"));
        assert_eq!(err.context.get("executionTime").map(String::as_str), Some("42"));
        assert_eq!(
            err.context.get("originalError").map(String::as_str),
            Some("anything")
        );
    }

    #[test]
    fn test_tool_error_pattern_overrides_code() {
        let raw = QiError::business(ErrorCode::ExecutionError, "access denied by sandbox");
        let err = transform_tool_error(raw, "BashTool", "call-2", ExecutionPhase::Execution, 7);
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert_eq!(err.category, ErrorCategory::Validation);
        assert_eq!(
            err.context.get("originalError").map(String::as_str),
            Some("access denied by sandbox")
        );
    }

    #[test]
    fn test_tool_error_without_pattern_keeps_code() {
        let raw = QiError::system(ErrorCode::SystemError, "socket closed unexpectedly");
        let err = transform_tool_error(raw, "HttpTool", "call-3", ExecutionPhase::Execution, 7);
        assert_eq!(err.code, ErrorCode::SystemError);
        assert_eq!(err.category, ErrorCategory::System);
        assert_eq!(err.context.get("callId").map(String::as_str), Some("call-3"));
        assert_eq!(err.context.get("phase").map(String::as_str), Some("execution"));
        assert_eq!(
            err.context.get("originalError").map(String::as_str),
            Some("socket closed unexpectedly")
        );
    }
}
