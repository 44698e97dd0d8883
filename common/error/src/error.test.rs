use super::*;
use crate::Result;
use pretty_assertions::assert_eq;

#[test]
fn test_factory_codes_are_stable() {
    let err = QiError::context_not_found("ctx-1");
    assert_eq!(err.code, ErrorCode::ContextNotFound);
    assert_eq!(err.code.as_ref(), "CONTEXT_NOT_FOUND");
    assert_eq!(err.context.get("contextId").map(String::as_str), Some("ctx-1"));
}

#[test]
fn test_permission_denied_surfaces_as_validation() {
    // The executor returns denials directly to the caller, so the category
    // must be VALIDATION even though the code reads as an access failure.
    let err = QiError::permission_denied("No permission rule found");
    assert_eq!(err.category, ErrorCategory::Validation);
    assert!(!err.is_retryable());
}

#[test]
fn test_timeout_is_retryable_system() {
    let err = QiError::execution_timeout("Tool 'WriteTool'", 120_000);
    assert_eq!(err.code, ErrorCode::ExecutionTimeout);
    assert_eq!(err.category, ErrorCategory::System);
    assert!(err.is_retryable());
    assert_eq!(
        err.context.get("timeoutMs").map(String::as_str),
        Some("120000")
    );
}

#[test]
fn test_display_includes_code_and_message() {
    let err = QiError::tool_not_found("Missing");
    assert_eq!(err.to_string(), "TOOL_NOT_FOUND: Tool not found: Missing");
}

#[test]
fn test_with_context_accumulates() {
    let err = QiError::system(ErrorCode::SystemError, "boom")
        .with_context("phase", "execution")
        .with_context("attempt", "2");
    assert_eq!(err.context.len(), 2);
    assert_eq!(err.context.get("phase").map(String::as_str), Some("execution"));
}

#[test]
fn test_result_composition_identities() {
    // match(Ok, id, Ok(x)) = x
    let ok: Result<i32> = Ok(7);
    let value = match ok {
        Ok(x) => x,
        Err(_) => unreachable!(),
    };
    assert_eq!(value, 7);

    // match(id, Err, Err(e)) = e
    let failure: Result<i32> = Err(QiError::cancelled("request"));
    let err = match failure {
        Ok(_) => unreachable!(),
        Err(e) => e,
    };
    assert_eq!(err.code, ErrorCode::Cancelled);

    // map / and_then compose without touching the error branch
    let composed: Result<i32> = Ok(3).map(|x| x * 2).and_then(|x| Ok(x + 1));
    assert_eq!(composed.unwrap(), 7);
}

#[test]
fn test_serde_roundtrip() {
    let err = QiError::path_restricted("/etc/shadow");
    let json = serde_json::to_string(&err).unwrap();
    assert!(json.contains("\"PATH_RESTRICTED\""));
    assert!(json.contains("\"AUTHORIZATION\""));
    let parsed: QiError = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, err);
}
