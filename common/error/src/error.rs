//! The [`QiError`] value and its factory constructors.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::ErrorCategory;
use crate::ErrorCode;

/// Categorized error threaded through every fallible operation.
///
/// The `code` is stable and machine-matchable (retry policies match on it),
/// the `category` drives handling policy, and `context` carries free-form
/// diagnostic key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct QiError {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Category implying handling policy.
    pub category: ErrorCategory,
    /// Free-form diagnostic context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl QiError {
    /// Create an error with an explicit category.
    pub fn new(code: ErrorCode, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            category,
            context: BTreeMap::new(),
        }
    }

    /// Create an error using the code's default category.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, code.default_category(), message)
    }

    /// Create a VALIDATION error.
    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, ErrorCategory::Validation, message)
    }

    /// Create an AUTHORIZATION error.
    pub fn authorization(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, ErrorCategory::Authorization, message)
    }

    /// Create a BUSINESS error.
    pub fn business(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, ErrorCategory::Business, message)
    }

    /// Create a SYSTEM error.
    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, ErrorCategory::System, message)
    }

    /// Attach a context key/value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Returns true if this error may be retried under default policy.
    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    // ====== Named factories for the codes used across the core ======

    /// Context id is not registered.
    pub fn context_not_found(context_id: &str) -> Self {
        Self::business(
            ErrorCode::ContextNotFound,
            format!("Context not found: {context_id}"),
        )
        .with_context("contextId", context_id)
    }

    /// Context was read or accessed after expiry.
    pub fn context_expired(context_id: &str) -> Self {
        Self::business(
            ErrorCode::ContextExpired,
            format!("Context has expired: {context_id}"),
        )
        .with_context("contextId", context_id)
    }

    /// Path falls outside the allowed set.
    pub fn path_restricted(path: &str) -> Self {
        Self::authorization(
            ErrorCode::PathRestricted,
            format!("Access to path is restricted: {path}"),
        )
        .with_context("path", path)
    }

    /// Tool name could not be resolved.
    pub fn tool_not_found(name: &str) -> Self {
        Self::business(ErrorCode::ToolNotFound, format!("Tool not found: {name}"))
            .with_context("toolName", name)
    }

    /// Permission check denied the operation.
    ///
    /// Surfaced as VALIDATION so it reaches the caller verbatim; the audit
    /// trail is written by the permission manager at check time.
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::validation(ErrorCode::PermissionDenied, reason)
    }

    /// Execution exceeded its timeout.
    pub fn execution_timeout(what: &str, timeout_ms: u64) -> Self {
        Self::system(
            ErrorCode::ExecutionTimeout,
            format!("{what} timed out after {timeout_ms}ms"),
        )
        .with_context("timeoutMs", timeout_ms.to_string())
    }

    /// Request was cancelled.
    pub fn cancelled(what: &str) -> Self {
        Self::business(ErrorCode::Cancelled, format!("{what} was cancelled"))
    }
}

#[cfg(test)]
#[path = "error.test.rs"]
mod tests;
