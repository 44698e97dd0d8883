//! Error categories and the policy each category implies.
//!
//! Category layout:
//! - Validation: surface to the user, never retry
//! - Authorization: audit + deny, never retry
//! - Business: surface a domain message, retry only if declared
//! - System: may retry per policy, surface as "processing failed"

use serde::Deserialize;
use serde::Serialize;
use strum::AsRefStr;
use strum::EnumIter;

/// Policy metadata attached to an error category.
#[derive(Debug, Clone, Copy)]
pub struct CategoryPolicy {
    /// Whether errors in this category may be retried by default.
    pub retryable: bool,
    /// Whether every occurrence must be appended to an audit log.
    pub audited: bool,
    /// Whether the raw message is shown to the user verbatim.
    pub surface_message: bool,
}

/// Category of a [`QiError`](crate::QiError).
///
/// The category is assigned at the site of creation and implies handling
/// policy everywhere downstream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Input or schema violations. Surfaced verbatim, never retried.
    Validation,
    /// Access-control denials. Audited, surfaced, never retried.
    Authorization,
    /// Domain rule failures. Surfaced with the handler-provided message.
    Business,
    /// Infrastructure failures. Retryable per policy.
    System,
}

impl ErrorCategory {
    /// Returns the policy for this category.
    pub const fn policy(&self) -> CategoryPolicy {
        match self {
            ErrorCategory::Validation => CategoryPolicy {
                retryable: false,
                audited: false,
                surface_message: true,
            },
            ErrorCategory::Authorization => CategoryPolicy {
                retryable: false,
                audited: true,
                surface_message: true,
            },
            ErrorCategory::Business => CategoryPolicy {
                retryable: false,
                audited: false,
                surface_message: true,
            },
            ErrorCategory::System => CategoryPolicy {
                retryable: true,
                audited: false,
                surface_message: false,
            },
        }
    }

    /// Returns true if errors in this category may be retried by default.
    pub const fn is_retryable(&self) -> bool {
        self.policy().retryable
    }

    /// Returns true if every occurrence must be audited.
    pub const fn is_audited(&self) -> bool {
        self.policy().audited
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_category_policy() {
        assert!(ErrorCategory::System.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::Authorization.is_retryable());
        assert!(ErrorCategory::Authorization.is_audited());
        assert!(!ErrorCategory::System.policy().surface_message);
    }

    #[test]
    fn test_stable_names() {
        assert_eq!(ErrorCategory::Validation.as_ref(), "VALIDATION");
        assert_eq!(ErrorCategory::Authorization.as_ref(), "AUTHORIZATION");
        assert_eq!(ErrorCategory::Business.as_ref(), "BUSINESS");
        assert_eq!(ErrorCategory::System.as_ref(), "SYSTEM");
    }

    #[test]
    fn test_exactly_one_default_retryable_category() {
        let retryable: Vec<_> = ErrorCategory::iter().filter(|c| c.is_retryable()).collect();
        assert_eq!(retryable, vec![ErrorCategory::System]);
    }
}
