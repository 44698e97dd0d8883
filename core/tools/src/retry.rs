//! Retry policy for the execution phase.

use std::time::Duration;

use qi_error::ErrorCode;

/// Retry policy applied by the executor. Only errors whose code is in
/// `retryable_errors` retry; everything else fails fast.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (>= 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied per subsequent retry.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Codes that may retry.
    pub retryable_errors: Vec<ErrorCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            retryable_errors: vec![ErrorCode::SystemError, ErrorCode::ExecutionTimeout],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            retryable_errors: Vec::new(),
            ..Self::default()
        }
    }

    /// True if an error with this code may retry.
    pub fn is_retryable(&self, code: ErrorCode) -> bool {
        self.retryable_errors.contains(&code)
    }

    /// Backoff delay after the given attempt (1-based):
    /// `initial × multiplier^(attempt−1)`, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.is_retryable(ErrorCode::SystemError));
        assert!(policy.is_retryable(ErrorCode::ExecutionTimeout));
        assert!(!policy.is_retryable(ErrorCode::PermissionDenied));
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        // 400ms is clamped to the cap.
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
    }

    #[test]
    fn test_none_never_retries() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.is_retryable(ErrorCode::SystemError));
    }
}
