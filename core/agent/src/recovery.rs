//! Ordered recovery strategies for failed requests.
//!
//! Tried in order; the first success wins:
//! 1. backoff retry against the primary provider (retryable SYSTEM
//!    errors only)
//! 2. the registered fallback provider
//! 3. degraded mode: streaming and workflows are disabled, then one
//!    more plain completion is attempted
//! 4. the cached result of an earlier identical read-only request
//!
//! When every strategy fails the caller surfaces a terminal message.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use lru::LruCache;
use tracing::debug;
use tracing::info;
use tracing::warn;

use qi_error::QiError;
use qi_inference::CompletionRequest;
use qi_inference::ProviderClient;

/// Cached completions retained for read-only fallback.
const RECOVERY_CACHE_SIZE: usize = 64;
/// Immediate-retry attempts before moving to the next strategy.
const RETRY_ATTEMPTS: u32 = 2;
/// Base delay for the immediate-retry strategy.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// A successful recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    /// The recovered content.
    pub content: String,
    /// Which strategy produced it.
    pub strategy: &'static str,
    /// Whether the orchestrator is now degraded.
    pub degraded: bool,
}

/// Runs the ordered recovery ladder.
pub struct RecoveryCoordinator {
    fallback_provider: Option<Arc<dyn ProviderClient>>,
    cache: Mutex<LruCache<String, String>>,
    degraded: AtomicBool,
}

impl Default for RecoveryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryCoordinator {
    /// Create a coordinator with no fallback provider.
    pub fn new() -> Self {
        Self {
            fallback_provider: None,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(RECOVERY_CACHE_SIZE)
                    .unwrap_or_else(|| unreachable!("cache size is non-zero")),
            )),
            degraded: AtomicBool::new(false),
        }
    }

    /// Register an alternative provider tried after immediate retry.
    pub fn with_fallback_provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.fallback_provider = Some(provider);
        self
    }

    /// Whether degraded mode has been entered.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Remember a successful completion for cached-result fallback.
    pub fn remember(&self, prompt: &str, content: &str) {
        self.lock_cache()
            .put(prompt.to_string(), content.to_string());
    }

    /// Attempt recovery for a failed prompt request.
    pub async fn recover(
        &self,
        error: &QiError,
        prompt: &str,
        primary: &Arc<dyn ProviderClient>,
    ) -> Option<Recovered> {
        // Strategy 1: immediate retry with exponential backoff, only
        // for errors whose category permits retrying.
        if error.is_retryable() {
            for attempt in 1..=RETRY_ATTEMPTS {
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                match primary.complete(CompletionRequest::new(prompt)).await {
                    Ok(response) => {
                        debug!(attempt, "Recovered by immediate retry");
                        return Some(Recovered {
                            content: response.content,
                            strategy: "retry",
                            degraded: false,
                        });
                    }
                    Err(retry_error) => {
                        debug!(attempt, error = %retry_error, "Immediate retry failed");
                    }
                }
            }
        }

        // Strategy 2: registered fallback provider.
        if let Some(fallback) = &self.fallback_provider {
            match fallback.complete(CompletionRequest::new(prompt)).await {
                Ok(response) => {
                    info!("Recovered via fallback provider");
                    return Some(Recovered {
                        content: response.content,
                        strategy: "fallback",
                        degraded: false,
                    });
                }
                Err(fallback_error) => {
                    warn!(error = %fallback_error, "Fallback provider failed");
                }
            }
        }

        // Strategy 3: degraded mode, then one more plain completion.
        self.degraded.store(true, Ordering::Relaxed);
        if let Ok(response) = primary.complete(CompletionRequest::new(prompt)).await {
            info!("Recovered in degraded mode");
            return Some(Recovered {
                content: response.content,
                strategy: "degraded",
                degraded: true,
            });
        }

        // Strategy 4: cached result of an identical earlier request.
        if let Some(content) = self.lock_cache().get(prompt).cloned() {
            info!("Recovered from cached result");
            return Some(Recovered {
                content,
                strategy: "cache",
                degraded: true,
            });
        }

        None
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, String>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "recovery.test.rs"]
mod tests;
