use super::*;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use qi_error::ErrorCode;
use qi_error::Result;
use qi_inference::ChunkStream;
use qi_inference::CompletionResponse;
use qi_inference::StaticProvider;
use std::sync::atomic::AtomicU32;

/// Provider that fails a fixed number of completions, then succeeds.
struct FailingProvider {
    failures_remaining: AtomicU32,
    reply: String,
}

impl FailingProvider {
    fn new(failures: u32, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            failures_remaining: AtomicU32::new(failures),
            reply: reply.to_string(),
        })
    }
}

#[async_trait]
impl ProviderClient for FailingProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(QiError::system(ErrorCode::SystemError, "provider down"));
        }
        Ok(CompletionResponse {
            content: self.reply.clone(),
            model: "failing".to_string(),
        })
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<ChunkStream> {
        Err(QiError::system(ErrorCode::SystemError, "no stream"))
    }

    fn current_model(&self) -> String {
        "failing".to_string()
    }

    fn supported_providers(&self) -> Vec<String> {
        vec!["failing".to_string()]
    }

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

fn system_error() -> QiError {
    QiError::system(ErrorCode::SystemError, "stream blew up")
}

#[tokio::test]
async fn test_immediate_retry_wins_first() {
    let primary: Arc<dyn ProviderClient> = FailingProvider::new(0, "retried fine");
    let coordinator = RecoveryCoordinator::new();

    let recovered = coordinator
        .recover(&system_error(), "prompt", &primary)
        .await
        .unwrap();
    assert_eq!(recovered.strategy, "retry");
    assert_eq!(recovered.content, "retried fine");
    assert!(!recovered.degraded);
    assert!(!coordinator.is_degraded());
}

#[tokio::test]
async fn test_validation_errors_skip_retry() {
    // A non-retryable category goes straight past strategy 1; with no
    // fallback the degraded completion picks it up.
    let primary: Arc<dyn ProviderClient> = FailingProvider::new(0, "degraded answer");
    let coordinator = RecoveryCoordinator::new();

    let error = QiError::validation(ErrorCode::ValidationError, "bad input");
    let recovered = coordinator.recover(&error, "prompt", &primary).await.unwrap();
    assert_eq!(recovered.strategy, "degraded");
    assert!(recovered.degraded);
    assert!(coordinator.is_degraded());
}

#[tokio::test]
async fn test_fallback_provider_after_retries() {
    // Primary keeps failing; the fallback answers.
    let primary: Arc<dyn ProviderClient> = FailingProvider::new(10, "never");
    let fallback = Arc::new(StaticProvider::new("fallback-model"));
    fallback.push_reply(["fallback answer"]);

    let coordinator = RecoveryCoordinator::new().with_fallback_provider(fallback);
    let recovered = coordinator
        .recover(&system_error(), "prompt", &primary)
        .await
        .unwrap();
    assert_eq!(recovered.strategy, "fallback");
    assert_eq!(recovered.content, "fallback answer");
}

#[tokio::test]
async fn test_cached_result_is_last_resort() {
    let primary: Arc<dyn ProviderClient> = FailingProvider::new(10, "never");
    let coordinator = RecoveryCoordinator::new();
    coordinator.remember("prompt", "cached answer");

    let recovered = coordinator
        .recover(&system_error(), "prompt", &primary)
        .await
        .unwrap();
    assert_eq!(recovered.strategy, "cache");
    assert_eq!(recovered.content, "cached answer");
    assert!(recovered.degraded);
}

#[tokio::test]
async fn test_no_strategy_left_returns_none() {
    let primary: Arc<dyn ProviderClient> = FailingProvider::new(10, "never");
    let coordinator = RecoveryCoordinator::new();

    let recovered = coordinator.recover(&system_error(), "prompt", &primary).await;
    assert!(recovered.is_none());
    // Degraded mode was still entered along the way.
    assert!(coordinator.is_degraded());
}
