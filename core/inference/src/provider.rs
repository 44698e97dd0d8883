//! The [`ProviderClient`] trait and its request/response types.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use serde::Serialize;

use qi_error::Result;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// User prompt.
    pub prompt: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// Output token cap.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Per-call timeout enforced by the caller.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    /// Create a request with defaults.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: None,
            temperature: None,
            timeout: None,
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A completed (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Full response content.
    pub content: String,
    /// Model that produced it.
    pub model: String,
}

/// One chunk of a streaming response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Chunk content (may be empty on the terminal chunk).
    pub content: String,
    /// True on the final chunk.
    pub done: bool,
}

/// Stream of completion chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk>> + Send>>;

/// Adapter over an LLM provider.
///
/// Implementations own transport, authentication, and wire formats; the
/// core only sees these methods.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Run a completion to the end.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Run a completion, yielding chunks as the provider streams.
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream>;

    /// The model currently configured.
    fn current_model(&self) -> String;

    /// Provider identifiers this adapter can serve.
    fn supported_providers(&self) -> Vec<String>;

    /// Check that the adapter is usable.
    fn validate_config(&self) -> Result<()>;
}
