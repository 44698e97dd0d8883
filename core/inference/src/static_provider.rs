//! Offline provider adapter with scripted replies.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use qi_error::ErrorCode;
use qi_error::QiError;
use qi_error::Result;

use crate::provider::ChunkStream;
use crate::provider::CompletionChunk;
use crate::provider::CompletionRequest;
use crate::provider::CompletionResponse;
use crate::provider::ProviderClient;

/// Deterministic provider: replays scripted replies in order, echoing
/// the prompt once the script is exhausted. Lets the binary run without
/// network access and lets tests drive streaming end-to-end.
pub struct StaticProvider {
    model: String,
    replies: Mutex<VecDeque<Vec<String>>>,
}

impl StaticProvider {
    /// Create a provider with no scripted replies.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            replies: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a reply delivered as the given chunks.
    pub fn push_reply<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock_replies()
            .push_back(chunks.into_iter().map(Into::into).collect());
    }

    fn next_reply(&self, prompt: &str) -> Vec<String> {
        self.lock_replies()
            .pop_front()
            .unwrap_or_else(|| vec![format!("[offline] {prompt}")])
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Vec<String>>> {
        match self.replies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ProviderClient for StaticProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let content = self.next_reply(&request.prompt).concat();
        debug!(model = %self.model, "Static completion");
        Ok(CompletionResponse {
            content,
            model: self.model.clone(),
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let chunks = self.next_reply(&request.prompt);
        let items: Vec<Result<CompletionChunk>> = chunks
            .into_iter()
            .map(|content| {
                Ok(CompletionChunk {
                    content,
                    done: false,
                })
            })
            .chain(std::iter::once(Ok(CompletionChunk {
                content: String::new(),
                done: true,
            })))
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn current_model(&self) -> String {
        self.model.clone()
    }

    fn supported_providers(&self) -> Vec<String> {
        vec!["static".to_string()]
    }

    fn validate_config(&self) -> Result<()> {
        if self.model.is_empty() {
            return Err(QiError::validation(
                ErrorCode::InvalidInput,
                "Provider model must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_scripted_reply_then_echo() {
        let provider = StaticProvider::new("static-1");
        provider.push_reply(["Rec", "ursion", " is elegant"]);

        let scripted = provider
            .complete(CompletionRequest::new("Explain recursion"))
            .await
            .unwrap();
        assert_eq!(scripted.content, "Recursion is elegant");

        let echoed = provider
            .complete(CompletionRequest::new("hello"))
            .await
            .unwrap();
        assert_eq!(echoed.content, "[offline] hello");
    }

    #[tokio::test]
    async fn test_stream_yields_chunks_then_terminal() {
        let provider = StaticProvider::new("static-1");
        provider.push_reply(["a", "b"]);

        let mut stream = provider
            .stream(CompletionRequest::new("x"))
            .await
            .unwrap();
        let mut contents = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            if chunk.done {
                break;
            }
            contents.push(chunk.content);
        }
        assert_eq!(contents, vec!["a", "b"]);
    }

    #[test]
    fn test_validate_config() {
        assert!(StaticProvider::new("m").validate_config().is_ok());
        assert!(StaticProvider::new("").validate_config().is_err());
    }
}
