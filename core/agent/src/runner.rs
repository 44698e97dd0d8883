//! The bus consumer loop.
//!
//! [`AgentRunner`] is the single consumer of the message bus: user
//! input and commands route into the orchestrator, while progress,
//! stream chunks, and agent output are forwarded to the UI adapter.
//! `/exit` and `/quit` terminate the loop.

use std::sync::Arc;

use tracing::debug;
use tracing::info;

use qi_messaging::MessageQueue;
use qi_protocol::AgentRequest;
use qi_protocol::ControlAction;
use qi_protocol::MessagePayload;
use qi_protocol::UiEvent;
use qi_protocol::UiMode;
use qi_protocol::UserInterface;

use crate::orchestrator::AgentOrchestrator;

/// Consumes the bus, driving the orchestrator and the UI adapter.
pub struct AgentRunner {
    orchestrator: Arc<AgentOrchestrator>,
    queue: Arc<MessageQueue>,
    ui: Arc<dyn UserInterface>,
    context_id: Option<String>,
}

impl AgentRunner {
    /// Create a runner over the shared bus.
    pub fn new(
        orchestrator: Arc<AgentOrchestrator>,
        queue: Arc<MessageQueue>,
        ui: Arc<dyn UserInterface>,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            ui,
            context_id: None,
        }
    }

    /// Attach the conversation context requests are recorded under.
    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// Run until `/exit`, a shutdown control message, or queue
    /// completion.
    pub async fn run(&self) -> qi_error::Result<()> {
        let mut iter = self.queue.iterate()?;
        self.ui.set_mode(UiMode::Interactive);

        while let Some(message) = iter.next().await? {
            match message.payload {
                MessagePayload::UserInput { ref input } => {
                    if is_exit(input) {
                        info!("Exit requested");
                        self.ui.emit(UiEvent::MessageReceived { message });
                        break;
                    }
                    self.dispatch(input.clone()).await;
                }
                MessagePayload::Command { ref name, ref args } => {
                    let mut input = format!("/{name}");
                    if !args.is_empty() {
                        input.push(' ');
                        input.push_str(&args.join(" "));
                    }
                    if is_exit(&input) {
                        break;
                    }
                    self.dispatch(input).await;
                }
                MessagePayload::Progress(update) => {
                    self.ui.emit(UiEvent::ProgressUpdate(update));
                }
                MessagePayload::StreamChunk { content, done } => {
                    if done {
                        self.ui.emit(UiEvent::StreamingComplete);
                        self.ui.set_mode(UiMode::Interactive);
                    } else {
                        self.ui.set_mode(UiMode::Streaming);
                        self.ui.emit(UiEvent::StreamingChunk { content });
                    }
                }
                MessagePayload::AgentOutput { .. } => {
                    self.ui.emit(UiEvent::MessageReceived { message });
                }
                MessagePayload::SystemControl { action } => match action {
                    ControlAction::Abort => self.ui.emit(UiEvent::Cancelled),
                    ControlAction::Shutdown => {
                        info!("Shutdown requested");
                        break;
                    }
                    ControlAction::Pause => {
                        debug!("Pause control observed");
                        self.queue.pause()?;
                    }
                    ControlAction::Resume | ControlAction::Reset => {
                        debug!(?action, "Control message observed");
                    }
                },
            }
        }
        Ok(())
    }

    async fn dispatch(&self, input: String) {
        self.ui.set_busy(true);
        self.ui.emit(UiEvent::ClearInput);

        let mut request = AgentRequest::new(input);
        if let Some(context_id) = &self.context_id {
            request = request.with_context(context_id.clone());
        }
        let response = self.orchestrator.process(request).await;

        if !response.success {
            self.ui.emit(UiEvent::Error {
                message: response
                    .error
                    .unwrap_or_else(|| "processing failed".to_string()),
            });
        }
        self.ui.set_busy(false);
    }
}

fn is_exit(input: &str) -> bool {
    matches!(input.trim(), "/exit" | "/quit")
}

#[cfg(test)]
#[path = "runner.test.rs"]
mod tests;
