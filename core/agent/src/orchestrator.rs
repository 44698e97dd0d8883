//! The agent orchestrator.
//!
//! Ties the classifier to the command registry, the prompt handler, and
//! the tool pipeline. Public surface: [`AgentOrchestrator::process`]
//! returning a plain [`AgentResponse`], and
//! [`AgentOrchestrator::stream`] yielding
//! `classification → processing* → (result | error)` events. Internally
//! everything composes `Result`s; only this boundary translates them
//! into response objects.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use qi_context::ContextManager;
use qi_context::ContextMessage;
use qi_context::ContextMessageRole;
use qi_error::ErrorCode;
use qi_error::QiError;
use qi_error::Result;
use qi_inference::CompletionRequest;
use qi_inference::ProviderClient;
use qi_messaging::MessageQueue;
use qi_protocol::AgentRequest;
use qi_protocol::AgentResponse;
use qi_protocol::AgentStreamEvent;
use qi_protocol::Classification;
use qi_protocol::ClassificationType;
use qi_protocol::ControlAction;
use qi_protocol::ExtractedInput;
use qi_protocol::Message;
use qi_protocol::ToolCall;
use qi_tools::ToolExecutor;

use crate::classifier::InputClassifier;
use crate::commands::CommandEnv;
use crate::commands::CommandOutcome;
use crate::commands::CommandRegistry;
use crate::commands::CommandRequest;
use crate::recovery::RecoveryCoordinator;
use crate::state::AgentState;
use crate::state::StateMachine;

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Provider identifier shown by `/status`.
    pub provider: String,
    /// Route workflows to the tool pipeline when true; otherwise reply
    /// that workflows are disabled.
    pub workflows_enabled: bool,
    /// Stream prompt chunks onto the bus when true.
    pub streaming_enabled: bool,
    /// Tool dispatched for workflow requests.
    pub workflow_tool: String,
    /// Token budget surfaced and set via `/tokens`.
    pub token_budget: usize,
    /// Re-entry guard for cancellation (at least 100 ms).
    #[serde(skip)]
    pub cancel_guard: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider: "static".to_string(),
            workflows_enabled: true,
            streaming_enabled: true,
            workflow_tool: "Workflow".to_string(),
            token_budget: 32_000,
            cancel_guard: Duration::from_millis(100),
        }
    }
}

/// Per-orchestrator request metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    /// Requests processed (success or failure).
    pub requests_processed: u64,
    /// Mean response time in milliseconds.
    pub avg_response_ms: f64,
    /// Last activity (Unix milliseconds).
    pub last_activity_ms: i64,
}

/// Builder for [`AgentOrchestrator`].
pub struct OrchestratorBuilder {
    classifier: Option<InputClassifier>,
    commands: Option<CommandRegistry>,
    provider: Option<Arc<dyn ProviderClient>>,
    executor: Option<Arc<ToolExecutor>>,
    queue: Option<Arc<MessageQueue>>,
    contexts: Option<Arc<ContextManager>>,
    recovery: Option<RecoveryCoordinator>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            classifier: None,
            commands: None,
            provider: None,
            executor: None,
            queue: None,
            contexts: None,
            recovery: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Set the input classifier.
    pub fn classifier(mut self, classifier: InputClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Set the command registry.
    pub fn commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Set the LLM provider adapter.
    pub fn provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the tool executor enabling workflows.
    pub fn executor(mut self, executor: Arc<ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the message bus.
    pub fn queue(mut self, queue: Arc<MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Set the context manager.
    pub fn contexts(mut self, contexts: Arc<ContextManager>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    /// Set the recovery coordinator.
    pub fn recovery(mut self, recovery: RecoveryCoordinator) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator.
    ///
    /// Fails with `INVALID_INPUT` when `provider` or `queue` is
    /// missing.
    pub fn build(self) -> Result<Arc<AgentOrchestrator>> {
        let provider = self.provider.ok_or_else(|| {
            QiError::validation(ErrorCode::InvalidInput, "provider is required")
        })?;
        let queue = self
            .queue
            .ok_or_else(|| QiError::validation(ErrorCode::InvalidInput, "queue is required"))?;
        Ok(Arc::new(AgentOrchestrator {
            classifier: self.classifier.unwrap_or_default(),
            commands: self.commands.unwrap_or_default(),
            provider,
            executor: self.executor,
            queue,
            contexts: self.contexts,
            recovery: self.recovery.unwrap_or_default(),
            config: Mutex::new(self.config),
            state: Mutex::new(StateMachine::new()),
            metrics: Mutex::new(OrchestratorMetrics::default()),
            total_response_ms: Mutex::new(0.0),
            last_cancel: Mutex::new(None),
            started: Instant::now(),
        }))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies requests and routes them to handlers, emitting streaming
/// progress and honoring cancellation.
pub struct AgentOrchestrator {
    classifier: InputClassifier,
    commands: CommandRegistry,
    provider: Arc<dyn ProviderClient>,
    executor: Option<Arc<ToolExecutor>>,
    queue: Arc<MessageQueue>,
    contexts: Option<Arc<ContextManager>>,
    recovery: RecoveryCoordinator,
    config: Mutex<OrchestratorConfig>,
    state: Mutex<StateMachine>,
    metrics: Mutex<OrchestratorMetrics>,
    total_response_ms: Mutex<f64>,
    last_cancel: Mutex<Option<Instant>>,
    started: Instant,
}

impl AgentOrchestrator {
    /// Create a builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Current orchestrator state.
    pub fn state(&self) -> AgentState {
        self.lock(&self.state).current()
    }

    /// Snapshot of the request metrics.
    pub fn metrics(&self) -> OrchestratorMetrics {
        *self.lock(&self.metrics)
    }

    /// Process a request to completion, never erroring across this
    /// boundary.
    pub async fn process(self: &Arc<Self>, request: AgentRequest) -> AgentResponse {
        self.run_request(request, None).await
    }

    /// Process a request, streaming
    /// `classification → processing* → (result | error)` events.
    pub fn stream(self: &Arc<Self>, request: AgentRequest) -> mpsc::Receiver<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_request(request, Some(tx)).await;
        });
        rx
    }

    /// Cancel the in-flight request.
    ///
    /// Idempotent and re-entrant-safe: calls within the guard window
    /// (at least 100 ms) are suppressed.
    pub fn cancel(&self) {
        let guard_window = self.lock(&self.config).cancel_guard;
        {
            let mut last = self.lock(&self.last_cancel);
            if let Some(previous) = *last {
                if previous.elapsed() < guard_window {
                    debug!("Cancellation suppressed by re-entry guard");
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        if let Some(token) = self.lock(&self.state).cancel_token() {
            info!("Cancelling in-flight request");
            token.cancel();
        }
        // Cancellation message toward the UI.
        if let Err(error) = self
            .queue
            .enqueue(Message::system_control(ControlAction::Abort))
        {
            debug!(error = %error, "Could not enqueue cancellation message");
        }
    }

    async fn run_request(
        self: &Arc<Self>,
        request: AgentRequest,
        tx: Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> AgentResponse {
        let started = Instant::now();

        let response = match self.run_request_inner(&request, &tx, started).await {
            Ok(response) => response,
            Err(error) => self.failure_response(&request, error, started),
        };

        // Terminal stream event; nothing follows it.
        if let Some(tx) = &tx {
            let event = if response.success {
                AgentStreamEvent::Result {
                    content: response.content.clone(),
                }
            } else {
                AgentStreamEvent::Error {
                    message: response
                        .error
                        .clone()
                        .unwrap_or_else(|| "processing failed".to_string()),
                }
            };
            let _ = tx.send(event).await;
        }

        self.record_metrics(started);
        response
    }

    async fn run_request_inner(
        self: &Arc<Self>,
        request: &AgentRequest,
        tx: &Option<mpsc::Sender<AgentStreamEvent>>,
        started: Instant,
    ) -> Result<AgentResponse> {
        self.transition(AgentState::Classifying)?;

        let classification = self.classifier.classify(&request.input).await;
        debug!(
            input_type = %classification.input_type,
            confidence = classification.confidence,
            "Classified input"
        );
        if let Some(tx) = tx {
            let _ = tx
                .send(AgentStreamEvent::Classification {
                    input_type: classification.input_type,
                    confidence: classification.confidence,
                })
                .await;
        }

        self.transition(AgentState::Processing)?;
        let cancel_token = self
            .lock(&self.state)
            .cancel_token()
            .unwrap_or_default();

        self.record_context_message(request, ContextMessageRole::User, &request.input);

        let routed = self
            .route(request, &classification, &cancel_token, tx)
            .await;

        match routed {
            Ok(mut response) => {
                self.transition(AgentState::Completed)?;
                self.transition(AgentState::Idle)?;
                response.execution_time_ms = started.elapsed().as_millis() as i64;
                self.record_context_message(request, ContextMessageRole::Agent, &response.content);
                let output =
                    Message::agent_output(response.content.clone()).with_correlation(&request.id);
                if let Err(error) = self.queue.enqueue(output) {
                    debug!(error = %error, "Could not enqueue agent output");
                }
                Ok(response)
            }
            Err(error) => Err(error),
        }
    }

    async fn route(
        self: &Arc<Self>,
        request: &AgentRequest,
        classification: &Classification,
        cancel_token: &CancellationToken,
        tx: &Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<AgentResponse> {
        match &classification.extracted {
            ExtractedInput::Command { name, args } => {
                self.handle_command(&CommandRequest {
                    name: name.clone(),
                    args: args.clone(),
                })
            }
            ExtractedInput::Prompt { text } => {
                self.handle_prompt(text, cancel_token, tx).await
            }
            ExtractedInput::Workflow { text, file_refs } => {
                self.handle_workflow(request, text, file_refs, cancel_token)
                    .await
            }
        }
    }

    fn handle_command(&self, command: &CommandRequest) -> Result<AgentResponse> {
        let outcome = self.commands.dispatch(command, &self.command_env())?;
        let mut response =
            AgentResponse::success(outcome.text(), ClassificationType::Command)
                .with_metadata("command", &command.name);
        match outcome {
            CommandOutcome::Clear(_) => {
                response = response.with_metadata("cleared", "true");
            }
            CommandOutcome::SetTokenBudget(budget, _) => {
                self.lock(&self.config).token_budget = budget;
            }
            CommandOutcome::Exit(_) => {
                response = response.with_metadata("exit", "true");
            }
            CommandOutcome::Text(_) => {}
        }
        Ok(response)
    }

    async fn handle_prompt(
        &self,
        prompt: &str,
        cancel_token: &CancellationToken,
        tx: &Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<AgentResponse> {
        let streaming = self.lock(&self.config).streaming_enabled && !self.recovery.is_degraded();

        let content = if streaming {
            self.stream_prompt(prompt, cancel_token, tx).await
        } else {
            self.provider
                .complete(CompletionRequest::new(prompt))
                .await
                .map(|response| response.content)
        };

        match content {
            Ok(content) => {
                self.recovery.remember(prompt, &content);
                Ok(AgentResponse::success(content, ClassificationType::Prompt))
            }
            Err(error) if error.code == ErrorCode::Cancelled => Err(error),
            Err(error) => {
                // Recovery ladder; the first success wins.
                match self.recovery.recover(&error, prompt, &self.provider).await {
                    Some(recovered) => {
                        let mut response = AgentResponse::success(
                            recovered.content,
                            ClassificationType::Prompt,
                        )
                        .with_metadata("recoveryStrategy", recovered.strategy);
                        if recovered.degraded {
                            response = response.with_metadata("degraded", "true");
                        }
                        Ok(response)
                    }
                    None => Err(error),
                }
            }
        }
    }

    async fn stream_prompt(
        &self,
        prompt: &str,
        cancel_token: &CancellationToken,
        tx: &Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<String> {
        let mut stream = self
            .provider
            .stream(CompletionRequest::new(prompt))
            .await?;
        let mut content = String::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    return Err(QiError::cancelled("Prompt request"));
                }
                chunk = stream.next() => chunk,
            };
            match chunk {
                None => break,
                Some(Ok(chunk)) => {
                    if chunk.done {
                        break;
                    }
                    // Whitespace-only chunks are not surfaced.
                    if !chunk.content.trim().is_empty() {
                        let message = Message::stream_chunk(chunk.content.clone(), false);
                        if let Err(error) = self.queue.enqueue(message) {
                            debug!(error = %error, "Could not enqueue stream chunk");
                        }
                        if let Some(tx) = tx {
                            let _ = tx
                                .send(AgentStreamEvent::Processing {
                                    content: chunk.content.clone(),
                                })
                                .await;
                        }
                    }
                    content.push_str(&chunk.content);
                }
                Some(Err(error)) => return Err(error),
            }
        }

        let terminal = Message::stream_chunk("", true);
        if let Err(error) = self.queue.enqueue(terminal) {
            debug!(error = %error, "Could not enqueue terminal stream chunk");
        }
        Ok(content)
    }

    async fn handle_workflow(
        &self,
        request: &AgentRequest,
        text: &str,
        file_refs: &[String],
        cancel_token: &CancellationToken,
    ) -> Result<AgentResponse> {
        let (enabled, workflow_tool) = {
            let config = self.lock(&self.config);
            (
                config.workflows_enabled && !self.recovery.is_degraded(),
                config.workflow_tool.clone(),
            )
        };
        let Some(executor) = (enabled).then_some(self.executor.as_ref()).flatten() else {
            return Ok(AgentResponse::success(
                "Workflows are disabled in this session; the referenced files were not processed.",
                ClassificationType::Workflow,
            )
            .with_metadata("workflowsEnabled", "false"));
        };

        let mut call = ToolCall::new(
            workflow_tool,
            serde_json::json!({
                "prompt": text,
                "files": file_refs,
            }),
        );
        if let Some(context_id) = &request.context_id {
            call = call.with_context(context_id.clone());
        }

        let result = executor
            .execute_cancellable(call, cancel_token.clone())
            .await?;
        let content = match result.output.get("content").and_then(|v| v.as_str()) {
            Some(text) => text.to_string(),
            None => result.output.to_string(),
        };
        Ok(AgentResponse::success(content, ClassificationType::Workflow)
            .with_metadata("files", file_refs.join(",")))
    }

    /// Translate an internal failure into the public response shape and
    /// reset the state machine.
    fn failure_response(
        &self,
        request: &AgentRequest,
        error: QiError,
        started: Instant,
    ) -> AgentResponse {
        let cancelled = error.code == ErrorCode::Cancelled;
        // A rejected entry transition means another request owns the
        // state machine; leave its state alone.
        if error.code != ErrorCode::InvalidTransition {
            let terminal = if cancelled {
                AgentState::Cancelled
            } else {
                AgentState::Error
            };
            let mut state = self.lock(&self.state);
            // Failure never leaves partial state behind.
            if state.transition(terminal).is_err() || state.transition(AgentState::Idle).is_err() {
                state.reset();
            }
        }

        warn!(request_id = %request.id, code = %error.code, "Request failed");
        let surfaced = if error.category.policy().surface_message {
            error.message.clone()
        } else {
            "processing failed".to_string()
        };
        let mut response = AgentResponse::failure(surfaced)
            .with_execution_time(started.elapsed().as_millis() as i64);
        if cancelled {
            response = response.with_metadata("cancelled", "true");
        }
        response.metadata.insert("code".to_string(), error.code.to_string());
        response
    }

    fn command_env(&self) -> CommandEnv {
        let config = self.lock(&self.config);
        let metrics = self.lock(&self.metrics);
        CommandEnv {
            provider: config.provider.clone(),
            model: self.provider.current_model(),
            uptime_ms: self.started.elapsed().as_millis() as i64,
            requests_processed: metrics.requests_processed,
            token_budget: config.token_budget,
            workflows_enabled: config.workflows_enabled,
            degraded: self.recovery.is_degraded(),
        }
    }

    fn record_context_message(&self, request: &AgentRequest, role: ContextMessageRole, text: &str) {
        let (Some(contexts), Some(context_id)) = (&self.contexts, &request.context_id) else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }
        if let Err(error) = contexts.add_message(context_id, ContextMessage::new(role, text)) {
            debug!(error = %error, "Could not record context message");
        }
    }

    fn transition(&self, next: AgentState) -> Result<()> {
        self.lock(&self.state).transition(next)
    }

    fn record_metrics(&self, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as f64;
        let mut metrics = self.lock(&self.metrics);
        metrics.requests_processed += 1;
        let mut total = self.lock(&self.total_response_ms);
        *total += elapsed_ms;
        metrics.avg_response_ms = *total / metrics.requests_processed as f64;
        metrics.last_activity_ms = chrono::Utc::now().timestamp_millis();
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for AgentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOrchestrator")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "orchestrator.test.rs"]
mod tests;
