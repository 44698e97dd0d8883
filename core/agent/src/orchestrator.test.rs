use super::*;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use qi_inference::ChunkStream;
use qi_inference::CompletionChunk;
use qi_inference::CompletionResponse;
use qi_inference::StaticProvider;
use qi_protocol::MessagePayload;
use qi_tools::ExecutorConfig;
use qi_tools::Tool;
use qi_tools::ToolContext;
use qi_tools::ToolRegistry;
use serde_json::Value;

fn orchestrator_with(provider: Arc<dyn ProviderClient>) -> (Arc<AgentOrchestrator>, Arc<MessageQueue>) {
    let queue = MessageQueue::with_defaults();
    let orchestrator = AgentOrchestrator::builder()
        .provider(provider)
        .queue(queue.clone())
        .build()
        .unwrap();
    (orchestrator, queue)
}

async fn drain(queue: &Arc<MessageQueue>) -> Vec<qi_protocol::Message> {
    queue.done().unwrap();
    let mut messages = Vec::new();
    let mut iter = queue.iterate().unwrap();
    while let Some(message) = iter.next().await.unwrap() {
        messages.push(message);
    }
    messages
}

#[tokio::test]
async fn test_status_command_end_to_end() {
    let (orchestrator, _queue) = orchestrator_with(Arc::new(StaticProvider::new("static-1")));

    let response = orchestrator.process(AgentRequest::new("/status")).await;
    assert!(response.success);
    assert_eq!(response.response_type, Some(ClassificationType::Command));
    assert!(response.content.contains("Status:"));
    assert!(response.content.contains("Provider:"));
    assert!(response.content.contains("Model:"));
    assert_eq!(orchestrator.state(), AgentState::Idle);
}

#[tokio::test]
async fn test_unknown_command_falls_through() {
    let (orchestrator, _queue) = orchestrator_with(Arc::new(StaticProvider::new("static-1")));
    let response = orchestrator.process(AgentRequest::new("/wibble")).await;
    assert!(response.success);
    assert!(response.content.contains("Unknown command: /wibble"));
}

#[tokio::test]
async fn test_tokens_command_updates_budget() {
    let (orchestrator, _queue) = orchestrator_with(Arc::new(StaticProvider::new("static-1")));
    let set = orchestrator.process(AgentRequest::new("/tokens 4096")).await;
    assert!(set.content.contains("4096"));

    let show = orchestrator.process(AgentRequest::new("/tokens")).await;
    assert_eq!(show.content, "Token budget: 4096");
}

#[tokio::test]
async fn test_prompt_streams_chunks_onto_bus() {
    let provider = Arc::new(StaticProvider::new("static-1"));
    provider.push_reply(["Rec", "ursion", " is elegant"]);
    let (orchestrator, queue) = orchestrator_with(provider);

    let response = orchestrator
        .process(AgentRequest::new("Explain recursion"))
        .await;
    assert!(response.success);
    assert_eq!(response.response_type, Some(ClassificationType::Prompt));
    assert_eq!(response.content, "Recursion is elegant");

    let messages = drain(&queue).await;
    let chunks: Vec<(&str, bool)> = messages
        .iter()
        .filter_map(|message| match &message.payload {
            MessagePayload::StreamChunk { content, done } => Some((content.as_str(), *done)),
            _ => None,
        })
        .collect();
    // Three content chunks followed by exactly one terminal chunk.
    assert_eq!(
        chunks,
        vec![
            ("Rec", false),
            ("ursion", false),
            (" is elegant", false),
            ("", true)
        ]
    );

    // The final agent output follows the chunks on the bus.
    let output_position = messages
        .iter()
        .position(|m| matches!(m.payload, MessagePayload::AgentOutput { .. }))
        .unwrap();
    assert!(output_position > 2);
}

#[tokio::test]
async fn test_stream_surface_event_order() {
    let provider = Arc::new(StaticProvider::new("static-1"));
    provider.push_reply(["a", "b"]);
    let (orchestrator, _queue) = orchestrator_with(provider);

    let mut rx = orchestrator.stream(AgentRequest::new("Explain something"));
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(
        events.first(),
        Some(AgentStreamEvent::Classification {
            input_type: ClassificationType::Prompt,
            ..
        })
    ));
    assert!(matches!(
        events.last(),
        Some(AgentStreamEvent::Result { content }) if content == "ab"
    ));
    // Nothing follows the terminal event, and processing events sit
    // strictly between classification and result.
    let processing: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, AgentStreamEvent::Processing { .. }))
        .collect();
    assert_eq!(processing.len(), 2);
}

struct SlowProvider;

#[async_trait]
impl ProviderClient for SlowProvider {
    async fn complete(&self, _request: CompletionRequest) -> qi_error::Result<CompletionResponse> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(CompletionResponse {
            content: "late".to_string(),
            model: "slow".to_string(),
        })
    }

    async fn stream(&self, _request: CompletionRequest) -> qi_error::Result<ChunkStream> {
        // One chunk, then hang until cancelled.
        let stream = futures::stream::unfold(0u32, |count| async move {
            if count == 0 {
                Some((
                    Ok(CompletionChunk {
                        content: "partial".to_string(),
                        done: false,
                    }),
                    1,
                ))
            } else {
                tokio::time::sleep(Duration::from_secs(60)).await;
                None
            }
        });
        Ok(Box::pin(stream))
    }

    fn current_model(&self) -> String {
        "slow".to_string()
    }

    fn supported_providers(&self) -> Vec<String> {
        vec!["slow".to_string()]
    }

    fn validate_config(&self) -> qi_error::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_cancellation_mid_stream() {
    let (orchestrator, _queue) = orchestrator_with(Arc::new(SlowProvider));

    let worker = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .process(AgentRequest::new("long running task"))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.cancel();

    let response = tokio::time::timeout(Duration::from_millis(500), worker)
        .await
        .expect("cancellation must resolve the request promptly")
        .unwrap();

    assert!(!response.success);
    assert!(response.error.unwrap().contains("cancelled"));
    assert_eq!(
        response.metadata.get("cancelled").map(String::as_str),
        Some("true")
    );
    assert_eq!(orchestrator.state(), AgentState::Idle);
}

#[tokio::test]
async fn test_double_cancel_within_guard_is_one_cancel() {
    let (orchestrator, queue) = orchestrator_with(Arc::new(SlowProvider));

    let worker = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.process(AgentRequest::new("long task")).await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    orchestrator.cancel();
    orchestrator.cancel(); // suppressed by the guard
    let response = worker.await.unwrap();
    assert!(!response.success);

    // Exactly one Abort control message reached the bus.
    let messages = drain(&queue).await;
    let aborts = messages
        .iter()
        .filter(|message| {
            matches!(
                message.payload,
                MessagePayload::SystemControl {
                    action: ControlAction::Abort
                }
            )
        })
        .count();
    assert_eq!(aborts, 1);
}

#[tokio::test]
async fn test_workflow_disabled_reply() {
    let provider = Arc::new(StaticProvider::new("static-1"));
    let queue = MessageQueue::with_defaults();
    let orchestrator = AgentOrchestrator::builder()
        .provider(provider)
        .queue(queue)
        .config(OrchestratorConfig {
            workflows_enabled: false,
            ..OrchestratorConfig::default()
        })
        .build()
        .unwrap();

    let response = orchestrator
        .process(AgentRequest::new("fix @src/main.rs"))
        .await;
    assert!(response.success);
    assert_eq!(response.response_type, Some(ClassificationType::Workflow));
    assert!(response.content.contains("disabled"));
}

struct WorkflowTool;

#[async_trait]
impl Tool for WorkflowTool {
    fn name(&self) -> &str {
        "Workflow"
    }

    fn description(&self) -> &str {
        "Process referenced files"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "files": {"type": "array"}
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> qi_error::Result<Value> {
        let files = input["files"]
            .as_array()
            .map(|refs| refs.len())
            .unwrap_or(0);
        Ok(serde_json::json!({"content": format!("Processed {files} file(s)")}))
    }
}

#[tokio::test]
async fn test_workflow_routes_to_tool_pipeline() {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(WorkflowTool)).unwrap();
    let executor = Arc::new(qi_tools::ToolExecutor::new(
        registry,
        ExecutorConfig::default(),
    ));

    let queue = MessageQueue::with_defaults();
    let orchestrator = AgentOrchestrator::builder()
        .provider(Arc::new(StaticProvider::new("static-1")))
        .queue(queue)
        .executor(executor)
        .build()
        .unwrap();

    let response = orchestrator
        .process(AgentRequest::new("fix the bug in @a.rs and @b.rs"))
        .await;
    assert!(response.success);
    assert_eq!(response.content, "Processed 2 file(s)");
    assert_eq!(
        response.metadata.get("files").map(String::as_str),
        Some("a.rs,b.rs")
    );
}

#[tokio::test]
async fn test_errors_never_cross_the_boundary() {
    struct BrokenProvider;

    #[async_trait]
    impl ProviderClient for BrokenProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> qi_error::Result<CompletionResponse> {
            Err(QiError::system(ErrorCode::SystemError, "provider exploded"))
        }

        async fn stream(&self, _request: CompletionRequest) -> qi_error::Result<ChunkStream> {
            Err(QiError::system(ErrorCode::SystemError, "provider exploded"))
        }

        fn current_model(&self) -> String {
            "broken".to_string()
        }

        fn supported_providers(&self) -> Vec<String> {
            vec!["broken".to_string()]
        }

        fn validate_config(&self) -> qi_error::Result<()> {
            Ok(())
        }
    }

    let (orchestrator, _queue) = orchestrator_with(Arc::new(BrokenProvider));
    let response = orchestrator.process(AgentRequest::new("hello there")).await;
    assert!(!response.success);
    // SYSTEM errors surface as a generic message once recovery is
    // exhausted.
    assert_eq!(response.error.as_deref(), Some("processing failed"));
    assert_eq!(orchestrator.state(), AgentState::Idle);
}

#[tokio::test]
async fn test_metrics_update_per_request() {
    let (orchestrator, _queue) = orchestrator_with(Arc::new(StaticProvider::new("static-1")));
    orchestrator.process(AgentRequest::new("/status")).await;
    orchestrator.process(AgentRequest::new("/help")).await;

    let metrics = orchestrator.metrics();
    assert_eq!(metrics.requests_processed, 2);
    assert!(metrics.last_activity_ms > 0);
    assert!(metrics.avg_response_ms >= 0.0);
}

#[tokio::test]
async fn test_context_messages_recorded_append_only() {
    let security = Arc::new(qi_security::SecurityBoundaryManager::new());
    let contexts = Arc::new(ContextManager::new(security));
    let main = contexts
        .create_conversation_context(qi_context::ContextKind::Main, None)
        .unwrap();

    let provider = Arc::new(StaticProvider::new("static-1"));
    provider.push_reply(["answer"]);
    let queue = MessageQueue::with_defaults();
    let orchestrator = AgentOrchestrator::builder()
        .provider(provider)
        .queue(queue)
        .contexts(contexts.clone())
        .build()
        .unwrap();

    orchestrator
        .process(AgentRequest::new("what is this repo").with_context(main.id.clone()))
        .await;

    let stored = contexts.get_context(&main.id).unwrap();
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].role, ContextMessageRole::User);
    assert_eq!(stored.messages[1].role, ContextMessageRole::Agent);
}
