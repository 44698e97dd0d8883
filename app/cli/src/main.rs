//! The `qi` binary: wires the core singletons together and drives the
//! terminal loop.

mod config;
mod terminal;
mod workflow;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing::debug;
use tracing::info;
use tracing_subscriber::EnvFilter;

use qi_agent::AgentOrchestrator;
use qi_agent::AgentRunner;
use qi_agent::ClassifierConfig;
use qi_agent::InputClassifier;
use qi_agent::OrchestratorConfig;
use qi_agent::RecoveryCoordinator;
use qi_context::ContextKind;
use qi_context::ContextManager;
use qi_context::SWEEP_INTERVAL;
use qi_inference::ProviderClient;
use qi_inference::StaticProvider;
use qi_messaging::MessageQueue;
use qi_messaging::QueueOptions;
use qi_protocol::Message;
use qi_security::SecurityBoundaryManager;
use qi_session::MemorySessionStore;
use qi_session::SessionStore;
use qi_tools::ExecutorConfig;
use qi_tools::ToolExecutor;
use qi_tools::ToolRegistry;

use crate::config::CliArgs;
use crate::terminal::TerminalUi;
use crate::workflow::WorkflowTool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Long-lived singletons.
    let security = Arc::new(SecurityBoundaryManager::new());
    let contexts = Arc::new(ContextManager::new(security));
    let queue = MessageQueue::new(QueueOptions::default());

    let provider: Arc<dyn ProviderClient> = Arc::new(StaticProvider::new(&args.model));
    provider
        .validate_config()
        .map_err(|e| anyhow::anyhow!("invalid provider configuration: {e}"))?;

    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(Arc::new(WorkflowTool))
        .map_err(|e| anyhow::anyhow!("tool registration failed: {e}"))?;
    let executor = Arc::new(
        ToolExecutor::new(registry, ExecutorConfig::default()).with_queue(queue.clone()),
    );

    let classifier = InputClassifier::new(ClassifierConfig {
        confidence_threshold: args.confidence_threshold,
        ..ClassifierConfig::default()
    })
    .with_provider(provider.clone());

    let orchestrator = AgentOrchestrator::builder()
        .provider(provider)
        .queue(queue.clone())
        .contexts(contexts.clone())
        .executor(executor)
        .classifier(classifier)
        .recovery(RecoveryCoordinator::new())
        .config(OrchestratorConfig {
            provider: args.provider.clone(),
            workflows_enabled: !args.no_workflows,
            token_budget: args.token_budget,
            ..OrchestratorConfig::default()
        })
        .build()
        .map_err(|e| anyhow::anyhow!("orchestrator construction failed: {e}"))?;

    // Session and conversation context for this run.
    let sessions = MemorySessionStore::new();
    sessions.initialize().await.ok();
    let app = contexts.application_context();
    let session = sessions
        .create_session("interactive", &app.cwd)
        .await
        .map_err(|e| anyhow::anyhow!("session creation failed: {e}"))?;
    let main_context = contexts
        .create_conversation_context(ContextKind::Main, None)
        .map_err(|e| anyhow::anyhow!("context creation failed: {e}"))?;
    debug!(session_id = %session.id, context_id = %main_context.id, "Session ready");

    let sweeper = contexts.spawn_sweeper(SWEEP_INTERVAL);

    // Stdin feeds the bus; EOF or /exit ends the run.
    let stdin_pump = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut lines = stdin.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if queue.enqueue(Message::user_input(trimmed)).is_err() {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => {
                        let _ = queue.enqueue(Message::user_input("/exit"));
                        break;
                    }
                }
            }
        })
    };

    println!("qi - type a prompt, /help for commands, /exit to leave");
    let ui = Arc::new(TerminalUi::new());
    let runner = AgentRunner::new(orchestrator, queue.clone(), ui)
        .with_context_id(main_context.id.clone());
    runner
        .run()
        .await
        .context("agent run loop failed")?;

    info!("Shutting down");
    sessions.save_sessions().await.ok();
    sweeper.abort();
    stdin_pump.abort();
    queue.destroy();
    println!("bye");
    Ok(())
}
