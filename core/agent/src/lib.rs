//! The agent orchestrator and its input classifier.
//!
//! [`InputClassifier`] assigns each piece of user input to one of
//! {command, prompt, workflow}, deterministically first and with an
//! optional model-assisted escalation. [`AgentOrchestrator`] routes the
//! classified input to the command registry, the prompt handler, or the
//! tool pipeline, emitting streaming progress and honoring cancellation.
//! [`AgentRunner`] is the single bus consumer tying UI input to the
//! orchestrator and forwarding outbound events to the UI adapter.

mod classifier;
mod commands;
mod orchestrator;
mod recovery;
mod runner;
mod state;

pub use classifier::ClassifierConfig;
pub use classifier::InputClassifier;
pub use commands::CommandEnv;
pub use commands::CommandHandler;
pub use commands::CommandOutcome;
pub use commands::CommandRegistry;
pub use commands::CommandRequest;
pub use orchestrator::AgentOrchestrator;
pub use orchestrator::OrchestratorBuilder;
pub use orchestrator::OrchestratorConfig;
pub use orchestrator::OrchestratorMetrics;
pub use recovery::RecoveryCoordinator;
pub use runner::AgentRunner;
pub use state::AgentState;
pub use state::StateMachine;
