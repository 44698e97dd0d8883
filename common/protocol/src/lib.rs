//! Protocol types for the qi agent core.
//!
//! This crate provides the foundational types shared across the qi
//! ecosystem:
//! - Bus messages with priorities and type-tagged payloads
//! - Tool call/result records and pipeline progress updates
//! - Security data model (restrictions, permission rules, roles)
//! - Agent request/response/stream-event types and classification output
//! - The UI adapter contract

pub mod agent;
pub mod message;
pub mod security;
pub mod tool;
pub mod ui;

pub use agent::AgentRequest;
pub use agent::AgentResponse;
pub use agent::AgentStreamEvent;
pub use agent::Classification;
pub use agent::ClassificationMethod;
pub use agent::ClassificationType;
pub use agent::ExtractedInput;
pub use message::ControlAction;
pub use message::Message;
pub use message::MessagePayload;
pub use message::MessagePriority;
pub use message::MessageType;
pub use security::AccessAction;
pub use security::AgentSpecialization;
pub use security::PermissionCheckResult;
pub use security::PermissionRule;
pub use security::ResourceType;
pub use security::Role;
pub use security::SecurityRestrictions;
pub use tool::ConcurrencySafety;
pub use tool::ExecutionMetrics;
pub use tool::ExecutionPhase;
pub use tool::ProgressUpdate;
pub use tool::ToolCall;
pub use tool::ToolResult;
pub use tool::ToolResultMetadata;
pub use ui::UiEvent;
pub use ui::UiMode;
pub use ui::UserInterface;
