//! Bus messages.
//!
//! A [`Message`] is an immutable record: once enqueued, none of its fields
//! change. The payload is a tagged enum so every consumer switch is
//! exhaustively checked; the [`MessageType`] discriminant is derived from
//! the payload, never stored separately.

use serde::Deserialize;
use serde::Serialize;
use strum::AsRefStr;

use crate::tool::ProgressUpdate;

/// Message type discriminant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    UserInput,
    Command,
    AgentOutput,
    SystemControl,
    Progress,
    StreamChunk,
}

/// Delivery priority. Higher priorities drain first when priority
/// ordering is enabled on the bus.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl MessagePriority {
    /// All priorities from highest to lowest (bus drain order).
    pub const DRAIN_ORDER: [MessagePriority; 4] = [
        MessagePriority::Critical,
        MessagePriority::High,
        MessagePriority::Normal,
        MessagePriority::Low,
    ];

    /// Lane index used by the bus (0 = Low .. 3 = Critical).
    pub const fn lane(&self) -> usize {
        *self as usize
    }
}

/// Control actions carried by `SystemControl` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Pause,
    Resume,
    Abort,
    Reset,
    Shutdown,
}

/// Type-tagged message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Raw user input from the terminal.
    UserInput { input: String },
    /// A parsed slash-command.
    Command { name: String, args: Vec<String> },
    /// Final agent output for a request.
    AgentOutput { content: String },
    /// Bus/system control signal.
    SystemControl { action: ControlAction },
    /// Tool pipeline progress.
    Progress(ProgressUpdate),
    /// One chunk of a streaming response.
    StreamChunk { content: String, done: bool },
}

impl MessagePayload {
    /// The type discriminant for this payload.
    pub const fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::UserInput { .. } => MessageType::UserInput,
            MessagePayload::Command { .. } => MessageType::Command,
            MessagePayload::AgentOutput { .. } => MessageType::AgentOutput,
            MessagePayload::SystemControl { .. } => MessageType::SystemControl,
            MessagePayload::Progress(_) => MessageType::Progress,
            MessagePayload::StreamChunk { .. } => MessageType::StreamChunk,
        }
    }
}

/// An immutable bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: String,
    /// Type-tagged payload.
    pub payload: MessagePayload,
    /// Delivery priority.
    pub priority: MessagePriority,
    /// Optional correlation to a request or tool call.
    pub correlation_id: Option<String>,
    /// Creation timestamp (Unix milliseconds).
    pub timestamp: i64,
}

impl Message {
    /// Create a message with the default (Normal) priority.
    pub fn new(payload: MessagePayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            priority: MessagePriority::Normal,
            correlation_id: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a user-input message.
    pub fn user_input(input: impl Into<String>) -> Self {
        Self::new(MessagePayload::UserInput {
            input: input.into(),
        })
    }

    /// Create a command message.
    pub fn command(name: impl Into<String>, args: Vec<String>) -> Self {
        Self::new(MessagePayload::Command {
            name: name.into(),
            args,
        })
        .with_priority(MessagePriority::High)
    }

    /// Create an agent-output message.
    pub fn agent_output(content: impl Into<String>) -> Self {
        Self::new(MessagePayload::AgentOutput {
            content: content.into(),
        })
    }

    /// Create a system-control message. Control signals jump the queue.
    pub fn system_control(action: ControlAction) -> Self {
        Self::new(MessagePayload::SystemControl { action })
            .with_priority(MessagePriority::Critical)
    }

    /// Create a progress message correlated to its tool call.
    pub fn progress(update: ProgressUpdate) -> Self {
        let correlation_id = update.call_id.clone();
        Self::new(MessagePayload::Progress(update)).with_correlation(correlation_id)
    }

    /// Create a stream-chunk message.
    pub fn stream_chunk(content: impl Into<String>, done: bool) -> Self {
        Self::new(MessagePayload::StreamChunk {
            content: content.into(),
            done,
        })
    }

    /// Override the priority.
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a correlation id.
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// The type discriminant of the payload.
    pub const fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// Age of this message relative to `now` (Unix milliseconds).
    pub fn age_ms(&self, now: i64) -> i64 {
        now - self.timestamp
    }
}

#[cfg(test)]
#[path = "message.test.rs"]
mod tests;
