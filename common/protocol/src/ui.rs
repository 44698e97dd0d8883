//! UI adapter contract.
//!
//! The core drives any renderer through [`UserInterface`] alone: a
//! terminal view, a web front-end, or a test harness. Inbound input,
//! cancellation, and commands flow the other way by enqueueing onto the
//! message bus, so the trait only carries the outbound surface.

use serde::Deserialize;
use serde::Serialize;

use crate::message::Message;
use crate::tool::ProgressUpdate;

/// Interaction mode shown by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiMode {
    #[default]
    Interactive,
    Command,
    Streaming,
}

impl UiMode {
    /// Get the mode as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            UiMode::Interactive => "interactive",
            UiMode::Command => "command",
            UiMode::Streaming => "streaming",
        }
    }
}

/// Events the core emits toward the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// A bus message was routed to the UI.
    MessageReceived { message: Message },
    /// Tool pipeline progress.
    ProgressUpdate(ProgressUpdate),
    /// One streaming chunk of model output.
    StreamingChunk { content: String },
    /// The stream for the current request finished.
    StreamingComplete,
    /// The in-flight request was cancelled.
    Cancelled,
    /// The interaction mode changed.
    ModeChanged { mode: UiMode },
    /// A user-facing error.
    Error { message: String },
    /// The input line should be cleared.
    ClearInput,
}

/// Abstract terminal view consumed by the core.
pub trait UserInterface: Send + Sync {
    /// Deliver an event to the renderer.
    fn emit(&self, event: UiEvent);

    /// Switch the interaction mode.
    fn set_mode(&self, mode: UiMode);

    /// Toggle the busy indicator.
    fn set_busy(&self, busy: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_strings() {
        assert_eq!(UiMode::Interactive.as_str(), "interactive");
        assert_eq!(UiMode::default(), UiMode::Interactive);
    }

    #[test]
    fn test_event_tagging() {
        let json = serde_json::to_string(&UiEvent::StreamingComplete).unwrap();
        assert_eq!(json, "{\"type\":\"streaming_complete\"}");

        let json = serde_json::to_string(&UiEvent::StreamingChunk {
            content: "Rec".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"streaming_chunk\""));
    }
}
