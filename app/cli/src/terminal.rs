//! Plain-terminal UI adapter.

use std::io::Write;
use std::sync::Mutex;

use qi_protocol::MessagePayload;
use qi_protocol::UiEvent;
use qi_protocol::UiMode;
use qi_protocol::UserInterface;

/// Line-oriented stdout renderer.
pub struct TerminalUi {
    mode: Mutex<UiMode>,
}

impl Default for TerminalUi {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalUi {
    /// Create a renderer.
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(UiMode::Interactive),
        }
    }

    fn flush() {
        let _ = std::io::stdout().flush();
    }
}

impl UserInterface for TerminalUi {
    fn emit(&self, event: UiEvent) {
        match event {
            UiEvent::MessageReceived { message } => {
                if let MessagePayload::AgentOutput { content } = message.payload {
                    if !content.trim().is_empty() {
                        println!("{content}");
                    }
                }
            }
            UiEvent::ProgressUpdate(update) => {
                eprintln!(
                    "  [{:>3.0}%] {} ({})",
                    update.progress * 100.0,
                    update.message,
                    update.phase
                );
            }
            UiEvent::StreamingChunk { content } => {
                print!("{content}");
                Self::flush();
            }
            UiEvent::StreamingComplete => {
                // Close the chunk line only when something streamed.
                if *self.lock_mode() == UiMode::Streaming {
                    println!();
                }
            }
            UiEvent::Cancelled => {
                eprintln!("(cancelled)");
            }
            UiEvent::ModeChanged { mode } => {
                *self.lock_mode() = mode;
            }
            UiEvent::Error { message } => {
                eprintln!("error: {message}");
            }
            UiEvent::ClearInput => {}
        }
    }

    fn set_mode(&self, mode: UiMode) {
        *self.lock_mode() = mode;
    }

    fn set_busy(&self, busy: bool) {
        if busy {
            Self::flush();
        }
    }
}

impl TerminalUi {
    fn lock_mode(&self) -> std::sync::MutexGuard<'_, UiMode> {
        match self.mode.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
