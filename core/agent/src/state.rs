//! Orchestrator state machine.

use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use qi_error::ErrorCode;
use qi_error::QiError;
use qi_error::Result;

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Classifying,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl AgentState {
    /// Get the state as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Classifying => "classifying",
            AgentState::Processing => "processing",
            AgentState::Completed => "completed",
            AgentState::Error => "error",
            AgentState::Cancelled => "cancelled",
        }
    }

    /// Allowed successor states.
    fn successors(&self) -> &'static [AgentState] {
        match self {
            AgentState::Idle => &[AgentState::Classifying],
            AgentState::Classifying => &[
                AgentState::Processing,
                AgentState::Error,
                AgentState::Cancelled,
            ],
            AgentState::Processing => &[
                AgentState::Completed,
                AgentState::Error,
                AgentState::Cancelled,
            ],
            AgentState::Completed | AgentState::Error | AgentState::Cancelled => {
                &[AgentState::Idle]
            }
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State machine with transition validation and hooks.
///
/// Entering `Processing` arms a fresh cancellation token; returning to
/// `Idle` disarms it.
#[derive(Debug, Default)]
pub struct StateMachine {
    current: AgentState,
    cancel_token: Option<CancellationToken>,
    transitions: u64,
}

impl StateMachine {
    /// Create a machine in `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn current(&self) -> AgentState {
        self.current
    }

    /// Number of successful transitions.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// The cancellation token armed for the in-flight request, if any.
    pub fn cancel_token(&self) -> Option<CancellationToken> {
        self.cancel_token.clone()
    }

    /// Transition to `next`. Forbidden transitions fail with
    /// `INVALID_TRANSITION` and leave the state unchanged.
    pub fn transition(&mut self, next: AgentState) -> Result<()> {
        if !self.current.successors().contains(&next) {
            return Err(QiError::validation(
                ErrorCode::InvalidTransition,
                format!("Invalid transition: {} -> {next}", self.current),
            ));
        }
        trace!(from = %self.current, to = %next, "State transition");

        // Pre-hooks.
        if next == AgentState::Processing {
            self.cancel_token = Some(CancellationToken::new());
        }

        self.current = next;
        self.transitions += 1;

        // Post-hooks.
        if next == AgentState::Idle {
            self.cancel_token = None;
        }
        Ok(())
    }

    /// Force the machine back to `Idle` from any state.
    ///
    /// Used by cancellation paths, which must never leave partial
    /// state behind.
    pub fn reset(&mut self) {
        self.current = AgentState::Idle;
        self.cancel_token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_happy_cycle() {
        let mut machine = StateMachine::new();
        machine.transition(AgentState::Classifying).unwrap();
        machine.transition(AgentState::Processing).unwrap();
        machine.transition(AgentState::Completed).unwrap();
        machine.transition(AgentState::Idle).unwrap();
        assert_eq!(machine.current(), AgentState::Idle);
        assert_eq!(machine.transitions(), 4);
    }

    #[test]
    fn test_forbidden_transitions_rejected() {
        let mut machine = StateMachine::new();
        let err = machine.transition(AgentState::Completed).err().unwrap();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
        assert_eq!(machine.current(), AgentState::Idle);

        machine.transition(AgentState::Classifying).unwrap();
        assert!(machine.transition(AgentState::Idle).is_err());
    }

    #[test]
    fn test_processing_arms_cancel_token() {
        let mut machine = StateMachine::new();
        assert!(machine.cancel_token().is_none());

        machine.transition(AgentState::Classifying).unwrap();
        machine.transition(AgentState::Processing).unwrap();
        let token = machine.cancel_token().unwrap();
        assert!(!token.is_cancelled());

        machine.transition(AgentState::Cancelled).unwrap();
        machine.transition(AgentState::Idle).unwrap();
        assert!(machine.cancel_token().is_none());
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut machine = StateMachine::new();
        machine.transition(AgentState::Classifying).unwrap();
        machine.transition(AgentState::Processing).unwrap();
        machine.reset();
        assert_eq!(machine.current(), AgentState::Idle);
        assert!(machine.cancel_token().is_none());
    }
}
