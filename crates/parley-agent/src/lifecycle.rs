//! Session state transitions and operation guardrails.

use crate::error::AgentError;
use crate::types::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOperation {
    Start,
    DispatchTurn,
}

impl SessionOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start_session",
            Self::DispatchTurn => "dispatch_turn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: SessionState,
    pub to: SessionState,
}

impl TransitionError {
    pub fn to_agent_error(self, participant: &str) -> AgentError {
        AgentError::InvalidState {
            participant: participant.to_string(),
            state: self.from.to_string(),
            operation: format!("transition_to_{}", self.to),
        }
    }
}

pub fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
    if from == to {
        return !from.is_terminal();
    }

    matches!(
        (from, to),
        (SessionState::Idle, SessionState::AwaitingReadiness)
            | (SessionState::Idle, SessionState::Failed)
            | (SessionState::AwaitingReadiness, SessionState::Ready)
            | (SessionState::AwaitingReadiness, SessionState::Failed)
            // A turn's pane can vanish mid-dispatch.
            | (SessionState::Ready, SessionState::Failed)
    )
}

pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), TransitionError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

pub fn operation_allows_state(operation: SessionOperation, state: SessionState) -> bool {
    match operation {
        SessionOperation::Start => matches!(state, SessionState::Idle),
        SessionOperation::DispatchTurn => matches!(state, SessionState::Ready),
    }
}

pub fn validate_operation_state(
    participant: &str,
    operation: SessionOperation,
    state: SessionState,
) -> Result<(), AgentError> {
    if operation_allows_state(operation, state) {
        Ok(())
    } else {
        Err(AgentError::InvalidState {
            participant: participant.to_string(),
            state: state.to_string(),
            operation: operation.as_str().to_string(),
        })
    }
}
