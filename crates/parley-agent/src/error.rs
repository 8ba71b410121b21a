//! Error types for pane transport, session driving and orchestration.
//!
//! Capture and alignment irregularities are normally absorbed and surfaced
//! as flags on `Delta`/`Turn`; only `StartupTimeout` and `SessionLost` end a
//! conversation.

use std::time::Duration;

use crate::types::{CaptureMode, Transcript};

/// Failure reported by a [`PaneTransport`](crate::tmux::PaneTransport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaneError {
    /// The requested capture is not supported for this pane.
    #[error("capture unavailable for {target:?}: {reason}")]
    Unavailable { target: String, reason: String },

    /// The pane or its session no longer exists.
    #[error("pane {target:?} no longer exists")]
    PaneGone { target: String },

    /// The multiplexer command failed for another reason.
    #[error("tmux command failed: {message}")]
    Command { message: String },
}

/// Normalized error for session driving.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("full-history capture unavailable for {participant:?}: {reason}")]
    CaptureUnavailable { participant: String, reason: String },

    #[error("participant {participant:?} did not become ready within {timeout:?}")]
    StartupTimeout {
        participant: String,
        timeout: Duration,
    },

    #[error("participant {participant:?} did not finish responding within {timeout:?}")]
    ResponseTimeout {
        participant: String,
        timeout: Duration,
    },

    #[error("session for participant {participant:?} ({target}) was lost")]
    SessionLost { participant: String, target: String },

    #[error("participant {participant:?} in state {state:?} does not support {operation:?}")]
    InvalidState {
        participant: String,
        state: String,
        operation: String,
    },

    #[error("cannot compute a delta between {before} and {after} snapshots")]
    ModeMismatch {
        before: CaptureMode,
        after: CaptureMode,
    },

    #[error("transport error for participant {participant:?}: {message}")]
    Transport { participant: String, message: String },
}

impl AgentError {
    /// Whether this error ends the whole conversation.
    pub fn is_fatal_to_conversation(&self) -> bool {
        matches!(
            self,
            Self::StartupTimeout { .. } | Self::SessionLost { .. }
        )
    }
}

/// Failure of a conversation run. Fatal variants keep the partial transcript.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no session driver registered for speaker {speaker:?}")]
    UnknownSpeaker { speaker: String },

    #[error("session startup failed: {source}")]
    Startup {
        #[source]
        source: AgentError,
        transcript: Transcript,
    },

    #[error("conversation ended, session lost for {speaker:?}: {source}")]
    SessionLost {
        speaker: String,
        #[source]
        source: AgentError,
        transcript: Transcript,
    },

    #[error("turn for {speaker:?} failed: {source}")]
    Turn {
        speaker: String,
        #[source]
        source: AgentError,
        transcript: Transcript,
    },
}

impl OrchestratorError {
    /// The transcript recorded before the failure, if any.
    pub fn partial_transcript(&self) -> Option<&Transcript> {
        match self {
            Self::UnknownSpeaker { .. } => None,
            Self::Startup { transcript, .. }
            | Self::SessionLost { transcript, .. }
            | Self::Turn { transcript, .. } => Some(transcript),
        }
    }
}
