//! parley-agent: turn capture for interactive programs running in tmux panes.
//!
//! A [`SessionDriver`] owns one pane. It sends input, waits for the output
//! to settle ([`readiness`]), diffs the capture against a baseline
//! ([`delta`]) and strips terminal chrome ([`cleaner`]) to produce a
//! [`Turn`]. A [`TurnOrchestrator`] stages a conversation across several
//! drivers and records a [`Transcript`].

pub mod capability;
pub mod cleaner;
pub mod delta;
pub mod driver;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod mock;
pub mod orchestrator;
pub mod readiness;
pub mod snapshot;
pub mod tmux;
pub mod types;

pub use capability::CaptureCapability;
pub use cleaner::OutputCleaner;
pub use delta::{Alignment, DeltaComputer};
pub use driver::SessionDriver;
pub use error::{AgentError, OrchestratorError, PaneError};
pub use event::{
    InMemoryEventSink, NullEventSink, SessionEvent, SessionEventKind, SessionEventSink,
    TracingEventSink,
};
pub use orchestrator::{
    ConversationPlan, PromptComposer, RelayComposer, RoundRobin, ScriptedOrder, SpeakerSchedule,
    TemplateComposer, TurnOrchestrator,
};
pub use readiness::{ReadinessDetector, ReadinessOutcome, ReadinessPolicy};
pub use snapshot::{PaneSnapshotSource, SnapshotSource};
pub use tmux::{PaneTransport, ShellTmuxTransport};
pub use types::{CaptureMode, Delta, SessionState, Snapshot, StopReason, Transcript, Turn};
