//! Session events for audit and debugging.
//!
//! The driver emits one event per notable step (start, dispatch, completion,
//! degraded capture, lost alignment, lost session). The default sink writes
//! them to `tracing`; tests collect them in memory.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Started,
    StartupTimedOut,
    TurnDispatched,
    TurnCompleted,
    TurnTimedOut,
    /// Full-history capture failed; the turn used visible-only capture.
    CaptureDegraded,
    /// The baseline could not be anchored; the delta is a bounded tail.
    AlignmentLost,
    SessionLost,
}

impl SessionEventKind {
    /// Whether the event signals degraded or failed operation.
    pub fn is_warning(self) -> bool {
        matches!(
            self,
            Self::StartupTimedOut
                | Self::TurnTimedOut
                | Self::CaptureDegraded
                | Self::AlignmentLost
                | Self::SessionLost
        )
    }
}

impl std::fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::StartupTimedOut => "startup_timed_out",
            Self::TurnDispatched => "turn_dispatched",
            Self::TurnCompleted => "turn_completed",
            Self::TurnTimedOut => "turn_timed_out",
            Self::CaptureDegraded => "capture_degraded",
            Self::AlignmentLost => "alignment_lost",
            Self::SessionLost => "session_lost",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub participant: String,
    pub target: String,
    pub kind: SessionEventKind,
    pub detail: String,
}

impl SessionEvent {
    pub fn new(
        participant: impl Into<String>,
        target: impl Into<String>,
        kind: SessionEventKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            participant: participant.into(),
            target: target.into(),
            kind,
            detail: detail.into(),
        }
    }
}

pub trait SessionEventSink: Send + Sync {
    fn record(&self, event: SessionEvent);
}

/// Writes events to `tracing`, warnings at `warn` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl SessionEventSink for TracingEventSink {
    fn record(&self, event: SessionEvent) {
        if event.kind == SessionEventKind::SessionLost {
            tracing::error!(
                participant = %event.participant,
                target = %event.target,
                kind = %event.kind,
                "{}",
                event.detail
            );
        } else if event.kind.is_warning() {
            tracing::warn!(
                participant = %event.participant,
                target = %event.target,
                kind = %event.kind,
                "{}",
                event.detail
            );
        } else {
            tracing::info!(
                participant = %event.participant,
                target = %event.target,
                kind = %event.kind,
                "{}",
                event.detail
            );
        }
    }
}

/// In-memory event sink for testing.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: std::sync::Mutex<Vec<SessionEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<SessionEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    pub fn count(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl SessionEventSink for InMemoryEventSink {
    fn record(&self, event: SessionEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// No-op event sink that discards all events.
pub struct NullEventSink;

impl SessionEventSink for NullEventSink {
    fn record(&self, _event: SessionEvent) {}
}
