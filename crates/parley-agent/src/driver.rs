//! Per-participant session driver.
//!
//! Owns one pane exclusively. `&mut self` on every operation serializes
//! dispatches to the same session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_core::{CaptureConfig, CleanerConfig, Config, ParticipantConfig};

use crate::capability::CaptureCapability;
use crate::cleaner::OutputCleaner;
use crate::delta::{Alignment, DeltaComputer};
use crate::error::{AgentError, PaneError};
use crate::event::{SessionEvent, SessionEventKind, SessionEventSink, TracingEventSink};
use crate::lifecycle::{validate_operation_state, validate_transition, SessionOperation};
use crate::readiness::{ReadinessDetector, ReadinessOutcome, ReadinessPolicy};
use crate::snapshot::{PaneSnapshotSource, SnapshotSource};
use crate::tmux::PaneTransport;
use crate::types::{CaptureMode, SessionState, Snapshot, Turn};

pub struct SessionDriver {
    participant_id: String,
    config: ParticipantConfig,
    capture: CaptureConfig,
    transport: Arc<dyn PaneTransport>,
    source: PaneSnapshotSource,
    delta: DeltaComputer,
    cleaner: OutputCleaner,
    state: SessionState,
    capability: Option<CaptureCapability>,
    event_sink: Arc<dyn SessionEventSink>,
}

impl SessionDriver {
    pub fn new(
        participant_id: impl Into<String>,
        config: ParticipantConfig,
        transport: Arc<dyn PaneTransport>,
    ) -> Self {
        let capture = CaptureConfig::default();
        let source = PaneSnapshotSource::new(Arc::clone(&transport), config.target.clone());
        Self {
            participant_id: participant_id.into(),
            cleaner: OutputCleaner::for_participant(&CleanerConfig::default(), &config),
            delta: DeltaComputer::from_config(&capture),
            capture,
            config,
            transport,
            source,
            state: SessionState::Idle,
            capability: None,
            event_sink: Arc::new(TracingEventSink),
        }
    }

    /// Driver for a participant declared in `config`.
    pub fn from_config(
        participant_id: &str,
        config: &Config,
        transport: Arc<dyn PaneTransport>,
    ) -> Option<Self> {
        let participant = config.participant(participant_id)?.clone();
        Some(
            Self::new(participant_id, participant, transport)
                .with_capture_config(config.capture.clone())
                .with_cleaner_config(&config.cleaner),
        )
    }

    pub fn with_capture_config(mut self, capture: CaptureConfig) -> Self {
        self.delta = DeltaComputer::from_config(&capture);
        self.capture = capture;
        self
    }

    pub fn with_cleaner_config(mut self, cleaner: &CleanerConfig) -> Self {
        self.cleaner = OutputCleaner::for_participant(cleaner, &self.config);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn SessionEventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn target(&self) -> &str {
        &self.config.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ParticipantConfig {
        &self.config
    }

    /// Capability seen by the most recent probe.
    pub fn capability(&self) -> Option<CaptureCapability> {
        self.capability
    }

    /// Wait for the process's first-ready signal.
    ///
    /// Idle → AwaitingReadiness → Ready, or Failed with `StartupTimeout`
    /// (or `SessionLost` when the pane does not exist).
    pub async fn start_session(&mut self) -> Result<(), AgentError> {
        validate_operation_state(&self.participant_id, SessionOperation::Start, self.state)?;
        self.transition(SessionState::AwaitingReadiness)?;

        if !self.transport.session_exists(&self.config.target) {
            return Err(self.lose_session("pane not found at startup"));
        }

        let policy = ReadinessPolicy::for_startup(&self.config, &self.capture);
        let timeout = policy.timeout;
        // The first-ready signal is on screen by definition.
        let outcome = ReadinessDetector::new(policy)
            .wait(&self.source, CaptureMode::VisibleOnly)
            .await;

        match outcome {
            Ok(ReadinessOutcome::Ready { polls, elapsed, .. }) => {
                self.transition(SessionState::Ready)?;
                self.emit(
                    SessionEventKind::Started,
                    format!("ready after {polls} polls in {elapsed:?}"),
                );
                Ok(())
            }
            Ok(ReadinessOutcome::TimedOut { polls, .. }) => {
                self.transition(SessionState::Failed)?;
                let err = AgentError::StartupTimeout {
                    participant: self.participant_id.clone(),
                    timeout,
                };
                self.emit(
                    SessionEventKind::StartupTimedOut,
                    format!("{err} ({polls} polls)"),
                );
                Err(err)
            }
            Err(err) => Err(self.pane_failure(err)),
        }
    }

    /// Send `input` and collect the participant's response as a [`Turn`].
    ///
    /// A response that never settles yields `timed_out = true` and the
    /// session stays Ready. Only a vanished pane is an error that changes
    /// state (→ Failed, `SessionLost`).
    pub async fn dispatch_turn(
        &mut self,
        input: &str,
        response_timeout: Duration,
    ) -> Result<Turn, AgentError> {
        validate_operation_state(
            &self.participant_id,
            SessionOperation::DispatchTurn,
            self.state,
        )?;
        if !self.transport.session_exists(&self.config.target) {
            return Err(self.lose_session("pane disappeared before dispatch"));
        }

        let started_at = Utc::now();
        let capability = self.probe_capability()?;
        let (baseline, used_fallback) = self.capture_baseline(capability).await?;
        let mode = baseline.mode();

        self.emit(
            SessionEventKind::TurnDispatched,
            format!("{} chars, {mode} capture", input.chars().count()),
        );
        self.send_input(input).await?;

        let policy = ReadinessPolicy::for_response(&self.config, &self.capture, response_timeout);
        let outcome = ReadinessDetector::new(policy).wait(&self.source, mode).await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.pane_failure(err)),
        };
        let timed_out = !outcome.is_ready();

        let captured = self.source.capture(mode).await;
        let after = match captured {
            Ok(snapshot) => snapshot,
            Err(err @ PaneError::PaneGone { .. }) => return Err(self.pane_failure(err)),
            Err(err) => {
                tracing::debug!(
                    participant = %self.participant_id,
                    target = %self.config.target,
                    error = %err,
                    "post capture failed, using last readiness capture"
                );
                outcome.into_snapshot().unwrap_or_else(|| baseline.clone())
            }
        };

        let (raw_delta, alignment) = self.delta.compute_with_alignment(&baseline, &after)?;
        if alignment == Alignment::Lost {
            self.emit(
                SessionEventKind::AlignmentLost,
                format!(
                    "baseline not found in {mode} capture, kept last {} lines",
                    raw_delta.len()
                ),
            );
        } else if raw_delta.truncated {
            tracing::warn!(
                participant = %self.participant_id,
                target = %self.config.target,
                tail_limit = self.delta.tail_limit(),
                "response longer than tail limit, truncated"
            );
        }

        let cleaned_text = self.cleaner.clean(&raw_delta.text(), Some(input), true);
        let turn = Turn {
            speaker_id: self.participant_id.clone(),
            input: input.to_string(),
            raw_delta,
            cleaned_text,
            started_at,
            completed_at: Utc::now(),
            timed_out,
            used_fallback,
        };

        if timed_out {
            self.emit(
                SessionEventKind::TurnTimedOut,
                format!(
                    "no stable output within {response_timeout:?}, kept {} partial chars",
                    turn.cleaned_text.chars().count()
                ),
            );
        } else {
            self.emit(
                SessionEventKind::TurnCompleted,
                format!(
                    "{} lines in {:?}",
                    turn.raw_delta.len(),
                    turn.duration()
                ),
            );
        }
        Ok(turn)
    }

    fn probe_capability(&mut self) -> Result<CaptureCapability, AgentError> {
        let capability = match self.transport.capability(&self.config.target) {
            Ok(capability) => capability,
            Err(err @ PaneError::PaneGone { .. }) => return Err(self.pane_failure(err)),
            Err(err) => {
                // Unknown: try full history and let the capture decide.
                tracing::debug!(
                    participant = %self.participant_id,
                    target = %self.config.target,
                    error = %err,
                    "capability probe failed"
                );
                CaptureCapability::full_history()
            }
        };
        self.capability = Some(capability);
        Ok(capability)
    }

    /// Full history when supported, otherwise the viewport. Returns the
    /// snapshot and whether the fallback was used.
    async fn capture_baseline(
        &mut self,
        capability: CaptureCapability,
    ) -> Result<(Snapshot, bool), AgentError> {
        let reason = if capability.supports_full_history {
            let captured = self.source.capture_full_history().await;
            match captured {
                Ok(snapshot) => return Ok((snapshot, false)),
                Err(err @ PaneError::PaneGone { .. }) => return Err(self.pane_failure(err)),
                Err(PaneError::Unavailable { reason, .. }) => reason,
                Err(PaneError::Command { message }) => message,
            }
        } else {
            capability.detail_line()
        };

        let degraded = AgentError::CaptureUnavailable {
            participant: self.participant_id.clone(),
            reason,
        };
        tracing::warn!(
            participant = %self.participant_id,
            target = %self.config.target,
            error = %degraded,
            "full-history capture unavailable, degrading to visible-only"
        );
        self.emit(
            SessionEventKind::CaptureDegraded,
            format!("{degraded}; using visible-only capture"),
        );

        let captured = self.source.capture_visible().await;
        match captured {
            Ok(snapshot) => Ok((snapshot, true)),
            Err(err) => Err(self.pane_failure(err)),
        }
    }

    async fn send_input(&mut self, input: &str) -> Result<(), AgentError> {
        if let Err(err) = self.transport.send_text(&self.config.target, input) {
            return Err(self.pane_failure(err));
        }
        if !self.config.text_enter_delay.is_zero() {
            tokio::time::sleep(self.config.text_enter_delay).await;
        }
        if let Err(err) = self.transport.send_submit_key(&self.config.target) {
            return Err(self.pane_failure(err));
        }
        Ok(())
    }

    /// Map a transport failure. A vanished pane fails the session; anything
    /// else is reported without changing state.
    fn pane_failure(&mut self, err: PaneError) -> AgentError {
        match err {
            PaneError::PaneGone { .. } => self.lose_session(&err.to_string()),
            other => AgentError::Transport {
                participant: self.participant_id.clone(),
                message: other.to_string(),
            },
        }
    }

    fn lose_session(&mut self, detail: &str) -> AgentError {
        if validate_transition(self.state, SessionState::Failed).is_ok() {
            self.state = SessionState::Failed;
        }
        self.emit(SessionEventKind::SessionLost, detail);
        AgentError::SessionLost {
            participant: self.participant_id.clone(),
            target: self.config.target.clone(),
        }
    }

    fn transition(&mut self, to: SessionState) -> Result<(), AgentError> {
        validate_transition(self.state, to).map_err(|e| e.to_agent_error(&self.participant_id))?;
        tracing::debug!(
            participant = %self.participant_id,
            from = %self.state,
            to = %to,
            "session state transition"
        );
        self.state = to;
        Ok(())
    }

    fn emit(&self, kind: SessionEventKind, detail: impl Into<String>) {
        self.event_sink.record(SessionEvent::new(
            self.participant_id.clone(),
            self.config.target.clone(),
            kind,
            detail,
        ));
    }
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("participant_id", &self.participant_id)
            .field("target", &self.config.target)
            .field("state", &self.state)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}
