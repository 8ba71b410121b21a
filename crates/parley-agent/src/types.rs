//! Data model for captures, deltas, turns and transcripts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// How a snapshot was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    FullHistory,
    VisibleOnly,
}

impl CaptureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullHistory => "full-history",
            Self::VisibleOnly => "visible-only",
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable capture of a pane's lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    lines: Vec<String>,
    captured_at: DateTime<Utc>,
    mode: CaptureMode,
}

impl Snapshot {
    pub fn new(lines: Vec<String>, mode: CaptureMode) -> Self {
        Self {
            lines,
            captured_at: Utc::now(),
            mode,
        }
    }

    /// Build a snapshot from raw capture output.
    pub fn from_text(text: &str, mode: CaptureMode) -> Self {
        Self::new(text.lines().map(str::to_string).collect(), mode)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Lines up to the last non-blank one. tmux pads captures with empty
    /// rows below the cursor; those are not content.
    pub fn content_lines(&self) -> &[String] {
        let end = self
            .lines
            .iter()
            .rposition(|line| !line.trim().is_empty())
            .map_or(0, |idx| idx + 1);
        &self.lines[..end]
    }

    /// Content lines joined with `\n`.
    pub fn text(&self) -> String {
        self.content_lines().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.content_lines().is_empty()
    }
}

/// Output new since a baseline snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub lines: Vec<String>,
    /// Capped by the tail limit, or produced by the no-anchor fallback.
    pub truncated: bool,
    /// Derived from a visible-only snapshot pair.
    pub degraded: bool,
}

impl Delta {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// One participant's response to one dispatched input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker_id: String,
    pub input: String,
    pub raw_delta: Delta,
    pub cleaned_text: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub timed_out: bool,
    pub used_fallback: bool,
}

impl Turn {
    pub fn duration(&self) -> Duration {
        (self.completed_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Convert a timed-out turn into `ResponseTimeout`.
    pub fn into_result(self, timeout: Duration) -> Result<Turn, AgentError> {
        if self.timed_out {
            return Err(AgentError::ResponseTimeout {
                participant: self.speaker_id,
                timeout,
            });
        }
        Ok(self)
    }
}

/// Why a conversation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    MaxTurns,
    TerminalPhrase { speaker: String, phrase: String },
    ScheduleExhausted,
    TimedOutAbort { speaker: String },
    SessionLost { speaker: String },
}

/// Append-only record of one conversation's turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub conversation_id: String,
    turns: Vec<Turn>,
    pub stop_reason: Option<StopReason>,
}

impl Transcript {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            turns: Vec::new(),
            stop_reason: None,
        }
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Speaker ids in turn order.
    pub fn speakers(&self) -> Vec<&str> {
        self.turns.iter().map(|t| t.speaker_id.as_str()).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Per-participant session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    AwaitingReadiness,
    Ready,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingReadiness => "awaiting_readiness",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
