//! Deterministic doubles for the pane transport and snapshot sources.
//!
//! [`SimulatedPane`] emulates a line-oriented REPL running in a tmux pane;
//! [`ScriptedSnapshotSource`] replays a fixed frame sequence. Both record
//! what they were asked to do.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::capability::CaptureCapability;
use crate::error::PaneError;
use crate::snapshot::SnapshotSource;
use crate::tmux::PaneTransport;
use crate::types::{CaptureMode, Snapshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A recorded call to a [`SimulatedPane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneCall {
    SendText(String),
    Submit,
    CaptureFull,
    CaptureVisible,
    Capability,
    Exists,
}

/// How the simulated process answers one submitted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Print these lines, a few per capture, then show a fresh prompt.
    Lines(Vec<String>),
    /// Print `partial`, then spin forever (until the next input).
    Stall { partial: Vec<String> },
    /// The process dies and takes the pane with it.
    Crash,
}

impl ScriptedReply {
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Lines(lines.into_iter().map(Into::into).collect())
    }

    pub fn stall<I, S>(partial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Stall {
            partial: partial.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug)]
enum Activity {
    Idle,
    Revealing(VecDeque<String>),
    Stalled { ticks: u32 },
}

#[derive(Debug)]
struct PaneState {
    history: Vec<String>,
    replies: VecDeque<ScriptedReply>,
    activity: Activity,
    alive: bool,
    full_history_supported: bool,
    advertise_full_history: bool,
    calls: Vec<PaneCall>,
}

/// In-memory [`PaneTransport`] for a single target.
///
/// Typed text extends the prompt line. Submit starts the next scripted
/// reply, revealed `lines_per_capture` lines per capture. Scrollback is
/// capped at `history_limit` lines and captures are padded with blank rows
/// to the pane height, like tmux.
#[derive(Debug)]
pub struct SimulatedPane {
    target: String,
    prompt: String,
    rows: usize,
    history_limit: usize,
    lines_per_capture: usize,
    state: Mutex<PaneState>,
}

impl SimulatedPane {
    pub fn new(target: impl Into<String>) -> Self {
        let prompt = "> ".to_string();
        Self {
            target: target.into(),
            rows: 24,
            history_limit: 2000,
            lines_per_capture: 2,
            state: Mutex::new(PaneState {
                history: vec![
                    "Simulated REPL 1.0".to_string(),
                    "Type a message and press Enter.".to_string(),
                    String::new(),
                    prompt.clone(),
                ],
                replies: VecDeque::new(),
                activity: Activity::Idle,
                alive: true,
                full_history_supported: true,
                advertise_full_history: true,
                calls: Vec::new(),
            }),
            prompt,
        }
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows.max(1);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        let mut state = lock(&self.state);
        trim_history(&mut state.history, self.history_limit);
        drop(state);
        self
    }

    pub fn with_lines_per_capture(mut self, lines: usize) -> Self {
        self.lines_per_capture = lines.max(1);
        self
    }

    pub fn with_replies<I>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        lock(&self.state).replies.extend(replies);
        self
    }

    /// Full-history capture fails with `Unavailable`, and the capability
    /// probe says so.
    pub fn without_full_history(self) -> Self {
        {
            let mut state = lock(&self.state);
            state.full_history_supported = false;
            state.advertise_full_history = false;
        }
        self
    }

    /// Capability claims full history, but the capture itself fails.
    pub fn with_broken_full_history(self) -> Self {
        {
            let mut state = lock(&self.state);
            state.full_history_supported = false;
            state.advertise_full_history = true;
        }
        self
    }

    /// Turn scrollback capture on or off while the pane is running.
    pub fn set_full_history(&self, enabled: bool) {
        let mut state = lock(&self.state);
        state.full_history_supported = enabled;
        state.advertise_full_history = enabled;
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        lock(&self.state).replies.push_back(reply);
    }

    /// Tear the pane down.
    pub fn kill(&self) {
        lock(&self.state).alive = false;
    }

    pub fn is_alive(&self) -> bool {
        lock(&self.state).alive
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn calls(&self) -> Vec<PaneCall> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }

    /// Texts passed to `send_text`, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                PaneCall::SendText(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// The full buffer as it would render now, without advancing output.
    pub fn screen(&self) -> Vec<String> {
        let state = lock(&self.state);
        self.render(&state)
    }

    fn check(&self, state: &PaneState, target: &str) -> Result<(), PaneError> {
        if !state.alive || target != self.target {
            return Err(PaneError::PaneGone {
                target: target.to_string(),
            });
        }
        Ok(())
    }

    fn push_line(&self, state: &mut PaneState, line: String) {
        state.history.push(line);
        trim_history(&mut state.history, self.history_limit);
    }

    /// Move scripted output forward by one capture's worth.
    fn advance(&self, state: &mut PaneState) {
        let (revealed, finished) = match &mut state.activity {
            Activity::Idle => return,
            Activity::Stalled { ticks } => {
                *ticks += 1;
                return;
            }
            Activity::Revealing(remaining) => {
                let take = self.lines_per_capture.min(remaining.len());
                let revealed: Vec<String> = remaining.drain(..take).collect();
                (revealed, remaining.is_empty())
            }
        };
        for line in revealed {
            self.push_line(state, line);
        }
        if finished {
            state.activity = Activity::Idle;
            self.push_line(state, self.prompt.clone());
        }
    }

    /// Finish a stalled reply so new input lands on a fresh prompt.
    fn interrupt_stall(&self, state: &mut PaneState) {
        if matches!(state.activity, Activity::Stalled { .. }) {
            state.activity = Activity::Idle;
            self.push_line(state, self.prompt.clone());
        }
    }

    fn render(&self, state: &PaneState) -> Vec<String> {
        let mut lines: Vec<String> = state
            .history
            .iter()
            .map(|line| line.trim_end().to_string())
            .collect();
        if let Activity::Stalled { ticks } = state.activity {
            lines.push(format!("⠋ Working {ticks}s (esc to interrupt)"));
        }
        lines
    }

    fn pad(&self, mut lines: Vec<String>) -> Vec<String> {
        if lines.len() < self.rows {
            lines.resize(self.rows, String::new());
        }
        lines
    }
}

fn trim_history(history: &mut Vec<String>, limit: usize) {
    if history.len() > limit {
        let excess = history.len() - limit;
        history.drain(..excess);
    }
}

impl PaneTransport for SimulatedPane {
    fn send_text(&self, target: &str, text: &str) -> Result<(), PaneError> {
        let mut state = lock(&self.state);
        state.calls.push(PaneCall::SendText(text.to_string()));
        self.check(&state, target)?;
        self.interrupt_stall(&mut state);

        let mut parts = text.split('\n');
        if state.history.is_empty() {
            state.history.push(String::new());
        }
        if let (Some(first), Some(last)) = (parts.next(), state.history.last_mut()) {
            last.push_str(first);
        }
        for part in parts {
            self.push_line(&mut state, part.to_string());
        }
        Ok(())
    }

    fn send_submit_key(&self, target: &str) -> Result<(), PaneError> {
        let mut state = lock(&self.state);
        state.calls.push(PaneCall::Submit);
        self.check(&state, target)?;
        self.interrupt_stall(&mut state);

        match state.replies.pop_front() {
            Some(ScriptedReply::Crash) => state.alive = false,
            Some(ScriptedReply::Stall { partial }) => {
                for line in partial {
                    self.push_line(&mut state, line);
                }
                state.activity = Activity::Stalled { ticks: 0 };
            }
            Some(ScriptedReply::Lines(lines)) => {
                state.activity = Activity::Revealing(lines.into());
            }
            None => state.activity = Activity::Revealing(VecDeque::new()),
        }
        Ok(())
    }

    fn capture_full_history(&self, target: &str) -> Result<Vec<String>, PaneError> {
        let mut state = lock(&self.state);
        state.calls.push(PaneCall::CaptureFull);
        self.check(&state, target)?;
        if !state.full_history_supported {
            return Err(PaneError::Unavailable {
                target: target.to_string(),
                reason: "scrollback capture disabled".to_string(),
            });
        }
        self.advance(&mut state);
        Ok(self.pad(self.render(&state)))
    }

    fn capture_visible(&self, target: &str) -> Result<Vec<String>, PaneError> {
        let mut state = lock(&self.state);
        state.calls.push(PaneCall::CaptureVisible);
        self.check(&state, target)?;
        self.advance(&mut state);
        let rendered = self.render(&state);
        let start = rendered.len().saturating_sub(self.rows);
        Ok(self.pad(rendered[start..].to_vec()))
    }

    fn session_exists(&self, target: &str) -> bool {
        let mut state = lock(&self.state);
        state.calls.push(PaneCall::Exists);
        state.alive && target == self.target
    }

    fn capability(&self, target: &str) -> Result<CaptureCapability, PaneError> {
        let mut state = lock(&self.state);
        state.calls.push(PaneCall::Capability);
        self.check(&state, target)?;
        Ok(CaptureCapability {
            supports_full_history: state.advertise_full_history,
            history_limit: Some(if state.advertise_full_history {
                self.history_limit
            } else {
                0
            }),
        })
    }
}

/// Snapshot source replaying a fixed sequence of frames.
///
/// The last frame repeats once the sequence is exhausted. With
/// [`ScriptedSnapshotSource::endless_changing`] every capture differs.
#[derive(Debug)]
pub struct ScriptedSnapshotSource {
    frames: Vec<Result<Vec<String>, PaneError>>,
    changing: bool,
    captures: Mutex<usize>,
}

impl ScriptedSnapshotSource {
    pub fn new(frames: Vec<Result<Vec<String>, PaneError>>) -> Self {
        Self {
            frames,
            changing: false,
            captures: Mutex::new(0),
        }
    }

    pub fn from_frames<F, S>(frames: F) -> Self
    where
        F: IntoIterator,
        F::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            frames
                .into_iter()
                .map(|frame| Ok(frame.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }

    /// Frames of `base` followed by a counter line that ticks every capture.
    pub fn endless_changing<I, S>(base: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let base: Vec<String> = base.into_iter().map(Into::into).collect();
        Self {
            frames: vec![Ok(base)],
            changing: true,
            captures: Mutex::new(0),
        }
    }

    /// Number of captures taken so far.
    pub fn captures(&self) -> usize {
        *lock(&self.captures)
    }

    fn next(&self, mode: CaptureMode) -> Result<Snapshot, PaneError> {
        let index = {
            let mut captures = lock(&self.captures);
            *captures += 1;
            *captures - 1
        };
        let frame = match self.frames.get(index).or_else(|| self.frames.last()) {
            Some(frame) => frame.clone()?,
            None => Vec::new(),
        };
        let mut lines = frame;
        if self.changing {
            lines.push(format!("tick {index}"));
        }
        Ok(Snapshot::new(lines, mode))
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSnapshotSource {
    async fn capture_full_history(&self) -> Result<Snapshot, PaneError> {
        self.next(CaptureMode::FullHistory)
    }

    async fn capture_visible(&self) -> Result<Snapshot, PaneError> {
        self.next(CaptureMode::VisibleOnly)
    }
}
