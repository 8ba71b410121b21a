//! Readiness detection for processes that give no completion signal.
//!
//! The detector polls a [`SnapshotSource`] at a fixed interval and declares
//! the process ready once the capture has stopped changing for
//! `stable_checks_required` consecutive polls and, when ready indicators are
//! configured, a ready indicator is on screen with no loading indicator.
//! `stable_checks_required` trades latency against false stability during
//! bursty output; it is a tuning knob, not a guarantee.

use std::time::Duration;

use parley_core::{CaptureConfig, ParticipantConfig};
use tokio::time::Instant;

use crate::error::PaneError;
use crate::snapshot::SnapshotSource;
use crate::types::{CaptureMode, Snapshot};

/// Polling parameters for one wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub ready_indicators: Vec<String>,
    pub loading_indicators: Vec<String>,
    pub check_interval: Duration,
    stable_checks_required: u32,
    pub timeout: Duration,
    pub post_ready_delay: Duration,
    /// Indicators are only searched in this many trailing content lines.
    pub indicator_scan_lines: usize,
}

impl ReadinessPolicy {
    /// Pure output-stability policy with no indicators.
    pub fn new(check_interval: Duration, stable_checks_required: u32, timeout: Duration) -> Self {
        Self {
            ready_indicators: Vec::new(),
            loading_indicators: Vec::new(),
            check_interval,
            stable_checks_required: stable_checks_required.max(1),
            timeout,
            post_ready_delay: Duration::ZERO,
            indicator_scan_lines: CaptureConfig::default().indicator_scan_lines,
        }
    }

    /// Policy for the first-ready wait after launch.
    pub fn for_startup(participant: &ParticipantConfig, capture: &CaptureConfig) -> Self {
        Self::from_participant(participant, capture, participant.startup_timeout)
            .with_ready_indicators(participant.startup_indicators().to_vec())
    }

    /// Policy for waiting on a turn's response.
    pub fn for_response(
        participant: &ParticipantConfig,
        capture: &CaptureConfig,
        timeout: Duration,
    ) -> Self {
        Self::from_participant(participant, capture, timeout)
    }

    fn from_participant(
        participant: &ParticipantConfig,
        capture: &CaptureConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            ready_indicators: participant.ready_indicators.clone(),
            loading_indicators: participant.loading_indicators.clone(),
            check_interval: participant.check_interval,
            stable_checks_required: participant.stable_checks_required.max(1),
            timeout,
            post_ready_delay: participant.post_ready_delay,
            indicator_scan_lines: capture.indicator_scan_lines.max(1),
        }
    }

    pub fn with_ready_indicators(mut self, indicators: Vec<String>) -> Self {
        self.ready_indicators = indicators;
        self
    }

    pub fn with_loading_indicators(mut self, indicators: Vec<String>) -> Self {
        self.loading_indicators = indicators;
        self
    }

    pub fn with_post_ready_delay(mut self, delay: Duration) -> Self {
        self.post_ready_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stable_checks_required(&self) -> u32 {
        self.stable_checks_required
    }

    /// Indicator condition for a capture. Always true with no ready indicators.
    pub fn indicators_allow_ready(&self, snapshot: &Snapshot) -> bool {
        if self.ready_indicators.is_empty() {
            return true;
        }
        let content = snapshot.content_lines();
        let tail = &content[content.len().saturating_sub(self.indicator_scan_lines)..];
        let any_present = |indicators: &[String]| {
            indicators
                .iter()
                .any(|ind| tail.iter().any(|line| line_has_indicator(line, ind)))
        };
        any_present(&self.ready_indicators) && !any_present(&self.loading_indicators)
    }
}

/// Result of a readiness wait. A timeout is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready {
        snapshot: Snapshot,
        polls: u32,
        elapsed: Duration,
    },
    TimedOut {
        /// Last successful capture, so partial output stays retrievable.
        last: Option<Snapshot>,
        polls: u32,
        elapsed: Duration,
    },
}

impl ReadinessOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::Ready { snapshot, .. } => Some(snapshot),
            Self::TimedOut { last, .. } => last.as_ref(),
        }
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            Self::Ready { snapshot, .. } => Some(snapshot),
            Self::TimedOut { last, .. } => last,
        }
    }

    pub fn polls(&self) -> u32 {
        match self {
            Self::Ready { polls, .. } | Self::TimedOut { polls, .. } => *polls,
        }
    }
}

/// Polls a snapshot source until output settles or the policy times out.
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    policy: ReadinessPolicy,
}

impl ReadinessDetector {
    pub fn new(policy: ReadinessPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReadinessPolicy {
        &self.policy
    }

    /// Wait for readiness, capturing with `mode` on every poll.
    ///
    /// Returns `Err` only when the pane is gone. Other capture failures count
    /// as a change and polling continues.
    pub async fn wait(
        &self,
        source: &dyn SnapshotSource,
        mode: CaptureMode,
    ) -> Result<ReadinessOutcome, PaneError> {
        let policy = &self.policy;
        let started = Instant::now();
        let deadline = started + policy.timeout;

        let mut previous: Option<Vec<String>> = None;
        let mut stable: u32 = 0;
        let mut polls: u32 = 0;
        let mut last: Option<Snapshot> = None;

        loop {
            polls += 1;
            match source.capture(mode).await {
                Ok(snapshot) => {
                    let content = snapshot.content_lines();
                    if previous.as_deref() == Some(content) {
                        stable += 1;
                    } else {
                        stable = 0;
                        previous = Some(content.to_vec());
                    }

                    if stable >= policy.stable_checks_required
                        && policy.indicators_allow_ready(&snapshot)
                    {
                        if !policy.post_ready_delay.is_zero() {
                            tokio::time::sleep(policy.post_ready_delay).await;
                        }
                        tracing::debug!(polls, stable, mode = %mode, "output settled");
                        return Ok(ReadinessOutcome::Ready {
                            snapshot,
                            polls,
                            elapsed: started.elapsed(),
                        });
                    }
                    last = Some(snapshot);
                }
                Err(err @ PaneError::PaneGone { .. }) => return Err(err),
                Err(err) => {
                    tracing::debug!(error = %err, mode = %mode, "readiness poll failed");
                    stable = 0;
                    previous = None;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(ReadinessOutcome::TimedOut {
                    last,
                    polls,
                    elapsed: started.elapsed(),
                });
            }
            tokio::time::sleep_until((now + policy.check_interval).min(deadline)).await;
        }
    }
}

/// Whether `line` shows `indicator`. A bare indicator also matches its
/// trimmed form, since captures drop trailing spaces (`"> "` shows as `">"`).
pub(crate) fn line_has_indicator(line: &str, indicator: &str) -> bool {
    if indicator.is_empty() {
        return false;
    }
    if line.contains(indicator) {
        return true;
    }
    let trimmed = indicator.trim();
    !trimmed.is_empty() && line.trim() == trimmed
}
