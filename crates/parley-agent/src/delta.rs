//! Incremental output between two snapshots of the same pane.
//!
//! The baseline is anchored by its longest trailing run of lines found
//! contiguously in the later capture, not by absolute index: repaint and
//! scroll shift positions, and bounded scrollback drops the oldest lines.
//! When no anchor exists the result degrades to the last `tail_limit` lines
//! with `truncated` set; alignment loss is never an error.

use parley_core::CaptureConfig;

use crate::error::AgentError;
use crate::types::{CaptureMode, Delta, Snapshot};

/// Where the baseline was found in the later capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// The baseline's trailing `run` lines end just before `after[end]`.
    Anchored { end: usize, run: usize },
    /// The baseline fell out of retained history (or was rewritten).
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaComputer {
    tail_limit: usize,
    min_anchor_lines: usize,
}

impl Default for DeltaComputer {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

impl DeltaComputer {
    pub fn new(tail_limit: usize) -> Self {
        Self {
            tail_limit: tail_limit.max(1),
            min_anchor_lines: CaptureConfig::default().min_anchor_lines,
        }
    }

    pub fn from_config(capture: &CaptureConfig) -> Self {
        Self {
            tail_limit: capture.tail_limit.max(1),
            min_anchor_lines: capture.min_anchor_lines.max(1),
        }
    }

    pub fn with_min_anchor_lines(mut self, lines: usize) -> Self {
        self.min_anchor_lines = lines.max(1);
        self
    }

    pub fn tail_limit(&self) -> usize {
        self.tail_limit
    }

    /// Lines appended to `after` since `before`.
    ///
    /// Both snapshots must share a capture mode; comparing a viewport with
    /// full history would anchor against the wrong region.
    pub fn compute(&self, before: &Snapshot, after: &Snapshot) -> Result<Delta, AgentError> {
        self.compute_with_alignment(before, after)
            .map(|(delta, _)| delta)
    }

    pub fn compute_with_alignment(
        &self,
        before: &Snapshot,
        after: &Snapshot,
    ) -> Result<(Delta, Alignment), AgentError> {
        if before.mode() != after.mode() {
            return Err(AgentError::ModeMismatch {
                before: before.mode(),
                after: after.mode(),
            });
        }
        let (mut delta, alignment) =
            self.compute_lines(before.content_lines(), after.content_lines());
        delta.degraded = before.mode() == CaptureMode::VisibleOnly;
        Ok((delta, alignment))
    }

    /// Line-level delta without mode bookkeeping.
    pub fn compute_lines(&self, before: &[String], after: &[String]) -> (Delta, Alignment) {
        let alignment = self.align(before, after);
        let (lines, mut truncated) = match alignment {
            Alignment::Anchored { end, .. } => (&after[end..], false),
            Alignment::Lost => (after, true),
        };
        let start = lines.len().saturating_sub(self.tail_limit);
        if start > 0 {
            truncated = true;
        }
        let delta = Delta {
            lines: lines[start..].to_vec(),
            truncated,
            degraded: false,
        };
        (delta, alignment)
    }

    /// Find the baseline's position in `after`.
    ///
    /// A baseline whose last line has since been repainted (a spinner or
    /// status line left by an unfinished turn) is retried without it.
    pub fn align(&self, before: &[String], after: &[String]) -> Alignment {
        match self.anchor(before, after) {
            Alignment::Lost if before.len() > 1 => {
                self.anchor(&before[..before.len() - 1], after)
            }
            alignment => alignment,
        }
    }

    /// Picks the end position with the longest trailing run; ties go to the
    /// earliest position so a repeated prompt line further down is not
    /// mistaken for the baseline.
    fn anchor(&self, before: &[String], after: &[String]) -> Alignment {
        if before.is_empty() {
            return Alignment::Anchored { end: 0, run: 0 };
        }

        // Pure append: the common case, and one the scan below would also
        // find, just more slowly.
        if after.len() >= before.len()
            && trailing_run(before, &after[..before.len()]) == before.len()
        {
            return Alignment::Anchored {
                end: before.len(),
                run: before.len(),
            };
        }

        let mut best: Option<(usize, usize)> = None;
        for end in 1..=after.len() {
            let run = trailing_run(before, &after[..end]);
            if run > best.map_or(0, |(_, r)| r) {
                best = Some((end, run));
                if run == before.len() {
                    break;
                }
            }
        }

        let required = self.min_anchor_lines.min(before.len());
        match best {
            Some((end, run)) if run >= required => Alignment::Anchored { end, run },
            _ => Alignment::Lost,
        }
    }
}

/// Length of the common trailing run of `before` and `after`.
///
/// The baseline's last line is the cursor line input gets typed on, so it
/// matches any later line it is a prefix of.
fn trailing_run(before: &[String], after: &[String]) -> usize {
    let mut run = 0;
    for (b, a) in before.iter().rev().zip(after.iter().rev()) {
        let matched = if run == 0 {
            cursor_line_matches(b, a)
        } else {
            a == b
        };
        if !matched {
            break;
        }
        run += 1;
    }
    run
}

fn cursor_line_matches(baseline: &str, current: &str) -> bool {
    if current == baseline {
        return true;
    }
    let stem = baseline.trim_end();
    !stem.trim().is_empty() && current.starts_with(stem)
}
