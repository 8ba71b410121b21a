//! Capture capability descriptor for a driven pane.

use crate::types::CaptureMode;

/// What a pane's transport can capture.
///
/// Probed on every dispatch, so a pane that regains scrollback support is
/// upgraded on its next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureCapability {
    pub supports_full_history: bool,
    /// Scrollback size reported by the multiplexer, when known.
    pub history_limit: Option<usize>,
}

impl CaptureCapability {
    pub fn full_history() -> Self {
        Self {
            supports_full_history: true,
            history_limit: None,
        }
    }

    pub fn visible_only() -> Self {
        Self {
            supports_full_history: false,
            history_limit: None,
        }
    }

    /// A pane with no retained scrollback can only be captured visibly.
    pub fn from_history_limit(limit: usize) -> Self {
        Self {
            supports_full_history: limit > 0,
            history_limit: Some(limit),
        }
    }

    pub fn preferred_mode(self) -> CaptureMode {
        if self.supports_full_history {
            CaptureMode::FullHistory
        } else {
            CaptureMode::VisibleOnly
        }
    }

    pub fn detail_line(self) -> String {
        match self.history_limit {
            Some(limit) => format!(
                "full_history={}, history_limit={limit}",
                self.supports_full_history
            ),
            None => format!("full_history={}", self.supports_full_history),
        }
    }
}
