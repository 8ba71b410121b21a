//! Snapshot sources: read-only probes producing [`Snapshot`]s of one pane.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PaneError;
use crate::tmux::PaneTransport;
use crate::types::{CaptureMode, Snapshot};

/// Captures of a single pane.
///
/// Implementations can be backed by:
/// - a [`PaneTransport`] (tmux or simulated)
/// - a fixed frame sequence for readiness tests
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Every retained line. Fails with `Unavailable` when the pane has no
    /// scrollback capture, `PaneGone` when it no longer exists.
    async fn capture_full_history(&self) -> Result<Snapshot, PaneError>;

    /// The viewport only. Lossy for output taller than the viewport.
    async fn capture_visible(&self) -> Result<Snapshot, PaneError>;

    async fn capture(&self, mode: CaptureMode) -> Result<Snapshot, PaneError> {
        match mode {
            CaptureMode::FullHistory => self.capture_full_history().await,
            CaptureMode::VisibleOnly => self.capture_visible().await,
        }
    }
}

/// Snapshot source bound to one pane of a transport.
#[derive(Clone)]
pub struct PaneSnapshotSource {
    transport: Arc<dyn PaneTransport>,
    target: String,
}

impl PaneSnapshotSource {
    pub fn new(transport: Arc<dyn PaneTransport>, target: impl Into<String>) -> Self {
        Self {
            transport,
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl SnapshotSource for PaneSnapshotSource {
    async fn capture_full_history(&self) -> Result<Snapshot, PaneError> {
        let lines = self.transport.capture_full_history(&self.target)?;
        Ok(Snapshot::new(lines, CaptureMode::FullHistory))
    }

    async fn capture_visible(&self) -> Result<Snapshot, PaneError> {
        let lines = self.transport.capture_visible(&self.target)?;
        Ok(Snapshot::new(lines, CaptureMode::VisibleOnly))
    }
}
