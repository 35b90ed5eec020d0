use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::JobError;

/// Why a job's cancellation signal fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    None,
    ShutdownRequested,
    TimedOut,
}

/// Cancellation handed to a running job.
///
/// Fires when either the processor shuts down or the job's own timeout
/// elapses; [`CancellationSignal::reason`] tells the two apart. Shutdown wins
/// when both have fired.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    combined: CancellationToken,
    shutdown: CancellationToken,
    timeout: CancellationToken,
}

impl CancellationSignal {
    /// Signal linked to `shutdown`, with its own independent timeout source
    pub fn new(shutdown: &CancellationToken) -> Self {
        Self {
            combined: shutdown.child_token(),
            shutdown: shutdown.clone(),
            timeout: CancellationToken::new(),
        }
    }

    /// Signal that only fires when cancelled by hand; handy in tests
    pub fn detached() -> Self {
        Self::new(&CancellationToken::new())
    }

    pub fn is_cancelled(&self) -> bool {
        self.combined.is_cancelled()
    }

    /// Completes once either source fired
    pub async fn cancelled(&self) {
        self.combined.cancelled().await
    }

    pub fn reason(&self) -> CancellationReason {
        if self.shutdown.is_cancelled() {
            CancellationReason::ShutdownRequested
        } else if self.timeout.is_cancelled() {
            CancellationReason::TimedOut
        } else {
            CancellationReason::None
        }
    }

    /// `Err(JobError::Cancelled)` once the signal fired, for use with `?`
    pub fn check(&self) -> Result<(), JobError> {
        if self.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Combined token, for APIs that take a [`CancellationToken`] directly
    pub fn token(&self) -> &CancellationToken {
        &self.combined
    }

    pub(crate) fn fire_timeout(&self) {
        // Mark the reason before waking anyone
        self.timeout.cancel();
        self.combined.cancel();
    }
}
