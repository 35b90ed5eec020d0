use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;
use crate::config::OverflowPolicy;

/// Lifecycle events broadcast by [`crate::ObservabilityLayer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was accepted by the queue
    Enqueued {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Job was dropped or evicted by the overflow policy
    Dropped {
        job_id: JobId,
        policy: OverflowPolicy,
        at: DateTime<Utc>,
    },

    /// Job was handed to a runner
    Started {
        job_id: JobId,
        waited_ms: u64,
        at: DateTime<Utc>,
    },

    Succeeded {
        job_id: JobId,
        duration_ms: u64,
        at: DateTime<Utc>,
    },

    Failed {
        job_id: JobId,
        error: String,
        duration_ms: u64,
        at: DateTime<Utc>,
    },

    TimedOut {
        job_id: JobId,
        duration_ms: u64,
        at: DateTime<Utc>,
    },

    /// Job was cut short by processor shutdown
    Cancelled {
        job_id: JobId,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Dropped { .. } => "dropped",
            Self::Started { .. } => "started",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed_out",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Dropped { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Succeeded { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::TimedOut { job_id, .. }
            | Self::Cancelled { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Dropped { at, .. }
            | Self::Started { at, .. }
            | Self::Succeeded { at, .. }
            | Self::Failed { at, .. }
            | Self::TimedOut { at, .. }
            | Self::Cancelled { at, .. } => at,
        }
    }

    /// Whether the event closes the job's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Dropped { .. }
                | Self::Succeeded { .. }
                | Self::Failed { .. }
                | Self::TimedOut { .. }
                | Self::Cancelled { .. }
        )
    }
}
