use serde::{Deserialize, Serialize};
use std::fmt;

use crate::JobError;

/// Terminal classification of one job execution
#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    Failed(JobError),
    TimedOut,
    /// The processor is shutting down; the only outcome that stops the loop
    ShutdownCancelled,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Succeeded => OutcomeKind::Succeeded,
            Self::Failed(_) => OutcomeKind::Failed,
            Self::TimedOut => OutcomeKind::TimedOut,
            Self::ShutdownCancelled => OutcomeKind::ShutdownCancelled,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShutdownCancelled)
    }

    pub fn error(&self) -> Option<&JobError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Data-free view of [`Outcome`], used for metrics and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    TimedOut,
    ShutdownCancelled,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::ShutdownCancelled => "shutdown_cancelled",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
