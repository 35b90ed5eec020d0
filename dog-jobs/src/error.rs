use std::any::Any;

use thiserror::Error;

/// Result type for queue and processor operations
pub type JobsResult<T> = Result<T, JobsError>;

/// Infrastructure errors raised by the queue, the slot tracker and the processor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Queue capacity of {capacity} exceeded")]
    CapacityExceeded { capacity: usize },

    #[error("Slot tracker is already initialized")]
    AlreadyInitialized,

    #[error("Processor shutdown")]
    Shutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobsError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Error returned by a job callback
#[derive(Error, Debug)]
pub enum JobError {
    /// The job observed its cancellation signal and gave up
    #[error("Job was cancelled")]
    Cancelled,

    /// The job panicked; the runner caught it
    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    /// Create a failure from a plain message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Other(anyhow::anyhow!(msg.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(payload.as_ref()))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
