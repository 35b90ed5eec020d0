//! # dog-jobs: In-Process Background Jobs
//!
//! **Fire-and-forget job queue with bounded concurrency and per-job timeouts**
//!
//! Callers enqueue async closures onto a [`JobQueue`]; a [`JobProcessor`]
//! pulls them off in FIFO order and runs up to `concurrency_level` of them at
//! once on the tokio runtime.
//!
//! ## Features
//!
//! - **Overflow Policies**: bounded queues wait, ignore, reject or evict when full
//! - **Slot-Driven Batching**: each loop iteration dequeues as many jobs as there are free slots
//! - **Timeouts vs Shutdown**: a per-job timeout is handled locally, shutdown drains the processor
//! - **Failure and Timeout Handlers**: zero-or-one of each, errors logged and never retried
//! - **Per-Job Scope**: a caller-supplied factory builds a fresh value for every execution
//! - **Structured Observability**: `tracing` spans per job, live metrics and an event stream
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use dog_jobs::prelude::*;
//!
//! # async fn example() -> JobsResult<()> {
//! let queue: JobQueue = JobQueue::new(QueueOptions::bounded(100, OverflowPolicy::Wait))?;
//!
//! let processor = JobProcessor::new(
//!     queue.clone(),
//!     ProcessorOptions::default()
//!         .with_concurrency_level(4)
//!         .with_global_timeout(Duration::from_secs(30)),
//! )?
//! .start();
//!
//! queue
//!     .enqueue(|_, ctx: JobContext, signal: CancellationSignal| async move {
//!         signal.check()?;
//!         tracing::info!(job_id = %ctx.job_id, "sending welcome email");
//!         Ok(())
//!     })
//!     .await?;
//!
//! processor.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod types;
pub mod queue;
pub mod execution;
pub mod processor;
pub mod observability;

// Core API exports
pub use config::{OverflowPolicy, ProcessorOptions, QueueOptions};
pub use error::{JobError, JobsError, JobsResult};
pub use types::{
    JobContext, JobDescriptor, JobEvent, JobFn, JobFuture, JobId, Outcome, OutcomeKind,
};
pub use queue::JobQueue;
pub use processor::{JobProcessor, ProcessorHandle, ProcessorState};
pub use execution::{
    CancellationReason, CancellationSignal, JobFailureHandler, JobRunner, JobTimeoutHandler,
    ScopeFactory, SlotTracker,
};

// Observability exports
pub use observability::{JobMetrics, LiveMetrics, ObservabilityLayer};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

/// Everything needed to enqueue and process jobs
pub mod prelude {
    pub use crate::{JobProcessor, JobQueue, ProcessorHandle, ProcessorState};

    pub use crate::{
        CancellationSignal, JobContext, JobError, JobId, JobsError, JobsResult, Outcome,
    };

    pub use crate::{OverflowPolicy, ProcessorOptions, QueueOptions};

    pub use crate::{JobFailureHandler, JobTimeoutHandler, ScopeFactory};

    pub use crate::{JobMetrics, LiveMetrics, ObservabilityLayer};

    pub use async_trait::async_trait;
}
