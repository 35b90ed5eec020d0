use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::{
    config::ProcessorOptions,
    execution::{JobFailureHandler, JobRunner, JobTimeoutHandler, ScopeFactory, SlotTracker},
    observability::JobMetrics,
    JobContext, JobQueue, JobsError, JobsResult, Outcome,
};

/// Pause after an unexpected loop error before the next iteration
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Lifecycle of a [`JobProcessor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

impl ProcessorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorState::Initializing => "initializing",
            ProcessorState::Running => "running",
            ProcessorState::Draining => "draining",
            ProcessorState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Drain,
}

/// Long-running loop pulling jobs off a [`JobQueue`] and running up to
/// `concurrency_level` of them at once.
///
/// Each iteration takes every free slot, dequeues a batch of at most that
/// many jobs, hands the unused slots back and dispatches the batch onto the
/// runtime. Cancelling the shutdown token stops further dequeues; jobs
/// already dispatched observe the same token and are awaited before the
/// processor reports [`ProcessorState::Stopped`].
pub struct JobProcessor<S = ()> {
    queue: JobQueue<S>,
    runner: JobRunner<S>,
    slots: SlotTracker,
    metrics: Arc<dyn JobMetrics>,
    concurrency_level: usize,
    shutdown: CancellationToken,
    state: Arc<RwLock<ProcessorState>>,
}

impl JobProcessor<()> {
    /// Processor for jobs that take no per-execution scope
    pub fn new(queue: JobQueue<()>, options: ProcessorOptions) -> JobsResult<Self> {
        Self::with_scope_factory(queue, options, Arc::new(|_: &JobContext| ()))
    }
}

impl<S: Send + 'static> JobProcessor<S> {
    /// Processor building a fresh scope per job with `scope_factory`.
    ///
    /// Metrics go to the sink the queue was built with.
    pub fn with_scope_factory(
        queue: JobQueue<S>,
        options: ProcessorOptions,
        scope_factory: Arc<dyn ScopeFactory<S>>,
    ) -> JobsResult<Self> {
        let slots = SlotTracker::new();
        let metrics = queue.metrics();
        let concurrency_level = options.concurrency_level;
        let runner = JobRunner::new(options, slots.clone(), metrics.clone(), scope_factory)?;

        Ok(Self {
            queue,
            runner,
            slots,
            metrics,
            concurrency_level,
            shutdown: CancellationToken::new(),
            state: Arc::new(RwLock::new(ProcessorState::Initializing)),
        })
    }

    pub fn with_failure_handler(mut self, handler: Arc<dyn JobFailureHandler>) -> Self {
        self.runner = self.runner.with_failure_handler(handler);
        self
    }

    pub fn with_timeout_handler(mut self, handler: Arc<dyn JobTimeoutHandler>) -> Self {
        self.runner = self.runner.with_timeout_handler(handler);
        self
    }

    /// Drive shutdown from an existing token, e.g. an application-wide one
    pub fn with_shutdown_token(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Token that stops the processor when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.read()
    }

    /// Slot pool shared with the runner; fully free once the processor stopped
    pub fn slots(&self) -> &SlotTracker {
        &self.slots
    }

    /// Spawn the processor onto the current runtime
    pub fn start(self) -> ProcessorHandle {
        let shutdown = self.shutdown.clone();
        let state = self.state.clone();
        let join_handle = tokio::spawn(self.run());

        ProcessorHandle {
            shutdown,
            state,
            join_handle,
        }
    }

    /// Run until the shutdown token is cancelled, then wait for in-flight jobs.
    ///
    /// Returns `Ok(())` on a graceful stop; only a failure to initialize the
    /// slot pool is returned as an error.
    #[instrument(name = "dog_jobs.processor", skip_all, fields(concurrency_level = self.concurrency_level))]
    pub async fn run(self) -> JobsResult<()> {
        if let Err(e) = self.slots.initialize(self.concurrency_level) {
            self.set_state(ProcessorState::Stopped);
            return Err(e);
        }
        self.set_state(ProcessorState::Running);
        info!("Job processor started");

        let mut in_flight = JoinSet::new();
        while !self.shutdown.is_cancelled() {
            match self.run_once(&mut in_flight).await {
                Ok(Step::Continue) => {}
                Ok(Step::Drain) | Err(JobsError::Shutdown) => break,
                Err(e) => {
                    error!(error = %e, "Error in job processor loop");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {}
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        self.set_state(ProcessorState::Draining);
        info!(in_flight = in_flight.len(), "Job processor draining");
        while let Some(result) = in_flight.join_next().await {
            self.settle(result);
        }

        self.set_state(ProcessorState::Stopped);
        info!("Job processor stopped");
        Ok(())
    }

    async fn run_once(&self, in_flight: &mut JoinSet<Outcome>) -> JobsResult<Step> {
        let acquired = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(Step::Drain),
            acquired = self.slots.acquire_available() => acquired?,
        };

        let batch = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                self.slots.release(acquired);
                return Ok(Step::Drain);
            }
            batch = self.queue.dequeue_batch(acquired) => batch,
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                self.slots.release(acquired);
                return Err(e);
            }
        };

        // Slots the batch could not fill go straight back
        self.slots.release(acquired - batch.len());
        debug!(acquired, dispatched = batch.len(), "Dispatching job batch");

        for descriptor in batch {
            self.metrics
                .record_dispatched(&descriptor.id(), descriptor.waiting_time());
            let runner = self.runner.clone();
            let shutdown = self.shutdown.clone();
            in_flight.spawn(async move { runner.run(descriptor, shutdown).await });
        }

        let mut step = Step::Continue;
        // All slots busy: park on a finished job instead of the slot acquire so its outcome is settled
        if self.slots.available() == 0 && !in_flight.is_empty() {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(Step::Drain),
                Some(result) = in_flight.join_next() => {
                    if self.settle(result) == Step::Drain {
                        step = Step::Drain;
                    }
                }
            }
        }
        while let Some(result) = in_flight.try_join_next() {
            if self.settle(result) == Step::Drain {
                step = Step::Drain;
            }
        }
        Ok(step)
    }

    fn settle(&self, result: Result<Outcome, JoinError>) -> Step {
        match result {
            Ok(outcome) if outcome.is_shutdown() => Step::Drain,
            Ok(_) => Step::Continue,
            Err(e) => {
                error!(error = %e, "Job task crashed");
                Step::Continue
            }
        }
    }

    fn set_state(&self, state: ProcessorState) {
        *self.state.write() = state;
        debug!(%state, "Job processor state changed");
    }
}

/// Handle to a processor spawned with [`JobProcessor::start`]
pub struct ProcessorHandle {
    shutdown: CancellationToken,
    state: Arc<RwLock<ProcessorState>>,
    join_handle: JoinHandle<JobsResult<()>>,
}

impl ProcessorHandle {
    pub fn state(&self) -> ProcessorState {
        *self.state.read()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Signal shutdown and wait until every dispatched job finished
    pub async fn shutdown(self) -> JobsResult<()> {
        self.shutdown.cancel();
        self.join().await
    }

    /// Wait for the processor to stop without signalling it
    pub async fn join(self) -> JobsResult<()> {
        self.join_handle
            .await
            .map_err(|e| JobsError::Internal(format!("Processor join error: {}", e)))?
    }
}
