use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Instrument};

use super::{
    CancellationReason, CancellationSignal, JobFailureHandler, JobTimeoutHandler, ScopeFactory,
    SlotGuard, SlotTracker,
};
use crate::{
    config::ProcessorOptions,
    error::panic_message,
    observability::{tracing::{job_span, log_at}, JobMetrics},
    JobContext, JobDescriptor, JobError, JobFn, JobId, JobsResult, Outcome,
};

/// Executes one job: timeout, cancellation, classification, handlers and metrics
pub struct JobRunner<S> {
    options: Arc<ProcessorOptions>,
    slots: SlotTracker,
    metrics: Arc<dyn JobMetrics>,
    scope_factory: Arc<dyn ScopeFactory<S>>,
    failure_handler: Option<Arc<dyn JobFailureHandler>>,
    timeout_handler: Option<Arc<dyn JobTimeoutHandler>>,
}

impl<S: Send + 'static> JobRunner<S> {
    pub fn new(
        options: ProcessorOptions,
        slots: SlotTracker,
        metrics: Arc<dyn JobMetrics>,
        scope_factory: Arc<dyn ScopeFactory<S>>,
    ) -> JobsResult<Self> {
        options.validate()?;
        Ok(Self {
            options: Arc::new(options),
            slots,
            metrics,
            scope_factory,
            failure_handler: None,
            timeout_handler: None,
        })
    }

    pub fn with_failure_handler(mut self, handler: Arc<dyn JobFailureHandler>) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    pub fn with_timeout_handler(mut self, handler: Arc<dyn JobTimeoutHandler>) -> Self {
        self.timeout_handler = Some(handler);
        self
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Per-job override, else the global timeout, else none
    pub fn effective_timeout(&self, override_timeout: Option<Duration>) -> Option<Duration> {
        override_timeout.or(self.options.global_timeout)
    }

    /// Run one job whose slot was already acquired from this runner's tracker.
    ///
    /// The slot is returned on every path. [`Outcome::ShutdownCancelled`] is the
    /// only outcome callers must act on; every other one is settled here.
    pub async fn run(&self, descriptor: JobDescriptor<S>, shutdown: CancellationToken) -> Outcome {
        let slot = SlotGuard::adopt(self.slots.clone());
        let JobDescriptor {
            id,
            queued_at,
            timeout_override,
            enqueued_from,
            job,
        } = descriptor;

        let span = job_span(&id, enqueued_from);
        let timeout = self.effective_timeout(timeout_override);
        let context = JobContext::new(id, queued_at, Utc::now());
        let started = Instant::now();

        let outcome = self
            .execute(job, context, timeout, &shutdown)
            .instrument(span.clone())
            .await;

        let elapsed = started.elapsed();
        drop(slot);
        span.record("outcome", outcome.kind().as_str());
        debug!(
            parent: &span,
            elapsed_ms = elapsed.as_millis() as u64,
            outcome = %outcome.kind(),
            "Job finished"
        );
        self.metrics.record_completed(&id, &outcome, elapsed);
        outcome
    }

    async fn execute(
        &self,
        job: JobFn<S>,
        context: JobContext,
        timeout: Option<Duration>,
        shutdown: &CancellationToken,
    ) -> Outcome {
        let signal = CancellationSignal::new(shutdown);
        debug!(timeout_ms = timeout.map(|t| t.as_millis() as u64), "Starting job");

        // A panicking scope factory fails the job like a panicking callback
        let work = {
            let scope_factory = self.scope_factory.clone();
            let context = context.clone();
            let signal = signal.clone();
            AssertUnwindSafe(async move {
                let scope = scope_factory.create_scope(&context);
                job(scope, context, signal).await
            })
            .catch_unwind()
        };
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        let result = tokio::select! {
            biased;
            result = work => Some(result.unwrap_or_else(|panic| Err(JobError::from_panic(panic)))),
            _ = shutdown.cancelled() => None,
            _ = deadline => {
                signal.fire_timeout();
                None
            }
        };

        let outcome = classify(result, signal.reason());
        match &outcome {
            Outcome::Succeeded => {}
            Outcome::Failed(error) => self.handle_failure(&context, error, shutdown).await,
            Outcome::TimedOut => self.handle_timeout(&context, shutdown).await,
            Outcome::ShutdownCancelled => {
                debug!("Job was cancelled due to graceful shutdown");
            }
        }
        outcome
    }

    async fn handle_failure(&self, context: &JobContext, error: &JobError, shutdown: &CancellationToken) {
        error!(error = %error, "An error occurred while processing job {}", context.job_id);

        if let Some(handler) = &self.failure_handler {
            let result = AssertUnwindSafe(handler.handle(context, error, shutdown))
                .catch_unwind()
                .await;
            report_handler_result("failure", &context.job_id, result);
        }
    }

    async fn handle_timeout(&self, context: &JobContext, shutdown: &CancellationToken) {
        if let Some(level) = self.options.timeout_log_level {
            log_at(level, &context.job_id, "Job was cancelled due to timeout");
        }

        if let Some(handler) = &self.timeout_handler {
            let result = AssertUnwindSafe(handler.handle(context, shutdown))
                .catch_unwind()
                .await;
            report_handler_result("timeout", &context.job_id, result);
        }
    }
}

impl<S> Clone for JobRunner<S> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            slots: self.slots.clone(),
            metrics: self.metrics.clone(),
            scope_factory: self.scope_factory.clone(),
            failure_handler: self.failure_handler.clone(),
            timeout_handler: self.timeout_handler.clone(),
        }
    }
}

/// `result` is `None` when the runner pre-empted the job
fn classify(result: Option<Result<(), JobError>>, reason: CancellationReason) -> Outcome {
    use CancellationReason as Reason;

    match (result, reason) {
        (Some(Ok(())), _) => Outcome::Succeeded,
        (Some(Err(JobError::Cancelled)) | None, Reason::ShutdownRequested) => Outcome::ShutdownCancelled,
        (Some(Err(JobError::Cancelled)) | None, Reason::TimedOut) => Outcome::TimedOut,
        (Some(Err(error)), _) => Outcome::Failed(error),
        (None, Reason::None) => Outcome::Failed(JobError::Cancelled),
    }
}

fn report_handler_result(
    kind: &str,
    job_id: &JobId,
    result: Result<anyhow::Result<()>, Box<dyn Any + Send>>,
) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(job_id = %job_id, handler = kind, error = %format!("{e:#}"), "Job {kind} handler failed");
        }
        Err(panic) => {
            error!(
                job_id = %job_id,
                handler = kind,
                panic = %panic_message(panic.as_ref()),
                "Job {kind} handler panicked"
            );
        }
    }
}
