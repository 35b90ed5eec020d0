use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{span, Span};

use super::{JobContext, JobId};
use crate::execution::CancellationSignal;
use crate::JobError;

/// Future returned by a job callback
pub type JobFuture = BoxFuture<'static, Result<(), JobError>>;

/// Type-erased job callback: `(scope, context, cancellation) -> outcome`
pub type JobFn<S> = Box<dyn FnOnce(S, JobContext, CancellationSignal) -> JobFuture + Send>;

/// Immutable record describing one unit of queued work
pub struct JobDescriptor<S> {
    pub(crate) id: JobId,
    pub(crate) queued_at: DateTime<Utc>,
    pub(crate) timeout_override: Option<Duration>,
    pub(crate) enqueued_from: Option<span::Id>,
    pub(crate) job: JobFn<S>,
}

impl<S> JobDescriptor<S> {
    /// Wrap a callback, stamping it with a fresh id and the caller's current span id.
    ///
    /// Only the id is kept, so the caller's span can close before the job runs.
    pub(crate) fn new<F, Fut>(job: F, timeout_override: Option<Duration>) -> Self
    where
        F: FnOnce(S, JobContext, CancellationSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        Self {
            id: JobId::new(),
            queued_at: Utc::now(),
            timeout_override,
            enqueued_from: Span::current().id(),
            job: Box::new(move |scope, ctx, signal| job(scope, ctx, signal).boxed()),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn queued_at(&self) -> DateTime<Utc> {
        self.queued_at
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout_override
    }

    /// Span that was current when the job was enqueued
    pub fn enqueued_from(&self) -> Option<&span::Id> {
        self.enqueued_from.as_ref()
    }

    /// How long the job has been buffered so far
    pub fn waiting_time(&self) -> Duration {
        (Utc::now() - self.queued_at).to_std().unwrap_or_default()
    }
}

impl<S> fmt::Debug for JobDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("id", &self.id)
            .field("queued_at", &self.queued_at)
            .field("timeout_override", &self.timeout_override)
            .field("enqueued_from", &self.enqueued_from)
            .finish_non_exhaustive()
    }
}
