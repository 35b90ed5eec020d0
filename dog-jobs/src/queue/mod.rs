pub mod buffer;

pub use buffer::{Admission, JobBuffer};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::{
    config::{OverflowPolicy, QueueOptions},
    execution::CancellationSignal,
    observability::{JobMetrics, LiveMetrics},
    JobContext, JobDescriptor, JobError, JobId, JobsError, JobsResult,
};

/// Thread-safe FIFO job queue.
///
/// `S` is the per-execution scope value handed to every job (see
/// [`crate::execution::ScopeFactory`]). Cloning the queue is cheap and every
/// clone feeds the same buffer.
pub struct JobQueue<S = ()> {
    buffer: Arc<JobBuffer<JobDescriptor<S>>>,
    metrics: Arc<dyn JobMetrics>,
}

impl<S: Send + 'static> JobQueue<S> {
    /// Create a queue reporting to a fresh [`LiveMetrics`] sink
    pub fn new(options: QueueOptions) -> JobsResult<Self> {
        Self::with_metrics(options, Arc::new(LiveMetrics::new()))
    }

    /// Create a queue reporting to the given sink
    pub fn with_metrics(options: QueueOptions, metrics: Arc<dyn JobMetrics>) -> JobsResult<Self> {
        Ok(Self {
            buffer: Arc::new(JobBuffer::new(&options)?),
            metrics,
        })
    }

    /// Enqueue a job using the processor's global timeout.
    ///
    /// Fails with [`JobsError::CapacityExceeded`] only under
    /// [`OverflowPolicy::ThrowException`]; suspends only under [`OverflowPolicy::Wait`].
    pub async fn enqueue<F, Fut>(&self, job: F) -> JobsResult<JobId>
    where
        F: FnOnce(S, JobContext, CancellationSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        self.push(JobDescriptor::new(job, None)).await
    }

    /// Enqueue a job with its own timeout, overriding the global one
    pub async fn enqueue_with_timeout<F, Fut>(&self, job: F, timeout: Duration) -> JobsResult<JobId>
    where
        F: FnOnce(S, JobContext, CancellationSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        if timeout.is_zero() {
            return Err(JobsError::invalid_argument("job timeout must be greater than zero"));
        }
        self.push(JobDescriptor::new(job, Some(timeout))).await
    }

    #[instrument(skip_all, fields(job_id = %descriptor.id))]
    async fn push(&self, descriptor: JobDescriptor<S>) -> JobsResult<JobId> {
        let job_id = descriptor.id;
        let policy = self.buffer.policy().unwrap_or(OverflowPolicy::Wait);

        match self.buffer.push(descriptor).await? {
            Admission::Stored => {
                debug!("Enqueued job");
            }
            Admission::Evicted(evicted) => {
                warn!(evicted_job_id = %evicted.id, %policy, "Queue full, evicted buffered job");
                self.metrics.record_dropped(&evicted.id, policy);
            }
            Admission::Dropped(dropped) => {
                warn!(%policy, "Queue full, dropped incoming job");
                self.metrics.record_dropped(&dropped.id, policy);
                return Ok(job_id);
            }
        }

        self.metrics.record_enqueued(&job_id);
        Ok(job_id)
    }
}

impl<S> JobQueue<S> {
    /// Wait for a job and remove the oldest one
    pub async fn dequeue(&self) -> JobDescriptor<S> {
        self.buffer.pop().await
    }

    /// Wait for at least one job, then take up to `max_count` jobs that are
    /// already buffered without waiting any further.
    pub async fn dequeue_batch(&self, max_count: usize) -> JobsResult<Vec<JobDescriptor<S>>> {
        let batch = self.buffer.pop_batch(max_count).await?;
        debug!(count = batch.len(), max_count, "Dequeued job batch");
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.buffer.capacity()
    }

    pub fn policy(&self) -> Option<OverflowPolicy> {
        self.buffer.policy()
    }

    /// Sink this queue reports to; processors built from the queue share it
    pub fn metrics(&self) -> Arc<dyn JobMetrics> {
        self.metrics.clone()
    }
}

impl<S> Clone for JobQueue<S> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::ObservabilityLayer;
    use crate::JobEvent;

    async fn noop(_: (), _: JobContext, _: CancellationSignal) -> Result<(), JobError> {
        Ok(())
    }

    #[tokio::test]
    async fn test_enqueue_assigns_unique_ids_in_order() {
        let queue = JobQueue::new(QueueOptions::unbounded()).unwrap();
        let a = queue.enqueue(noop).await.unwrap();
        let b = queue.enqueue(noop).await.unwrap();
        assert_ne!(a, b);

        assert_eq!(queue.dequeue().await.id(), a);
        assert_eq!(queue.dequeue().await.id(), b);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_override_is_recorded() {
        let queue = JobQueue::new(QueueOptions::unbounded()).unwrap();
        queue
            .enqueue_with_timeout(noop, Duration::from_millis(5))
            .await
            .unwrap();
        let descriptor = queue.dequeue().await;
        assert_eq!(descriptor.timeout_override(), Some(Duration::from_millis(5)));

        assert!(matches!(
            queue.enqueue_with_timeout(noop, Duration::ZERO).await,
            Err(JobsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_capacity_exceeded_under_throw_policy() {
        let queue = JobQueue::new(QueueOptions::bounded(1, OverflowPolicy::ThrowException)).unwrap();
        queue.enqueue(noop).await.unwrap();
        assert_eq!(
            queue.enqueue(noop).await.unwrap_err(),
            JobsError::CapacityExceeded { capacity: 1 }
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.capacity(), Some(1));
    }

    #[tokio::test]
    async fn test_dropped_jobs_are_reported() {
        let layer = Arc::new(ObservabilityLayer::new());
        let mut events = layer.subscribe();
        let queue: JobQueue =
            JobQueue::with_metrics(QueueOptions::bounded(1, OverflowPolicy::Ignore), layer.clone())
                .unwrap();

        let kept = queue.enqueue(noop).await.unwrap();
        let ignored = queue.enqueue(noop).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), JobEvent::Enqueued { job_id, .. } if job_id == kept));
        assert!(matches!(
            events.recv().await.unwrap(),
            JobEvent::Dropped { job_id, policy: OverflowPolicy::Ignore, .. } if job_id == ignored
        ));
        assert_eq!(layer.metrics().jobs_dropped(), 1);
        assert_eq!(queue.dequeue().await.id(), kept);
    }

    #[tokio::test]
    async fn test_batch_size_must_be_positive() {
        let queue: JobQueue = JobQueue::new(QueueOptions::unbounded()).unwrap();
        assert!(matches!(
            queue.dequeue_batch(0).await,
            Err(JobsError::InvalidArgument(_))
        ));
    }
}
