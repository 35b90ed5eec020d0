use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::{JobMetrics, LiveMetrics};
use crate::{config::OverflowPolicy, JobEvent, JobId, Outcome};

/// Metrics sink that also broadcasts every lifecycle change as a [`JobEvent`]
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_event_capacity(Self::DEFAULT_EVENT_CAPACITY)
    }

    /// Slow subscribers lag (and skip events) once `capacity` events are unread
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (event_broadcaster, _) = broadcast::channel(capacity.max(1));
        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Event stream that silently skips events lost to lag
    pub fn events(&self) -> BoxStream<'static, JobEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }

    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }

    pub fn analytics(&self) -> PerformanceAnalytics {
        PerformanceAnalytics::new(self.metrics.clone())
    }

    fn emit(&self, event: JobEvent) {
        debug!(event = event.event_name(), job_id = %event.job_id(), "Job event");
        // No subscribers is not an error
        let _ = self.event_broadcaster.send(event);
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl JobMetrics for ObservabilityLayer {
    fn record_enqueued(&self, job_id: &JobId) {
        self.metrics.record_enqueued(job_id);
        self.emit(JobEvent::Enqueued {
            job_id: *job_id,
            at: Utc::now(),
        });
    }

    fn record_dropped(&self, job_id: &JobId, policy: OverflowPolicy) {
        self.metrics.record_dropped(job_id, policy);
        self.emit(JobEvent::Dropped {
            job_id: *job_id,
            policy,
            at: Utc::now(),
        });
    }

    fn record_dispatched(&self, job_id: &JobId, waited: Duration) {
        self.metrics.record_dispatched(job_id, waited);
        self.emit(JobEvent::Started {
            job_id: *job_id,
            waited_ms: millis(waited),
            at: Utc::now(),
        });
    }

    fn record_completed(&self, job_id: &JobId, outcome: &Outcome, duration: Duration) {
        self.metrics.record_completed(job_id, outcome, duration);

        let job_id = *job_id;
        let duration_ms = millis(duration);
        let at = Utc::now();
        self.emit(match outcome {
            Outcome::Succeeded => JobEvent::Succeeded { job_id, duration_ms, at },
            Outcome::Failed(error) => JobEvent::Failed {
                job_id,
                error: error.to_string(),
                duration_ms,
                at,
            },
            Outcome::TimedOut => JobEvent::TimedOut { job_id, duration_ms, at },
            Outcome::ShutdownCancelled => JobEvent::Cancelled { job_id, at },
        });
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Rates derived from live metrics
pub struct PerformanceAnalytics {
    metrics: Arc<LiveMetrics>,
}

impl PerformanceAnalytics {
    pub fn new(metrics: Arc<LiveMetrics>) -> Self {
        Self { metrics }
    }

    /// Share of finished jobs that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        self.rate(self.metrics.jobs_succeeded())
    }

    /// Share of finished jobs that failed, as a percentage
    pub fn failure_rate(&self) -> f64 {
        self.rate(self.metrics.jobs_failed())
    }

    /// Share of finished jobs that timed out, as a percentage
    pub fn timeout_rate(&self) -> f64 {
        self.rate(self.metrics.jobs_timed_out())
    }

    fn rate(&self, part: u64) -> f64 {
        let finished = self.metrics.jobs_succeeded()
            + self.metrics.jobs_failed()
            + self.metrics.jobs_timed_out();
        if finished == 0 {
            return 0.0;
        }
        (part as f64 / finished as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobError;

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let layer = ObservabilityLayer::new();
        let mut events = layer.events();
        let job_id = JobId::new();

        layer.record_enqueued(&job_id);
        layer.record_dispatched(&job_id, Duration::from_millis(3));
        layer.record_completed(&job_id, &Outcome::TimedOut, Duration::from_millis(8));

        let names: Vec<&str> = vec![
            events.next().await.unwrap().event_name(),
            events.next().await.unwrap().event_name(),
            events.next().await.unwrap().event_name(),
        ];
        assert_eq!(names, vec!["enqueued", "started", "timed_out"]);
        assert_eq!(layer.metrics().jobs_timed_out(), 1);
        assert_eq!(layer.metrics().active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_failed_event_carries_error() {
        let layer = ObservabilityLayer::new();
        let mut events = layer.subscribe();
        let job_id = JobId::new();

        layer.record_dispatched(&job_id, Duration::ZERO);
        layer.record_completed(
            &job_id,
            &Outcome::Failed(JobError::failed("disk full")),
            Duration::from_millis(1),
        );

        let _started = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            JobEvent::Failed { job_id: id, error, .. } => {
                assert_eq!(id, job_id);
                assert_eq!(error, "disk full");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_analytics_rates() {
        let layer = ObservabilityLayer::new();
        let analytics = layer.analytics();
        assert_eq!(analytics.success_rate(), 0.0);

        let job_id = JobId::new();
        for outcome in [
            Outcome::Succeeded,
            Outcome::Succeeded,
            Outcome::Failed(JobError::Cancelled),
            Outcome::TimedOut,
        ] {
            layer.record_dispatched(&job_id, Duration::ZERO);
            layer.record_completed(&job_id, &outcome, Duration::ZERO);
        }

        assert_eq!(analytics.success_rate(), 50.0);
        assert_eq!(analytics.failure_rate(), 25.0);
        assert_eq!(analytics.timeout_rate(), 25.0);
    }
}
