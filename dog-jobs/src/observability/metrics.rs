use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::{config::OverflowPolicy, JobId, Outcome};

/// Instrument names emitted by the processor
pub mod names {
    pub const ACTIVE_JOBS: &str = "dog_jobs.processor.active_jobs";
    pub const TOTAL_ENQUEUED_JOBS: &str = "dog_jobs.queue.total_enqueued_jobs";
    pub const TOTAL_DROPPED_JOBS: &str = "dog_jobs.queue.total_dropped_jobs";
    pub const TOTAL_PROCESSED_JOBS: &str = "dog_jobs.processor.total_processed_jobs";
    pub const TOTAL_SUCCESSFUL_JOBS: &str = "dog_jobs.processor.total_successful_jobs";
    pub const TOTAL_FAILED_JOBS: &str = "dog_jobs.processor.total_failed_jobs";
    pub const TOTAL_TIMED_OUT_JOBS: &str = "dog_jobs.processor.total_timed_out_jobs";
    pub const TOTAL_CANCELLED_JOBS: &str = "dog_jobs.processor.total_cancelled_jobs";
    pub const JOB_PROCESSING_DURATION: &str = "dog_jobs.processor.job_processing_duration";
    pub const JOB_WAITING_TIME: &str = "dog_jobs.processor.job_waiting_time";
}

/// Sink receiving job lifecycle measurements.
///
/// One instance is created up front and shared by the queue, the processor
/// and every runner for the lifetime of the service.
pub trait JobMetrics: Send + Sync {
    /// A job was accepted by the queue
    fn record_enqueued(&self, _job_id: &JobId) {}

    /// A job was dropped or evicted by the overflow policy
    fn record_dropped(&self, _job_id: &JobId, _policy: OverflowPolicy) {}

    /// A job left the queue and was handed to a runner (active +1)
    fn record_dispatched(&self, job_id: &JobId, waited: Duration);

    /// A job reached its terminal outcome (active -1)
    fn record_completed(&self, job_id: &JobId, outcome: &Outcome, duration: Duration);
}

/// Rolling window of duration samples with running totals
#[derive(Debug)]
pub struct DurationHistogram {
    samples: Mutex<VecDeque<Duration>>,
    window: usize,
    count: AtomicU64,
    total_micros: AtomicU64,
}

impl DurationHistogram {
    pub const DEFAULT_WINDOW: usize = 1000;

    pub fn new() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(window)),
            window,
            count: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
        }
    }

    pub fn record(&self, value: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(
            u64::try_from(value.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );

        let mut samples = self.samples.lock();
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    /// Number of samples ever recorded
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean over every sample ever recorded
    pub fn average(&self) -> Option<Duration> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        Some(Duration::from_micros(
            self.total_micros.load(Ordering::Relaxed) / count,
        ))
    }

    /// Percentile (0-100) over the samples still in the window
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        let mut sorted: Vec<Duration> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();

        let rank = (percentile.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
        sorted.get(rank.round() as usize).copied()
    }
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// In-process metrics collector backed by atomics
#[derive(Debug, Default)]
pub struct LiveMetrics {
    active_jobs: AtomicI64,
    jobs_enqueued: AtomicU64,
    jobs_dropped: AtomicU64,
    jobs_processed: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_timed_out: AtomicU64,
    jobs_cancelled: AtomicU64,
    processing_duration: DurationHistogram,
    waiting_time: DurationHistogram,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_jobs(&self) -> i64 {
        self.active_jobs.load(Ordering::Relaxed)
    }

    pub fn jobs_enqueued(&self) -> u64 {
        self.jobs_enqueued.load(Ordering::Relaxed)
    }

    pub fn jobs_dropped(&self) -> u64 {
        self.jobs_dropped.load(Ordering::Relaxed)
    }

    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    pub fn jobs_succeeded(&self) -> u64 {
        self.jobs_succeeded.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_timed_out(&self) -> u64 {
        self.jobs_timed_out.load(Ordering::Relaxed)
    }

    pub fn jobs_cancelled(&self) -> u64 {
        self.jobs_cancelled.load(Ordering::Relaxed)
    }

    pub fn processing_duration(&self) -> &DurationHistogram {
        &self.processing_duration
    }

    pub fn waiting_time(&self) -> &DurationHistogram {
        &self.waiting_time
    }

    /// Collect current snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_jobs: self.active_jobs(),
            jobs_enqueued: self.jobs_enqueued(),
            jobs_dropped: self.jobs_dropped(),
            jobs_processed: self.jobs_processed(),
            jobs_succeeded: self.jobs_succeeded(),
            jobs_failed: self.jobs_failed(),
            jobs_timed_out: self.jobs_timed_out(),
            jobs_cancelled: self.jobs_cancelled(),
            avg_processing_duration: self.processing_duration.average(),
            avg_waiting_time: self.waiting_time.average(),
        }
    }
}

impl JobMetrics for LiveMetrics {
    fn record_enqueued(&self, _job_id: &JobId) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self, _job_id: &JobId, _policy: OverflowPolicy) {
        self.jobs_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dispatched(&self, _job_id: &JobId, waited: Duration) {
        self.active_jobs.fetch_add(1, Ordering::Relaxed);
        self.waiting_time.record(waited);
    }

    fn record_completed(&self, _job_id: &JobId, outcome: &Outcome, duration: Duration) {
        self.active_jobs.fetch_sub(1, Ordering::Relaxed);
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
        self.processing_duration.record(duration);

        let counter = match outcome {
            Outcome::Succeeded => &self.jobs_succeeded,
            Outcome::Failed(_) => &self.jobs_failed,
            Outcome::TimedOut => &self.jobs_timed_out,
            Outcome::ShutdownCancelled => &self.jobs_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub active_jobs: i64,
    pub jobs_enqueued: u64,
    pub jobs_dropped: u64,
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub jobs_cancelled: u64,
    pub avg_processing_duration: Option<Duration>,
    pub avg_waiting_time: Option<Duration>,
}

impl MetricsSnapshot {
    /// Values keyed by instrument name, durations in milliseconds
    pub fn named_values(&self) -> Vec<(&'static str, f64)> {
        let millis = |d: Option<Duration>| d.map_or(0.0, |d| d.as_secs_f64() * 1000.0);
        vec![
            (names::ACTIVE_JOBS, self.active_jobs as f64),
            (names::TOTAL_ENQUEUED_JOBS, self.jobs_enqueued as f64),
            (names::TOTAL_DROPPED_JOBS, self.jobs_dropped as f64),
            (names::TOTAL_PROCESSED_JOBS, self.jobs_processed as f64),
            (names::TOTAL_SUCCESSFUL_JOBS, self.jobs_succeeded as f64),
            (names::TOTAL_FAILED_JOBS, self.jobs_failed as f64),
            (names::TOTAL_TIMED_OUT_JOBS, self.jobs_timed_out as f64),
            (names::TOTAL_CANCELLED_JOBS, self.jobs_cancelled as f64),
            (names::JOB_PROCESSING_DURATION, millis(self.avg_processing_duration)),
            (names::JOB_WAITING_TIME, millis(self.avg_waiting_time)),
        ]
    }
}
