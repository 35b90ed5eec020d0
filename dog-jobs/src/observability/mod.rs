pub mod metrics;
pub mod tracing;
pub mod analytics;

pub use metrics::{names, DurationHistogram, JobMetrics, LiveMetrics, MetricsSnapshot};
pub use analytics::{ObservabilityLayer, PerformanceAnalytics};

#[cfg(feature = "tracing-basic")]
pub use self::tracing::init_tracing;
