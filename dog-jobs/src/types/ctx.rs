use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::JobId;

/// Read-only execution context handed to a running job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: JobId,
    /// When the job was accepted by the queue
    pub queued_at: DateTime<Utc>,
    /// When the runner dispatched the job
    pub started_at: DateTime<Utc>,
}

impl JobContext {
    pub fn new(job_id: JobId, queued_at: DateTime<Utc>, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            queued_at,
            started_at,
        }
    }

    /// Time the job spent buffered before it started
    pub fn waited(&self) -> Duration {
        (self.started_at - self.queued_at)
            .to_std()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waited() {
        let queued_at = Utc::now();
        let started_at = queued_at + chrono::Duration::milliseconds(250);
        let ctx = JobContext::new(JobId::new(), queued_at, started_at);
        assert_eq!(ctx.waited(), Duration::from_millis(250));

        // Clock skew never yields a negative wait
        let skewed = JobContext::new(JobId::new(), started_at, queued_at);
        assert_eq!(skewed.waited(), Duration::ZERO);
    }
}
