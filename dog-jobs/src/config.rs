//! # Queue and processor configuration
//!
//! Options are plain structs validated at construction time. Applications can
//! build them in code or load them from any string key/value source using the
//! DogRS `PREFIX__SECTION__KEY` convention:
//!
//! ```bash
//! export DOG_JOBS__QUEUE__CAPACITY=500
//! export DOG_JOBS__QUEUE__OVERFLOW_POLICY=discard_oldest
//! export DOG_JOBS__PROCESSOR__CONCURRENCY_LEVEL=8
//! export DOG_JOBS__PROCESSOR__GLOBAL_TIMEOUT_MS=30000
//! export DOG_JOBS__PROCESSOR__TIMEOUT_LOG_LEVEL=warn
//! ```
//!
//! ```rust
//! use dog_jobs::config::{QueueOptions, ProcessorOptions};
//!
//! let queue = QueueOptions::from_env("DOG_JOBS").unwrap();
//! let processor = ProcessorOptions::from_env("DOG_JOBS").unwrap();
//! # let _ = (queue, processor);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::{JobsError, JobsResult};

/// Rule applied when a bounded queue is full at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the enqueuer until space frees up
    Wait,
    /// Silently drop the incoming job
    Ignore,
    /// Fail the enqueue with [`JobsError::CapacityExceeded`]
    ThrowException,
    /// Evict the oldest buffered job to make room
    DiscardOldest,
    /// Evict the most recently buffered job to make room
    DiscardNewest,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Ignore => "ignore",
            Self::ThrowException => "throw_exception",
            Self::DiscardOldest => "discard_oldest",
            Self::DiscardNewest => "discard_newest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = JobsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "wait" => Ok(Self::Wait),
            "ignore" => Ok(Self::Ignore),
            "throw_exception" | "throw" => Ok(Self::ThrowException),
            "discard_oldest" => Ok(Self::DiscardOldest),
            "discard_newest" => Ok(Self::DiscardNewest),
            _ => Err(JobsError::config(format!("unknown overflow policy '{s}'"))),
        }
    }
}

/// Queue capacity settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Maximum number of buffered jobs; `None` means unbounded
    pub capacity: Option<usize>,
    /// Required whenever `capacity` is set
    pub overflow_policy: Option<OverflowPolicy>,
}

impl QueueOptions {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity),
            overflow_policy: Some(policy),
        }
    }

    pub fn validate(&self) -> JobsResult<()> {
        match (self.capacity, self.overflow_policy) {
            (Some(0), _) => Err(JobsError::config("queue capacity must be greater than zero")),
            (Some(_), None) => Err(JobsError::config(
                "overflow policy must be set when queue capacity is set",
            )),
            _ => Ok(()),
        }
    }

    /// Load from environment variables named `{prefix}__QUEUE__*`
    pub fn from_env(prefix: &str) -> JobsResult<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> JobsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let options = Self {
            capacity: parse_key(&lookup, &config_key(prefix, "QUEUE", "CAPACITY"))?,
            overflow_policy: parse_key(&lookup, &config_key(prefix, "QUEUE", "OVERFLOW_POLICY"))?,
        };
        options.validate()?;
        Ok(options)
    }
}

/// Processor execution settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Number of jobs allowed to run at the same time
    pub concurrency_level: usize,
    /// Timeout applied to jobs enqueued without an override
    pub global_timeout: Option<Duration>,
    /// Level used to log job timeouts; `None` keeps them silent
    pub timeout_log_level: Option<Level>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            concurrency_level: 1,
            global_timeout: None,
            timeout_log_level: None,
        }
    }
}

impl ProcessorOptions {
    pub fn with_concurrency_level(mut self, concurrency_level: usize) -> Self {
        self.concurrency_level = concurrency_level;
        self
    }

    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = Some(timeout);
        self
    }

    pub fn with_timeout_log_level(mut self, level: Level) -> Self {
        self.timeout_log_level = Some(level);
        self
    }

    pub fn validate(&self) -> JobsResult<()> {
        if self.concurrency_level == 0 {
            return Err(JobsError::config("concurrency level must be greater than zero"));
        }
        if self.global_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(JobsError::config("global job timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Load from environment variables named `{prefix}__PROCESSOR__*`
    pub fn from_env(prefix: &str) -> JobsResult<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> JobsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let concurrency_level: Option<usize> =
            parse_key(&lookup, &config_key(prefix, "PROCESSOR", "CONCURRENCY_LEVEL"))?;
        let timeout_ms: Option<u64> =
            parse_key(&lookup, &config_key(prefix, "PROCESSOR", "GLOBAL_TIMEOUT_MS"))?;
        let options = Self {
            concurrency_level: concurrency_level.unwrap_or(defaults.concurrency_level),
            global_timeout: timeout_ms.map(Duration::from_millis),
            timeout_log_level: parse_key(
                &lookup,
                &config_key(prefix, "PROCESSOR", "TIMEOUT_LOG_LEVEL"),
            )?,
        };
        options.validate()?;
        Ok(options)
    }
}

fn config_key(prefix: &str, section: &str, key: &str) -> String {
    format!("{}__{section}__{key}", prefix.trim_end_matches('_'))
}

fn parse_key<F, T>(lookup: &F, key: &str) -> JobsResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| JobsError::config(format!("{key}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_bounded_queue_requires_policy() {
        let options = QueueOptions {
            capacity: Some(10),
            overflow_policy: None,
        };
        assert!(matches!(options.validate(), Err(JobsError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let options = QueueOptions::bounded(0, OverflowPolicy::Wait);
        assert!(matches!(options.validate(), Err(JobsError::InvalidConfig(_))));
        assert!(QueueOptions::unbounded().validate().is_ok());
    }

    #[test]
    fn test_processor_validation() {
        assert!(ProcessorOptions::default().validate().is_ok());
        assert!(ProcessorOptions::default()
            .with_concurrency_level(0)
            .validate()
            .is_err());
        assert!(ProcessorOptions::default()
            .with_global_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Wait".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Wait);
        assert_eq!(
            "discard-oldest".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::DiscardOldest
        );
        assert_eq!(
            "throw".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::ThrowException
        );
        assert!("sometimes".parse::<OverflowPolicy>().is_err());
    }

    #[test]
    fn test_load_from_lookup() {
        let lookup = lookup_from(&[
            ("DOG_JOBS__QUEUE__CAPACITY", "25"),
            ("DOG_JOBS__QUEUE__OVERFLOW_POLICY", "discard_newest"),
            ("DOG_JOBS__PROCESSOR__CONCURRENCY_LEVEL", "4"),
            ("DOG_JOBS__PROCESSOR__GLOBAL_TIMEOUT_MS", "1500"),
            ("DOG_JOBS__PROCESSOR__TIMEOUT_LOG_LEVEL", "warn"),
        ]);

        let queue = QueueOptions::from_lookup("DOG_JOBS", &lookup).unwrap();
        assert_eq!(queue, QueueOptions::bounded(25, OverflowPolicy::DiscardNewest));

        let processor = ProcessorOptions::from_lookup("DOG_JOBS_", &lookup).unwrap();
        assert_eq!(processor.concurrency_level, 4);
        assert_eq!(processor.global_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(processor.timeout_log_level, Some(Level::WARN));
    }

    #[test]
    fn test_load_defaults_and_errors() {
        let empty = lookup_from(&[]);
        assert_eq!(
            QueueOptions::from_lookup("APP", &empty).unwrap(),
            QueueOptions::unbounded()
        );
        assert_eq!(
            ProcessorOptions::from_lookup("APP", &empty).unwrap(),
            ProcessorOptions::default()
        );

        let bad = lookup_from(&[("APP__PROCESSOR__CONCURRENCY_LEVEL", "many")]);
        assert!(matches!(
            ProcessorOptions::from_lookup("APP", &bad),
            Err(JobsError::InvalidConfig(_))
        ));

        let missing_policy = lookup_from(&[("APP__QUEUE__CAPACITY", "3")]);
        assert!(QueueOptions::from_lookup("APP", &missing_policy).is_err());
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: OverflowPolicy = serde::Deserialize::deserialize(
            serde::de::value::StrDeserializer::<serde::de::value::Error>::new("discard_oldest"),
        )
        .unwrap();
        assert_eq!(policy, OverflowPolicy::DiscardOldest);
        assert_eq!(policy.to_string(), "discard_oldest");
    }
}
