use tracing::{field, info_span, span, Level, Span};

use crate::JobId;

/// Span wrapping one job execution.
///
/// Jobs always start a new trace; the span that enqueued the job, when there
/// was one, is recorded as its cause through `follows_from`.
pub(crate) fn job_span(job_id: &JobId, enqueued_from: Option<span::Id>) -> Span {
    let span = info_span!(
        parent: None,
        "dog_jobs.job",
        job_id = %job_id,
        outcome = field::Empty,
    );
    if let Some(cause) = enqueued_from {
        span.follows_from(cause);
    }
    span
}

/// Emit `message` for `job_id` at a level chosen at runtime
pub(crate) fn log_at(level: Level, job_id: &JobId, message: &str) {
    if level == Level::ERROR {
        tracing::error!(job_id = %job_id, "{message}");
    } else if level == Level::WARN {
        tracing::warn!(job_id = %job_id, "{message}");
    } else if level == Level::INFO {
        tracing::info!(job_id = %job_id, "{message}");
    } else if level == Level::DEBUG {
        tracing::debug!(job_id = %job_id, "{message}");
    } else {
        tracing::trace!(job_id = %job_id, "{message}");
    }
}

/// Install a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"info,dog_jobs=debug"`).
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(default_filter: &str, json: bool) -> crate::JobsResult<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| crate::JobsError::config(format!("invalid log filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    result.map_err(|e| crate::JobsError::Internal(format!("tracing already initialized: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing::Subscriber;
    use tracing_subscriber::layer::{Context, Layer};
    use tracing_subscriber::prelude::*;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recorded {
        spans: Vec<(&'static str, span::Id, bool)>,
        follows: Vec<(span::Id, span::Id)>,
        closed: Vec<span::Id>,
    }

    /// Layer recording span creation, `follows_from` links and closes
    #[derive(Clone, Default)]
    pub(crate) struct SpanLinks {
        recorded: Arc<Mutex<Recorded>>,
    }

    impl SpanLinks {
        /// Most recent span with `name`, and whether it was created as a root
        pub(crate) fn last_span_named(&self, name: &str) -> Option<(span::Id, bool)> {
            self.recorded
                .lock()
                .spans
                .iter()
                .rev()
                .find(|(n, _, _)| *n == name)
                .map(|(_, id, root)| (id.clone(), *root))
        }

        pub(crate) fn causes_of(&self, id: &span::Id) -> Vec<span::Id> {
            self.recorded
                .lock()
                .follows
                .iter()
                .filter(|(span, _)| span == id)
                .map(|(_, cause)| cause.clone())
                .collect()
        }

        pub(crate) fn is_closed(&self, id: &span::Id) -> bool {
            self.recorded.lock().closed.contains(id)
        }
    }

    impl<S: Subscriber> Layer<S> for SpanLinks {
        fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, _ctx: Context<'_, S>) {
            self.recorded
                .lock()
                .spans
                .push((attrs.metadata().name(), id.clone(), attrs.is_root()));
        }

        fn on_follows_from(&self, span: &span::Id, follows: &span::Id, _ctx: Context<'_, S>) {
            self.recorded.lock().follows.push((span.clone(), follows.clone()));
        }

        fn on_close(&self, id: span::Id, _ctx: Context<'_, S>) {
            self.recorded.lock().closed.push(id);
        }
    }

    #[test]
    #[traced_test]
    fn test_log_at_runtime_level() {
        let job_id = JobId::new();
        log_at(Level::WARN, &job_id, "job exceeded its deadline");
        assert!(logs_contain("job exceeded its deadline"));
        assert!(logs_contain(&job_id.to_string()));
    }

    #[test]
    fn test_job_span_follows_enqueuer() {
        let links = SpanLinks::default();
        let subscriber = tracing_subscriber::registry().with(links.clone());

        tracing::subscriber::with_default(subscriber, || {
            let request = info_span!("enqueue_request");
            let request_id = request.id().unwrap();

            let linked = job_span(&JobId::new(), Some(request_id.clone()));
            let linked_id = linked.id().unwrap();
            assert_eq!(links.causes_of(&linked_id), vec![request_id]);
            assert_eq!(links.last_span_named("dog_jobs.job"), Some((linked_id, true)));

            let root = job_span(&JobId::new(), None);
            assert!(links.causes_of(&root.id().unwrap()).is_empty());
        });
    }

    #[cfg(feature = "tracing-basic")]
    #[test]
    fn test_init_tracing_rejects_bad_filter() {
        std::env::remove_var("RUST_LOG");
        assert!(matches!(
            init_tracing("dog_jobs=notalevel[", false),
            Err(crate::JobsError::InvalidConfig(_))
        ));
    }
}
