use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{JobContext, JobError};

/// Notified once for every job that ends in [`crate::Outcome::Failed`].
///
/// Errors (and panics) raised here are logged by the runner and never retried.
#[async_trait]
pub trait JobFailureHandler: Send + Sync {
    async fn handle(
        &self,
        context: &JobContext,
        error: &JobError,
        shutdown: &CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Notified once for every job that ends in [`crate::Outcome::TimedOut`]
#[async_trait]
pub trait JobTimeoutHandler: Send + Sync {
    async fn handle(&self, context: &JobContext, shutdown: &CancellationToken) -> anyhow::Result<()>;
}

/// Builds the scope value passed into each job execution.
///
/// A fresh scope is created right before the callback runs and dropped on
/// every exit path, including timeout, shutdown and panics.
pub trait ScopeFactory<S>: Send + Sync {
    fn create_scope(&self, context: &JobContext) -> S;
}

impl<S, F> ScopeFactory<S> for F
where
    F: Fn(&JobContext) -> S + Send + Sync,
{
    fn create_scope(&self, context: &JobContext) -> S {
        self(context)
    }
}
