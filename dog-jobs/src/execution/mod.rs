pub mod slots;
pub mod cancellation;
pub mod handlers;
pub mod runner;

pub use slots::{SlotGuard, SlotTracker};
pub use cancellation::{CancellationReason, CancellationSignal};
pub use handlers::{JobFailureHandler, JobTimeoutHandler, ScopeFactory};
pub use runner::JobRunner;
