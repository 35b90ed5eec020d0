pub mod ids;
pub mod ctx;
pub mod descriptor;
pub mod outcome;
pub mod events;

pub use ids::JobId;
pub use ctx::JobContext;
pub use descriptor::{JobDescriptor, JobFn, JobFuture};
pub use outcome::{Outcome, OutcomeKind};
pub use events::JobEvent;
