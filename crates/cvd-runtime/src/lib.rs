//! cvd-runtime
//!
//! The refresh pipeline: concurrent fetch of both feeds, generation
//! assembly, gated transactional publish, and the interval scheduler that
//! drives it.
//!
//! Feeds and the store are trait objects, so the same pipeline runs against
//! live adapters and Postgres in the daemon and against fakes in tests.

mod outcome;
mod pipeline;
mod publish;
mod scheduler;

pub use outcome::{PublishSummary, RunError, RunOutcome};
pub use pipeline::Pipeline;
pub use publish::PublishCoordinator;
pub use scheduler::{run_on_interval, RunRecord, RunResult};
