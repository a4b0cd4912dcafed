//! Level-3 processing.
//!
//! The [`ProcessingScheduler`] groups Retrieved products by target, claims the
//! target, and hands a [`Task`] to the [`WorkerPool`]. Each worker runs the
//! task through a [`TaskExecutor`], which drives the binning and mapping
//! stages and commits the result to the store.
//!
//! At most one task per target is ever in flight: claims live in a
//! [`ClaimTable`] and are released by a drop guard, so a failing or panicking
//! task still frees its target.

mod claims;
mod executor;
mod planner;
mod pool;
mod scheduler;
mod types;

pub use claims::{ClaimGuard, ClaimTable};
pub use executor::TaskExecutor;
pub use planner::{group_by_target, next_task, TargetGroup};
pub use pool::WorkerPool;
pub use scheduler::ProcessingScheduler;
pub use types::{
    ClaimedTask, ProcessingError, ProcessingSummary, Task, TaskError, TaskOutcome, TaskReport,
};
