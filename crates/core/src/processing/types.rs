//! Types shared by the processing scheduler and its workers.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::backend::BackendError;
use crate::granule::GranuleNameError;
use crate::store::StoreError;

use super::claims::ClaimGuard;

/// One complete group of sibling products and their shared target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub target: String,
    /// Ordered by (priority, id).
    pub product_ids: Vec<String>,
}

/// A task together with the claim on its target.
#[derive(Debug)]
pub struct ClaimedTask {
    pub task: Task,
    pub guard: ClaimGuard,
}

/// How a dispatched task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { location: PathBuf },
    Failed { reason: String },
}

/// Sent by a worker once its task has ended and the claim is released.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub worker_id: usize,
    pub target: String,
    pub outcome: TaskOutcome,
}

/// Why a single task failed. Absorbed by the worker; never fatal to the run.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("product {0} is not in the store")]
    UnknownProduct(String),

    #[error("product {0} has no recorded location")]
    MissingLocation(String),

    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("invalid target name: {0}")]
    InvalidTarget(#[from] GranuleNameError),

    #[error("target {0} is not a level-3 name")]
    NotLevel3(String),

    #[error("processing stage failed: {0}")]
    Backend(#[from] BackendError),

    #[error("output artifact missing: {0}")]
    MissingOutput(PathBuf),

    #[error("output artifact is empty: {0}")]
    EmptyOutput(PathBuf),

    #[error("failed to record result: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a processing run.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// No group became ready within the wait window.
    #[error("no processing group became ready after waiting {waited:?}; {blocked_targets} targets still blocked")]
    Stalled {
        waited: Duration,
        /// Targets still waiting on downloads.
        blocked_targets: usize,
        /// Work done before the run stalled.
        summary: ProcessingSummary,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("all workers exited unexpectedly")]
    WorkersGone,
}

impl ProcessingError {
    /// Counts of the work finished before the run ended, when known.
    pub fn summary(&self) -> Option<&ProcessingSummary> {
        match self {
            Self::Stalled { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

/// Outcome counts of a processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingSummary {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
}
