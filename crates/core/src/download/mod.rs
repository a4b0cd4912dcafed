//! Download scheduler.
//!
//! Pulls Queued products in priority order, blocks while the data volume is
//! over quota, and records each retrieval outcome in the store.

mod meter;
mod scheduler;
mod types;

pub use meter::{FsVolumeMeter, VolumeMeter};
pub use scheduler::DownloadScheduler;
pub use types::{DownloadError, DownloadSummary};
