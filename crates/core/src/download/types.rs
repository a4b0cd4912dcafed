use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that abort a download run.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The data volume stayed over quota for the whole wait window.
    #[error("data volume over quota ({used_bytes} > {quota_bytes} bytes) after waiting {waited:?}")]
    QuotaExceeded {
        used_bytes: u64,
        quota_bytes: u64,
        waited: Duration,
    },

    #[error("failed to measure data volume: {0}")]
    VolumeMeter(#[from] io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome counts of a download run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub downloaded: u64,
    pub not_modified: u64,
    pub failed: u64,
    pub skipped: u64,
    pub bytes: u64,
}

impl DownloadSummary {
    pub fn attempted(&self) -> u64 {
        self.downloaded + self.not_modified + self.failed + self.skipped
    }
}
