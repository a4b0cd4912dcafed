//! Trait definitions for the retrieval module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::error::RetrievalError;

/// Result of a successful retrieval call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// The file was (re)written at `path`.
    Downloaded { path: PathBuf, bytes: u64 },
    /// The local copy at `path` is already current; nothing was written.
    NotModified { path: PathBuf },
}

impl RetrievalOutcome {
    pub fn path(&self) -> &Path {
        match self {
            RetrievalOutcome::Downloaded { path, .. } | RetrievalOutcome::NotModified { path } => {
                path
            }
        }
    }
}

/// Fetches a remote file to a local path.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Fetch `url` into `dest` (full file path), creating parent directories.
    ///
    /// An existing file at `dest` is only replaced when the remote copy is newer.
    async fn retrieve(&self, url: &str, dest: &Path) -> Result<RetrievalOutcome, RetrievalError>;
}
