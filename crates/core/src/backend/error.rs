//! Error types for the processing backend.

use std::path::PathBuf;
use thiserror::Error;

use super::traits::Stage;

/// Errors that can occur while running a processing stage.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Stage binary not found.
    #[error("{stage} binary not found at path: {path}")]
    BinaryNotFound { stage: Stage, path: PathBuf },

    /// Input file missing before the stage ran.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Stage process exited unsuccessfully.
    #[error("{stage} failed with exit code {code:?}")]
    ProcessFailed {
        stage: Stage,
        code: Option<i32>,
        stderr: String,
    },

    /// I/O error while preparing or running a stage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn process_failed(stage: Stage, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::ProcessFailed {
            stage,
            code,
            stderr: stderr.into(),
        }
    }

    /// Captured stderr of a failed process, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ProcessFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}
