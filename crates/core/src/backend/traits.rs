//! Trait definitions for the processing backend.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

use super::error::BackendError;

/// Processing stage, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Bin,
    Map,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Bin => f.write_str("binning"),
            Stage::Map => f.write_str("mapping"),
        }
    }
}

/// Runs the binning and mapping stages of level-3 production.
#[async_trait]
pub trait ProcessingBackend: Send + Sync {
    /// Returns the name of this backend implementation.
    fn name(&self) -> &str;

    /// Bin every level-2 file in `inputs` (in order) into one binned file at `output`.
    async fn bin(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        product: &str,
        resolution: &str,
    ) -> Result<(), BackendError>;

    /// Map the binned file at `input` onto a grid at `output`.
    async fn map(
        &self,
        input: &Path,
        output: &Path,
        product: &str,
        resolution: &str,
    ) -> Result<(), BackendError>;
}
