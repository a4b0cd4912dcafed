use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::store::{EntityKind, StoreError};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to scan {root}: {source}")]
    Scan {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Changes made by one pass over a single entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub kind: EntityKind,
    /// Files found under the kind's root.
    pub scanned: u64,
    /// Files with no entity, now inserted.
    pub inserted: u64,
    /// Entities whose status or location did not match the file.
    pub corrected: u64,
    /// Entities recorded on disk whose file is gone.
    pub downgraded: u64,
    /// Downgraded products with no download URL to fetch them again.
    pub unrecoverable: u64,
    /// Files whose name could not be parsed.
    pub skipped: u64,
}

impl PassReport {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            scanned: 0,
            inserted: 0,
            corrected: 0,
            downgraded: 0,
            unrecoverable: 0,
            skipped: 0,
        }
    }

    /// Number of entity writes the pass made, verified flags aside.
    pub fn changes(&self) -> u64 {
        self.inserted + self.corrected + self.downgraded
    }
}

/// Outcome of a full verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub derivatives: PassReport,
    pub products: PassReport,
    /// Source files of consumed products still on disk.
    pub leftovers: Vec<PathBuf>,
    /// Leftovers deleted during this run.
    pub purged: u64,
}

impl VerifyReport {
    pub fn changes(&self) -> u64 {
        self.derivatives.changes() + self.products.changes()
    }
}
