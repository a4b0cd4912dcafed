//! On-disk layout of the data volume.
//!
//! ```text
//! <root>/L2/<MISSION_SENSOR>/<SUITE>/<product>
//! <root>/L3b/<binned intermediate>
//! <root>/L3m/<MISSION_SENSOR>/<SUITE>/<derivative>
//! ```

mod scan;

pub use scan::{directory_size, enumerate_files, DiscoveredFile};

use std::path::{Path, PathBuf};

use crate::granule::GranuleName;
use crate::store::EntityKind;

/// Maps granule names to paths under the data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory tree holding every file of `kind`.
    pub fn kind_root(&self, kind: EntityKind) -> PathBuf {
        match kind {
            EntityKind::Product => self.root.join("L2"),
            EntityKind::Derivative => self.root.join("L3m"),
        }
    }

    /// Scratch directory for binned intermediates.
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("L3b")
    }

    /// Directory a granule of `kind` lives in.
    pub fn dir_for(&self, kind: EntityKind, name: &GranuleName) -> PathBuf {
        self.kind_root(kind).join(name.platform()).join(name.suite())
    }

    /// Full path of a granule of `kind`.
    pub fn path_for(&self, kind: EntityKind, name: &GranuleName) -> PathBuf {
        self.dir_for(kind, name).join(name.file_name())
    }

    /// Path of a binned intermediate file.
    pub fn work_path(&self, file_name: &str) -> PathBuf {
        self.work_dir().join(file_name)
    }
}
