//! Recursive directory enumeration.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A regular file found under a scanned root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Bare file name, used as the entity id.
    pub id: String,
}

/// Every regular file under `root`, sorted by path.
///
/// A missing root yields an empty list. Partially written `.part` files are
/// skipped.
pub fn enumerate_files(root: &Path) -> io::Result<Vec<DiscoveredFile>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(id) = entry.file_name().to_str() else {
            continue;
        };
        if id.ends_with(".part") {
            continue;
        }
        files.push(DiscoveredFile {
            id: id.to_string(),
            path: entry.path().to_path_buf(),
        });
    }
    Ok(files)
}

/// Total size in bytes of every regular file under `root`.
pub fn directory_size(root: &Path) -> io::Result<u64> {
    if !root.exists() {
        return Ok(0);
    }

    let mut total = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(io::Error::from)?.len();
        }
    }
    Ok(total)
}
