use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::layout::directory_size;

/// Reports how much of the data volume is in use.
#[async_trait]
pub trait VolumeMeter: Send + Sync {
    async fn used_bytes(&self) -> io::Result<u64>;
}

/// Sums file sizes under a directory tree.
#[derive(Debug, Clone)]
pub struct FsVolumeMeter {
    root: PathBuf,
}

impl FsVolumeMeter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl VolumeMeter for FsVolumeMeter {
    async fn used_bytes(&self) -> io::Result<u64> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || directory_size(&root))
            .await
            .map_err(io::Error::other)?
    }
}
