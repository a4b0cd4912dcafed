//! Mock retriever and volume meter for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::download::VolumeMeter;
use crate::retrieval::{RetrievalError, RetrievalOutcome, Retriever};

/// A recorded retrieval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub dest: PathBuf,
}

/// Mock implementation of the Retriever trait.
///
/// By default every request "downloads" by writing the URL's bytes to the
/// destination. Individual URLs can be made to fail once or to answer
/// not-modified.
#[derive(Debug, Default)]
pub struct MockRetriever {
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
    failures: Arc<RwLock<HashMap<String, RetrievalError>>>,
    not_modified: Arc<RwLock<HashSet<String>>>,
}

impl MockRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded requests, in request order.
    pub async fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Fail the next request for `url` with `error`.
    pub async fn fail_url(&self, url: &str, error: RetrievalError) {
        self.failures.write().await.insert(url.to_string(), error);
    }

    /// Answer every request for `url` as not modified.
    pub async fn not_modified_url(&self, url: &str) {
        self.not_modified.write().await.insert(url.to_string());
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(&self, url: &str, dest: &Path) -> Result<RetrievalOutcome, RetrievalError> {
        self.requests.write().await.push(RecordedRequest {
            url: url.to_string(),
            dest: dest.to_path_buf(),
        });

        if let Some(err) = self.failures.write().await.remove(url) {
            return Err(err);
        }
        if self.not_modified.read().await.contains(url) {
            return Ok(RetrievalOutcome::NotModified {
                path: dest.to_path_buf(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, url.as_bytes()).await?;

        Ok(RetrievalOutcome::Downloaded {
            path: dest.to_path_buf(),
            bytes: url.len() as u64,
        })
    }
}

/// Mock implementation of the VolumeMeter trait.
///
/// Returns scripted readings in order, repeating the last one once the
/// script runs out.
#[derive(Debug)]
pub struct MockVolumeMeter {
    readings: Arc<RwLock<Vec<u64>>>,
    reads: Arc<RwLock<usize>>,
}

impl MockVolumeMeter {
    pub fn new(used_bytes: u64) -> Self {
        Self {
            readings: Arc::new(RwLock::new(vec![used_bytes])),
            reads: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn set_readings(&self, readings: Vec<u64>) {
        *self.readings.write().await = readings;
        *self.reads.write().await = 0;
    }

    /// Number of readings taken so far.
    pub async fn reading_count(&self) -> usize {
        *self.reads.read().await
    }
}

#[async_trait]
impl VolumeMeter for MockVolumeMeter {
    async fn used_bytes(&self) -> io::Result<u64> {
        let readings = self.readings.read().await;
        let mut reads = self.reads.write().await;
        let value = readings
            .get(*reads)
            .or_else(|| readings.last())
            .copied()
            .unwrap_or(0);
        *reads += 1;
        Ok(value)
    }
}
