//! Download run loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::DownloaderConfig;
use crate::granule::GranuleName;
use crate::layout::DataLayout;
use crate::retrieval::{RetrievalOutcome, Retriever};
use crate::store::{EntityKind, EntityStore, Product, StoreError};

use super::meter::VolumeMeter;
use super::types::{DownloadError, DownloadSummary};

/// Drives Queued products to Retrieved.
pub struct DownloadScheduler {
    config: DownloaderConfig,
    layout: DataLayout,
    store: Arc<dyn EntityStore>,
    retriever: Arc<dyn Retriever>,
    meter: Arc<dyn VolumeMeter>,
}

impl DownloadScheduler {
    pub fn new(
        config: DownloaderConfig,
        layout: DataLayout,
        store: Arc<dyn EntityStore>,
        retriever: Arc<dyn Retriever>,
        meter: Arc<dyn VolumeMeter>,
    ) -> Self {
        Self {
            config,
            layout,
            store,
            retriever,
            meter,
        }
    }

    /// Download every Queued product once.
    ///
    /// Products that fail or come back not-modified are not retried within
    /// the same run. The run ends when no untried Queued product remains.
    pub async fn run(&self) -> Result<DownloadSummary, DownloadError> {
        info!(
            batch_size = self.config.batch_size,
            quota_bytes = self.config.quota_bytes,
            "Download scheduler started"
        );

        let mut summary = DownloadSummary::default();
        let mut attempted: HashSet<String> = HashSet::new();

        loop {
            self.wait_for_quota().await?;

            let batch = self.next_batch(&attempted)?;
            if batch.is_empty() {
                break;
            }

            for product in batch {
                attempted.insert(product.id.clone());
                self.download(&product, &mut summary).await?;
            }
        }

        info!(
            downloaded = summary.downloaded,
            not_modified = summary.not_modified,
            failed = summary.failed,
            skipped = summary.skipped,
            bytes = summary.bytes,
            "Download run complete, no queued products left"
        );
        Ok(summary)
    }

    fn next_batch(&self, attempted: &HashSet<String>) -> Result<Vec<Product>, StoreError> {
        let batch_size = self.config.batch_size as usize;
        let fetch = u32::try_from(batch_size + attempted.len()).unwrap_or(u32::MAX);

        Ok(self
            .store
            .ready_for_download(fetch)?
            .into_iter()
            .filter(|p| !attempted.contains(&p.id))
            .take(batch_size)
            .collect())
    }

    /// Block while the data volume is over quota, for at most
    /// `quota_poll_attempts` polls.
    async fn wait_for_quota(&self) -> Result<(), DownloadError> {
        let interval = Duration::from_millis(self.config.quota_poll_interval_ms);
        let attempts = self.config.quota_poll_attempts;

        let mut used = self.meter.used_bytes().await?;
        let mut polls = 0;
        while used > self.config.quota_bytes {
            if polls >= attempts {
                error!(
                    used_bytes = used,
                    quota_bytes = self.config.quota_bytes,
                    "Data volume still over quota, giving up"
                );
                return Err(DownloadError::QuotaExceeded {
                    used_bytes: used,
                    quota_bytes: self.config.quota_bytes,
                    waited: interval * polls,
                });
            }

            warn!(
                used_bytes = used,
                quota_bytes = self.config.quota_bytes,
                attempts_left = attempts - polls,
                "Data volume over quota, waiting {:?} before next check",
                interval
            );
            tokio::time::sleep(interval).await;
            polls += 1;
            used = self.meter.used_bytes().await?;
        }

        Ok(())
    }

    async fn download(
        &self,
        product: &Product,
        summary: &mut DownloadSummary,
    ) -> Result<(), DownloadError> {
        let Some(url) = product.download_url.as_deref() else {
            summary.skipped += 1;
            return Ok(());
        };

        let name = match GranuleName::parse(&product.id) {
            Ok(name) => name,
            Err(e) => {
                warn!(product = %product.id, error = %e, "Skipping product with malformed name");
                summary.skipped += 1;
                return Ok(());
            }
        };
        let dest = self.layout.path_for(EntityKind::Product, &name);

        info!(product = %product.id, priority = product.priority, "Downloading");
        match self.retriever.retrieve(url, &dest).await {
            Ok(RetrievalOutcome::Downloaded { path, bytes }) => {
                self.store.mark_retrieved(&product.id, &path)?;
                summary.downloaded += 1;
                summary.bytes += bytes;
                info!(product = %product.id, bytes, path = %path.display(), "Downloaded");
            }
            Ok(RetrievalOutcome::NotModified { path }) => {
                summary.not_modified += 1;
                info!(
                    product = %product.id,
                    path = %path.display(),
                    "Remote file not modified, status left for the verifier"
                );
            }
            Err(e) => {
                summary.failed += 1;
                warn!(
                    product = %product.id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Download failed, product stays queued"
                );
            }
        }

        Ok(())
    }
}
