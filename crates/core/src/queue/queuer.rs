use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, CatalogError};
use crate::granule::{DateRange, GranuleName, Mission};
use crate::store::{validate_priority, EntityStore, NewProduct, StoreError};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What to queue.
#[derive(Debug, Clone)]
pub struct QueueRequest {
    pub missions: Vec<Mission>,
    pub range: DateRange,
    pub priority: u8,
}

/// Counts of a queueing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    /// Catalog hits over every confirmed mission.
    pub found: u64,
    pub queued: u64,
    pub already_known: u64,
    /// Known products that had no download URL and now have one.
    pub relinked: u64,
    /// URLs whose file name is not a level-2 granule name.
    pub unparseable: u64,
    /// Missions skipped because the confirmation was declined.
    pub declined: u64,
}

/// Creates Queued products from catalog listings.
pub struct Queuer {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn EntityStore>,
    resolution: String,
}

impl Queuer {
    /// `resolution` names the targets of queued products.
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn EntityStore>,
        resolution: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            store,
            resolution: resolution.into(),
        }
    }

    /// Queue every catalog granule of each mission within the range.
    ///
    /// `confirm` is asked once per mission with the catalog hit count before
    /// anything is listed; returning `false` skips that mission.
    pub async fn queue<F>(
        &self,
        request: &QueueRequest,
        mut confirm: F,
    ) -> Result<QueueSummary, QueueError>
    where
        F: FnMut(Mission, u64) -> bool,
    {
        let priority = validate_priority(request.priority as i64)?;
        let mut summary = QueueSummary::default();

        for &mission in &request.missions {
            let hits = self.catalog.count(mission, &request.range).await?;
            if hits == 0 {
                info!(%mission, range = %request.range, "No granules in catalog");
                continue;
            }
            if !confirm(mission, hits) {
                info!(%mission, hits, "Queueing declined");
                summary.declined += 1;
                continue;
            }
            summary.found += hits;

            let urls = self.catalog.list_urls(mission, &request.range).await?;
            info!(%mission, urls = urls.len(), priority, "Queueing granules");
            for url in urls {
                self.queue_url(&url, priority, &mut summary)?;
            }
        }

        info!(
            queued = summary.queued,
            already_known = summary.already_known,
            relinked = summary.relinked,
            unparseable = summary.unparseable,
            "Queueing complete"
        );
        Ok(summary)
    }

    fn queue_url(
        &self,
        url: &str,
        priority: u8,
        summary: &mut QueueSummary,
    ) -> Result<(), QueueError> {
        let file_name = file_name_of(url);
        let target = match GranuleName::parse(file_name) {
            Ok(name) => name.target_name(&self.resolution),
            Err(e) => {
                warn!(url, error = %e, "Skipping URL with unrecognized file name");
                None
            }
        };
        let Some(target) = target else {
            summary.unparseable += 1;
            return Ok(());
        };

        match self
            .store
            .create_product(NewProduct::queued(file_name, url, target, priority))
        {
            Ok(_) => {
                summary.queued += 1;
                Ok(())
            }
            Err(StoreError::AlreadyExists { .. }) => {
                summary.already_known += 1;
                if self.store.attach_download_url(file_name, url)? {
                    info!(product = file_name, "Download URL restored for known product");
                    summary.relinked += 1;
                } else {
                    debug!(product = file_name, "Already known");
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Last path segment of a URL, without query string.
fn file_name_of(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}
