//! Mock granule catalog for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::{CatalogClient, CatalogError};
use crate::granule::{DateRange, GranuleName, Mission};

/// Mock implementation of the CatalogClient trait.
///
/// URLs are registered per mission and filtered by the date in their file
/// name. URLs whose file name does not parse are always returned.
#[derive(Debug, Default)]
pub struct MockCatalog {
    urls: Arc<RwLock<HashMap<Mission, Vec<String>>>>,
    next_error: Arc<RwLock<Option<CatalogError>>>,
    queries: Arc<RwLock<Vec<(Mission, DateRange)>>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register URLs for a mission.
    pub async fn add_urls(&self, mission: Mission, urls: Vec<String>) {
        self.urls
            .write()
            .await
            .entry(mission)
            .or_default()
            .extend(urls);
    }

    /// Configure the next query to fail with the given error.
    pub async fn set_next_error(&self, error: CatalogError) {
        *self.next_error.write().await = Some(error);
    }

    /// Get every (mission, range) listed so far.
    pub async fn recorded_queries(&self) -> Vec<(Mission, DateRange)> {
        self.queries.read().await.clone()
    }

    async fn matching(&self, mission: Mission, range: &DateRange) -> Vec<String> {
        self.urls
            .read()
            .await
            .get(&mission)
            .map(|urls| {
                urls.iter()
                    .filter(|url| {
                        let file_name = url.rsplit('/').next().unwrap_or(url);
                        GranuleName::parse(file_name)
                            .map(|name| range.contains(name.date()))
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    async fn count(&self, mission: Mission, range: &DateRange) -> Result<u64, CatalogError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        Ok(self.matching(mission, range).await.len() as u64)
    }

    async fn list_urls(
        &self,
        mission: Mission,
        range: &DateRange,
    ) -> Result<Vec<String>, CatalogError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        self.queries.write().await.push((mission, *range));
        Ok(self.matching(mission, range).await)
    }
}
