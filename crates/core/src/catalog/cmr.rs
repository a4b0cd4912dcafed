//! NASA CMR granule search client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::CatalogConfig;
use crate::granule::{DateRange, Mission};

use super::{CatalogClient, CatalogError};

/// Top-level `granules.umm_json` response.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: u64,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    umm: Umm,
}

#[derive(Debug, Deserialize)]
struct Umm {
    #[serde(rename = "RelatedUrls", default)]
    related_urls: Vec<RelatedUrl>,
}

#[derive(Debug, Deserialize)]
struct RelatedUrl {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "Type", default)]
    kind: Option<String>,
}

impl SearchItem {
    /// The direct download link, falling back to the first related URL.
    fn download_url(self) -> Option<String> {
        let mut urls = self.umm.related_urls;
        let index = urls
            .iter()
            .position(|u| u.kind.as_deref() == Some("GET DATA"))
            .unwrap_or(0);
        (index < urls.len()).then(|| urls.swap_remove(index).url)
    }
}

/// CMR-backed catalog client.
pub struct CmrCatalog {
    client: Client,
    config: CatalogConfig,
}

impl CmrCatalog {
    pub fn new(config: CatalogConfig) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| CatalogError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn build_search_url(
        &self,
        mission: Mission,
        range: &DateRange,
        page_size: u32,
        page_num: u32,
    ) -> String {
        format!(
            "{}?short_name={}&provider={}&temporal={}&page_size={}&page_num={}",
            self.config.url,
            urlencoding::encode(mission.short_name()),
            urlencoding::encode(&self.config.provider),
            urlencoding::encode(&range.to_temporal()),
            page_size,
            page_num
        )
    }

    async fn search(&self, url: &str) -> Result<SearchResponse, CatalogError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CatalogError::Timeout
            } else if e.is_connect() {
                CatalogError::ConnectionFailed(e.to_string())
            } else {
                CatalogError::ApiError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl CatalogClient for CmrCatalog {
    async fn count(&self, mission: Mission, range: &DateRange) -> Result<u64, CatalogError> {
        let url = self.build_search_url(mission, range, 0, 1);
        debug!(mission = %mission, %range, "Counting catalog granules");
        Ok(self.search(&url).await?.hits)
    }

    async fn list_urls(
        &self,
        mission: Mission,
        range: &DateRange,
    ) -> Result<Vec<String>, CatalogError> {
        let page_size = self.config.page_size.max(1);
        let hits = self.count(mission, range).await?;
        let pages = hits.div_ceil(page_size as u64) as u32;

        let mut urls = Vec::with_capacity(hits as usize);
        for page_num in 1..=pages {
            let url = self.build_search_url(mission, range, page_size, page_num);
            let page = self.search(&url).await?;
            debug!(
                mission = %mission,
                page = page_num,
                pages,
                items = page.items.len(),
                "Fetched catalog page"
            );
            urls.extend(page.items.into_iter().filter_map(SearchItem::download_url));
        }

        Ok(urls)
    }
}
