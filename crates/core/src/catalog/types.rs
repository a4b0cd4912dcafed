use async_trait::async_trait;
use thiserror::Error;

use crate::granule::{DateRange, Mission};

/// Errors from the remote catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog request timed out")]
    Timeout,

    #[error("Failed to connect to catalog: {0}")]
    ConnectionFailed(String),

    #[error("Catalog API error: {0}")]
    ApiError(String),

    #[error("Failed to parse catalog response: {0}")]
    ParseError(String),
}

impl CatalogError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Timeout | CatalogError::ConnectionFailed(_))
    }
}

/// Source of download URLs for level-2 granules.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Number of granules the catalog holds for `mission` within `range`.
    async fn count(&self, mission: Mission, range: &DateRange) -> Result<u64, CatalogError>;

    /// Download URLs of every granule for `mission` within `range`.
    async fn list_urls(
        &self,
        mission: Mission,
        range: &DateRange,
    ) -> Result<Vec<String>, CatalogError>;
}
