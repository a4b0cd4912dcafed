//! Entity types persisted by the store.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most urgent download priority.
pub const HIGHEST_PRIORITY: u8 = 1;
/// Least urgent download priority.
pub const LOWEST_PRIORITY: u8 = 5;
/// Priority assigned to products found on disk rather than queued.
pub const DISCOVERED_PRIORITY: u8 = 4;

/// The two entity kinds tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Derivative,
}

impl EntityKind {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::Derivative => "derivatives",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Product => f.write_str("product"),
            EntityKind::Derivative => f.write_str("derivative"),
        }
    }
}

/// Lifecycle of a raw level-2 granule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    /// Waiting to be downloaded.
    Queued,
    /// On disk, not yet processed.
    Retrieved,
    /// Processed into its target; the source file may be gone.
    Consumed,
}

impl ProductStatus {
    pub fn code(&self) -> i64 {
        match self {
            ProductStatus::Queued => 0,
            ProductStatus::Retrieved => 1,
            ProductStatus::Consumed => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ProductStatus::Queued),
            1 => Some(ProductStatus::Retrieved),
            2 => Some(ProductStatus::Consumed),
            _ => None,
        }
    }

    /// Whether the recorded status implies the file has reached the disk.
    pub fn is_on_disk(&self) -> bool {
        !matches!(self, ProductStatus::Queued)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Queued => "queued",
            ProductStatus::Retrieved => "retrieved",
            ProductStatus::Consumed => "consumed",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a processed level-3 product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeStatus {
    Pending,
    Available,
}

impl DerivativeStatus {
    pub fn code(&self) -> i64 {
        match self {
            DerivativeStatus::Pending => 0,
            DerivativeStatus::Available => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(DerivativeStatus::Pending),
            1 => Some(DerivativeStatus::Available),
            _ => None,
        }
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self, DerivativeStatus::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DerivativeStatus::Pending => "pending",
            DerivativeStatus::Available => "available",
        }
    }
}

impl fmt::Display for DerivativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw acquired granule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    /// File name, unique among products.
    pub id: String,
    /// Remote URL; absent for products discovered on disk.
    pub download_url: Option<String>,
    /// Full path once the file is on disk.
    pub location: Option<PathBuf>,
    /// Id of the derivative this product is processed into.
    pub target: String,
    pub status: ProductStatus,
    /// 1 (most urgent) to 5 (least urgent).
    pub priority: u8,
    pub created_at: Option<DateTime<Utc>>,
    pub verified: bool,
}

/// A processed product built from all products sharing it as target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Derivative {
    pub id: String,
    pub location: Option<PathBuf>,
    pub status: DerivativeStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub verified: bool,
}

/// Request to create a product (and its target, if missing).
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub id: String,
    pub download_url: Option<String>,
    pub location: Option<PathBuf>,
    pub target: String,
    pub status: ProductStatus,
    pub priority: u8,
}

impl NewProduct {
    /// A product waiting to be downloaded from `download_url`.
    pub fn queued(
        id: impl Into<String>,
        download_url: impl Into<String>,
        target: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            id: id.into(),
            download_url: Some(download_url.into()),
            location: None,
            target: target.into(),
            status: ProductStatus::Queued,
            priority,
        }
    }

    /// A product found on disk at `location`.
    pub fn discovered(
        id: impl Into<String>,
        location: impl Into<PathBuf>,
        target: impl Into<String>,
        status: ProductStatus,
    ) -> Self {
        Self {
            id: id.into(),
            download_url: None,
            location: Some(location.into()),
            target: target.into(),
            status,
            priority: DISCOVERED_PRIORITY,
        }
    }
}

/// Request to create a derivative.
#[derive(Debug, Clone)]
pub struct NewDerivative {
    pub id: String,
    pub location: Option<PathBuf>,
    pub status: DerivativeStatus,
}

impl NewDerivative {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: None,
            status: DerivativeStatus::Pending,
        }
    }

    pub fn available(id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            location: Some(location.into()),
            status: DerivativeStatus::Available,
        }
    }
}

/// Filter for listing products.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub status: Option<ProductStatus>,
    pub target: Option<String>,
    pub priority: Option<u8>,
    pub limit: Option<u32>,
}

impl ProductFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter for listing derivatives.
#[derive(Debug, Clone, Default)]
pub struct DerivativeFilter {
    pub status: Option<DerivativeStatus>,
    pub limit: Option<u32>,
}

impl DerivativeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: DerivativeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Entity counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub queued: u64,
    pub retrieved: u64,
    pub consumed: u64,
    pub pending: u64,
    pub available: u64,
}

impl StoreStats {
    pub fn products(&self) -> u64 {
        self.queued + self.retrieved + self.consumed
    }

    pub fn derivatives(&self) -> u64 {
        self.pending + self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for status in [
            ProductStatus::Queued,
            ProductStatus::Retrieved,
            ProductStatus::Consumed,
        ] {
            assert_eq!(ProductStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ProductStatus::from_code(7), None);
        assert_eq!(DerivativeStatus::from_code(1), Some(DerivativeStatus::Available));
    }

    #[test]
    fn test_on_disk() {
        assert!(!ProductStatus::Queued.is_on_disk());
        assert!(ProductStatus::Retrieved.is_on_disk());
        assert!(ProductStatus::Consumed.is_on_disk());
        assert!(!DerivativeStatus::Pending.is_on_disk());
        assert!(DerivativeStatus::Available.is_on_disk());
    }

    #[test]
    fn test_discovered_product_priority() {
        let product = NewProduct::discovered(
            "AQUA_MODIS.20230101T000000.L2.OC.nc",
            "/data/L2/AQUA_MODIS/OC/AQUA_MODIS.20230101T000000.L2.OC.nc",
            "AQUA_MODIS.20230101.L3m.DAY.OC.1km.nc",
            ProductStatus::Retrieved,
        );
        assert_eq!(product.priority, DISCOVERED_PRIORITY);
        assert!(product.download_url.is_none());
    }
}
