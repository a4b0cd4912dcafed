//! Entity store trait and error type.

use std::path::Path;

use thiserror::Error;

use super::types::{
    Derivative, DerivativeFilter, DerivativeStatus, EntityKind, NewDerivative, NewProduct,
    Product, ProductFilter, ProductStatus, StoreStats, HIGHEST_PRIORITY, LOWEST_PRIORITY,
};

/// Errors raised by the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("invalid priority {0}: must be between 1 and 5")]
    InvalidPriority(i64),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("store connection lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn already_exists(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.into(),
        }
    }
}

/// Check that a priority lies in the accepted 1..=5 range.
pub fn validate_priority(priority: i64) -> Result<u8, StoreError> {
    if (HIGHEST_PRIORITY as i64..=LOWEST_PRIORITY as i64).contains(&priority) {
        Ok(priority as u8)
    } else {
        Err(StoreError::InvalidPriority(priority))
    }
}

/// Persistent store of products and derivatives.
///
/// Every multi-statement write is a single transaction. Implementations must
/// serialize writers so that status and priority updates are never lost.
pub trait EntityStore: Send + Sync {
    /// Create a product, creating its target derivative as Pending in the
    /// same transaction when it does not exist yet.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the product is known.
    fn create_product(&self, product: NewProduct) -> Result<Product, StoreError>;

    /// Create a derivative with no products attached.
    fn create_derivative(&self, derivative: NewDerivative) -> Result<Derivative, StoreError>;

    fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError>;

    fn get_derivative(&self, id: &str) -> Result<Option<Derivative>, StoreError>;

    fn exists(&self, kind: EntityKind, id: &str) -> Result<bool, StoreError>;

    /// Whether the entity exists with a status above its lowest one.
    fn exists_on_disk(&self, kind: EntityKind, id: &str) -> Result<bool, StoreError>;

    /// Products matching `filter`, ascending priority then id.
    fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    /// Derivatives matching `filter`, ordered by id.
    fn list_derivatives(&self, filter: &DerivativeFilter) -> Result<Vec<Derivative>, StoreError>;

    /// Up to `limit` Queued products with a download URL, ascending priority then id.
    fn ready_for_download(&self, limit: u32) -> Result<Vec<Product>, StoreError>;

    /// Products whose target is still Pending, ordered by (target, priority, id).
    fn grouping_candidates(&self) -> Result<Vec<Product>, StoreError>;

    /// Record a successful download.
    fn mark_retrieved(&self, id: &str, location: &Path) -> Result<(), StoreError>;

    /// Record a successful processing task: every product becomes Consumed and
    /// the target becomes Available at `location`, atomically.
    fn complete_task(
        &self,
        product_ids: &[String],
        target: &str,
        location: &Path,
    ) -> Result<(), StoreError>;

    fn update_product_status(
        &self,
        id: &str,
        status: ProductStatus,
        location: Option<&Path>,
    ) -> Result<(), StoreError>;

    fn update_derivative_status(
        &self,
        id: &str,
        status: DerivativeStatus,
        location: Option<&Path>,
    ) -> Result<(), StoreError>;

    fn update_priority(&self, id: &str, priority: u8) -> Result<(), StoreError>;

    /// Give a product without a download URL one, returning whether it was
    /// set. Products that already have a URL keep it.
    fn attach_download_url(&self, id: &str, url: &str) -> Result<bool, StoreError>;

    fn mark_verified(&self, kind: EntityKind, id: &str) -> Result<(), StoreError>;

    /// Clear every verified flag of `kind`, returning the number cleared.
    fn reset_verified(&self, kind: EntityKind) -> Result<u64, StoreError>;

    /// Ids of unverified entities whose status claims the file is on disk
    /// (Retrieved products, Available derivatives).
    fn unverified_on_disk(&self, kind: EntityKind) -> Result<Vec<String>, StoreError>;

    fn delete(&self, kind: EntityKind, id: &str) -> Result<(), StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;
}
