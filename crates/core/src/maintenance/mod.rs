//! Operator maintenance over date ranges: reprioritizing, deleting, reporting.
//!
//! Products and derivatives are matched on the date in their granule name;
//! entities whose id does not parse never match a range.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::granule::{DateRange, GranuleName};
use crate::store::{
    validate_priority, Derivative, DerivativeFilter, EntityKind, EntityStore, Product,
    ProductFilter, StoreError,
};

fn in_range(id: &str, range: &DateRange) -> bool {
    GranuleName::parse(id).is_ok_and(|name| range.contains(name.date()))
}

fn products_in_range(
    store: &dyn EntityStore,
    range: &DateRange,
) -> Result<Vec<Product>, StoreError> {
    Ok(store
        .list_products(&ProductFilter::new())?
        .into_iter()
        .filter(|p| in_range(&p.id, range))
        .collect())
}

/// Set the priority of every product in `range`, returning how many changed.
pub fn change_priority(
    store: &dyn EntityStore,
    range: &DateRange,
    priority: i64,
) -> Result<u64, StoreError> {
    let priority = validate_priority(priority)?;
    let mut updated = 0;
    for product in products_in_range(store, range)? {
        if product.priority != priority {
            store.update_priority(&product.id, priority)?;
            updated += 1;
        }
    }
    info!(%range, priority, updated, "Priorities updated");
    Ok(updated)
}

/// Outcome of [`delete_products`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub deleted: u64,
    pub files_removed: u64,
}

/// Delete every product in `range`: its file if present, then its row.
/// Derivatives are left in place.
pub fn delete_products(
    store: &dyn EntityStore,
    range: &DateRange,
) -> Result<DeleteSummary, StoreError> {
    let mut summary = DeleteSummary::default();
    for product in products_in_range(store, range)? {
        if let Some(path) = product.location.as_deref().filter(|p| p.is_file()) {
            match std::fs::remove_file(path) {
                Ok(()) => summary.files_removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove product file"),
            }
        }
        store.delete(EntityKind::Product, &product.id)?;
        summary.deleted += 1;
    }
    info!(%range, deleted = summary.deleted, files_removed = summary.files_removed, "Products deleted");
    Ok(summary)
}

/// One line of [`report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub id: String,
    pub status: String,
    pub location: Option<PathBuf>,
}

impl From<Derivative> for ReportEntry {
    fn from(d: Derivative) -> Self {
        Self {
            id: d.id,
            status: d.status.to_string(),
            location: d.location,
        }
    }
}

/// Derivatives in `range`, ordered by id.
pub fn report(store: &dyn EntityStore, range: &DateRange) -> Result<Vec<ReportEntry>, StoreError> {
    Ok(store
        .list_derivatives(&DerivativeFilter::new())?
        .into_iter()
        .filter(|d| in_range(&d.id, range))
        .map(ReportEntry::from)
        .collect())
}
