//! Filesystem to store reconciliation passes.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::granule::{GranuleName, Level};
use crate::layout::{enumerate_files, DataLayout, DiscoveredFile};
use crate::store::{
    DerivativeStatus, EntityKind, EntityStore, NewDerivative, NewProduct, ProductFilter,
    ProductStatus,
};

use super::types::{PassReport, VerifyError, VerifyReport};

/// Reconciles the store with the data volume.
///
/// Must not run concurrently with downloading or processing.
pub struct Verifier {
    store: Arc<dyn EntityStore>,
    layout: DataLayout,
    resolution: String,
}

impl Verifier {
    /// `resolution` names the targets of products discovered on disk.
    pub fn new(
        store: Arc<dyn EntityStore>,
        layout: DataLayout,
        resolution: impl Into<String>,
    ) -> Self {
        Self {
            store,
            layout,
            resolution: resolution.into(),
        }
    }

    /// Run the derivative pass, then the product pass, then collect leftovers.
    ///
    /// Derivatives go first so that products found on disk can be inserted as
    /// Consumed when their target already exists.
    pub fn run(&self, purge_leftovers: bool) -> Result<VerifyReport, VerifyError> {
        info!(root = %self.layout.root().display(), "Verification started");

        let derivatives = self.verify_derivatives()?;
        let products = self.verify_products()?;
        let leftovers = self.find_leftovers()?;
        let purged = if purge_leftovers {
            self.purge(&leftovers)
        } else {
            0
        };

        let report = VerifyReport {
            derivatives,
            products,
            leftovers,
            purged,
        };
        info!(
            changes = report.changes(),
            leftovers = report.leftovers.len(),
            purged = report.purged,
            "Verification complete"
        );
        Ok(report)
    }

    pub fn verify_derivatives(&self) -> Result<PassReport, VerifyError> {
        let mut report = PassReport::new(EntityKind::Derivative);

        for file in self.scan(EntityKind::Derivative)? {
            report.scanned += 1;
            match GranuleName::parse(&file.id) {
                Ok(name) if name.level() == Level::L3Mapped => {}
                Ok(name) => {
                    warn!(file = %file.path.display(), level = %name.level(), "Skipping non-mapped file");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(file = %file.path.display(), error = %e, "Skipping unrecognized file");
                    report.skipped += 1;
                    continue;
                }
            }

            match self.store.get_derivative(&file.id)? {
                None => {
                    warn!(derivative = %file.id, "Derivative on disk but not in store, inserting");
                    self.store
                        .create_derivative(NewDerivative::available(&file.id, &file.path))?;
                    report.inserted += 1;
                }
                Some(existing)
                    if !existing.status.is_on_disk()
                        || existing.location.as_deref() != Some(file.path.as_path()) =>
                {
                    warn!(
                        derivative = %file.id,
                        recorded = %existing.status,
                        "Derivative record out of date, correcting"
                    );
                    self.store.update_derivative_status(
                        &file.id,
                        DerivativeStatus::Available,
                        Some(&file.path),
                    )?;
                    report.corrected += 1;
                }
                Some(_) => {}
            }
            self.store.mark_verified(EntityKind::Derivative, &file.id)?;
        }

        for id in self.store.unverified_on_disk(EntityKind::Derivative)? {
            warn!(derivative = %id, "Derivative file missing, downgrading to pending");
            self.store
                .update_derivative_status(&id, DerivativeStatus::Pending, None)?;
            report.downgraded += 1;
        }

        self.store.reset_verified(EntityKind::Derivative)?;
        debug!(?report, "Derivative pass done");
        Ok(report)
    }

    pub fn verify_products(&self) -> Result<PassReport, VerifyError> {
        let mut report = PassReport::new(EntityKind::Product);

        for file in self.scan(EntityKind::Product)? {
            report.scanned += 1;
            let target = match GranuleName::parse(&file.id) {
                Ok(name) => match name.target_name(&self.resolution) {
                    Some(target) => target,
                    None => {
                        warn!(file = %file.path.display(), level = %name.level(), "Skipping non level-2 file");
                        report.skipped += 1;
                        continue;
                    }
                },
                Err(e) => {
                    warn!(file = %file.path.display(), error = %e, "Skipping unrecognized file");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.store.get_product(&file.id)? {
                None => {
                    let status = self.discovered_status(&target)?;
                    warn!(
                        product = %file.id,
                        %status,
                        "Product on disk but not in store, inserting"
                    );
                    self.store.create_product(NewProduct::discovered(
                        &file.id, &file.path, target, status,
                    ))?;
                    report.inserted += 1;
                }
                Some(existing) if !existing.status.is_on_disk() => {
                    warn!(product = %file.id, "Queued product already on disk, marking retrieved");
                    self.store.update_product_status(
                        &file.id,
                        ProductStatus::Retrieved,
                        Some(&file.path),
                    )?;
                    report.corrected += 1;
                }
                Some(existing) if existing.location.as_deref() != Some(file.path.as_path()) => {
                    warn!(product = %file.id, "Product moved, correcting location");
                    self.store
                        .update_product_status(&file.id, existing.status, Some(&file.path))?;
                    report.corrected += 1;
                }
                Some(_) => {}
            }
            self.store.mark_verified(EntityKind::Product, &file.id)?;
        }

        for id in self.store.unverified_on_disk(EntityKind::Product)? {
            let downloadable = self
                .store
                .get_product(&id)?
                .is_some_and(|p| p.download_url.is_some());
            if downloadable {
                warn!(product = %id, "Product file missing, downgrading to queued");
            } else {
                warn!(
                    product = %id,
                    "Product file missing and no download URL is known, queue its date range again to restore it"
                );
                report.unrecoverable += 1;
            }
            self.store
                .update_product_status(&id, ProductStatus::Queued, None)?;
            report.downgraded += 1;
        }

        self.store.reset_verified(EntityKind::Product)?;
        debug!(?report, "Product pass done");
        Ok(report)
    }

    /// Source files of Consumed products that are still on disk.
    pub fn find_leftovers(&self) -> Result<Vec<PathBuf>, VerifyError> {
        let consumed = self
            .store
            .list_products(&ProductFilter::new().with_status(ProductStatus::Consumed))?;
        Ok(consumed
            .into_iter()
            .filter_map(|p| p.location)
            .filter(|path| path.is_file())
            .collect())
    }

    /// Delete leftover files, returning how many were removed.
    pub fn purge(&self, leftovers: &[PathBuf]) -> u64 {
        let mut purged = 0;
        for path in leftovers {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed leftover");
                    purged += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove leftover"),
            }
        }
        purged
    }

    fn scan(&self, kind: EntityKind) -> Result<Vec<DiscoveredFile>, VerifyError> {
        let root = self.layout.kind_root(kind);
        enumerate_files(&root).map_err(|source| VerifyError::Scan {
            root: root.clone(),
            source,
        })
    }

    /// Status for a product found on disk: already consumed when its target exists.
    fn discovered_status(&self, target: &str) -> Result<ProductStatus, VerifyError> {
        let available = self
            .store
            .get_derivative(target)?
            .is_some_and(|d| d.status == DerivativeStatus::Available);
        Ok(if available {
            ProductStatus::Consumed
        } else {
            ProductStatus::Retrieved
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteEntityStore;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    struct Harness {
        store: Arc<SqliteEntityStore>,
        layout: DataLayout,
        _temp: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            Self {
                store: Arc::new(SqliteEntityStore::in_memory().unwrap()),
                layout: DataLayout::new(temp.path()),
                _temp: temp,
            }
        }

        fn verifier(&self) -> Verifier {
            Verifier::new(self.store.clone(), self.layout.clone(), fixtures::RESOLUTION)
        }

        fn put(&self, kind: EntityKind, id: &str) -> PathBuf {
            let path = self.layout.path_for(kind, &GranuleName::parse(id).unwrap());
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, id.as_bytes()).unwrap();
            path
        }

        fn queue(&self, id: &str) {
            self.store
                .create_product(NewProduct::queued(
                    id,
                    fixtures::download_url(id),
                    fixtures::target_of(id),
                    2,
                ))
                .unwrap();
        }

        fn product(&self, id: &str) -> crate::store::Product {
            self.store.get_product(id).unwrap().unwrap()
        }
    }

    #[test]
    fn test_bootstrap_from_disk() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        let b = fixtures::l2_name("SNPP_VIIRS", "20230102T000000");
        let path_a = h.put(EntityKind::Product, &a);
        h.put(EntityKind::Product, &b);
        let done = fixtures::target_of(&b);
        h.put(EntityKind::Derivative, &done);

        let report = h.verifier().run(false).unwrap();
        assert_eq!(report.derivatives.inserted, 1);
        assert_eq!(report.products.inserted, 2);

        let product = h.product(&a);
        assert_eq!(product.status, ProductStatus::Retrieved);
        assert_eq!(product.location, Some(path_a));
        assert_eq!(product.priority, crate::store::DISCOVERED_PRIORITY);
        assert!(product.download_url.is_none());
        assert!(!product.verified);

        assert_eq!(h.product(&b).status, ProductStatus::Consumed);
        let derivative = h.store.get_derivative(&done).unwrap().unwrap();
        assert_eq!(derivative.status, DerivativeStatus::Available);

        // b's source file is a leftover of an already produced target.
        assert_eq!(report.leftovers.len(), 1);
        assert_eq!(report.purged, 0);
    }

    #[test]
    fn test_queued_file_on_disk_is_corrected() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        h.queue(&a);
        let path = h.put(EntityKind::Product, &a);

        let report = h.verifier().verify_products().unwrap();
        assert_eq!(report.corrected, 1);
        let product = h.product(&a);
        assert_eq!(product.status, ProductStatus::Retrieved);
        assert_eq!(product.location, Some(path));
        assert_eq!(product.priority, 2);
    }

    #[test]
    fn test_missing_files_are_downgraded() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        h.queue(&a);
        let path = h.put(EntityKind::Product, &a);
        h.store.mark_retrieved(&a, &path).unwrap();
        let target = fixtures::target_of(&a);
        h.store
            .update_derivative_status(
                &target,
                DerivativeStatus::Available,
                Some(&h.layout.root().join("gone.nc")),
            )
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        let report = h.verifier().run(false).unwrap();
        assert_eq!(report.products.downgraded, 1);
        assert_eq!(report.derivatives.downgraded, 1);
        assert_eq!(h.product(&a).status, ProductStatus::Queued);
        assert_eq!(
            h.store.get_derivative(&target).unwrap().unwrap().status,
            DerivativeStatus::Pending
        );
    }

    #[test]
    fn test_lost_discovered_product_is_unrecoverable() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        let b = fixtures::l2_name("AQUA_MODIS", "20230101T010000");
        h.put(EntityKind::Product, &a);
        h.queue(&b);
        let path_b = h.put(EntityKind::Product, &b);
        h.store.mark_retrieved(&b, &path_b).unwrap();
        h.verifier().run(false).unwrap();

        for id in [&a, &b] {
            let path = h.layout.path_for(EntityKind::Product, &GranuleName::parse(id).unwrap());
            std::fs::remove_file(path).unwrap();
        }
        let report = h.verifier().verify_products().unwrap();
        assert_eq!(report.downgraded, 2);
        assert_eq!(report.unrecoverable, 1);
        assert_eq!(h.product(&a).status, ProductStatus::Queued);
        assert!(h.product(&a).download_url.is_none());
        assert_eq!(h.product(&b).status, ProductStatus::Queued);
    }

    #[test]
    fn test_consumed_product_without_file_is_left_alone() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        h.queue(&a);
        let target = fixtures::target_of(&a);
        let source = h.layout.path_for(EntityKind::Product, &GranuleName::parse(&a).unwrap());
        h.store.mark_retrieved(&a, &source).unwrap();
        let output = h.put(EntityKind::Derivative, &target);
        h.store
            .complete_task(&[a.clone()], &target, &output)
            .unwrap();

        let report = h.verifier().run(false).unwrap();
        assert_eq!(report.changes(), 0);
        assert_eq!(h.product(&a).status, ProductStatus::Consumed);
        assert!(report.leftovers.is_empty());
    }

    #[test]
    fn test_unparseable_files_are_skipped() {
        let h = Harness::new();
        let root = h.layout.kind_root(EntityKind::Product);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("README"), b"x").unwrap();
        std::fs::write(
            root.join("AQUA_MODIS.20230101.L3b.DAY.OC.1km.nc"),
            b"x",
        )
        .unwrap();

        let report = h.verifier().verify_products().unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(h.store.stats().unwrap().products(), 0);
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        let b = fixtures::l2_name("AQUA_MODIS", "20230101T010000");
        h.put(EntityKind::Product, &a);
        h.queue(&b);
        h.put(EntityKind::Derivative, &fixtures::target_of(&fixtures::l2_name(
            "TERRA_MODIS",
            "20230105T000000",
        )));

        let first = h.verifier().run(false).unwrap();
        assert!(first.changes() > 0);
        let before = h.store.list_products(&ProductFilter::new()).unwrap();

        let second = h.verifier().run(false).unwrap();
        assert_eq!(second.changes(), 0);
        assert_eq!(h.store.list_products(&ProductFilter::new()).unwrap(), before);
    }

    #[test]
    fn test_purge_leftovers() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        let source = h.put(EntityKind::Product, &a);
        h.put(EntityKind::Derivative, &fixtures::target_of(&a));

        let report = h.verifier().run(true).unwrap();
        assert_eq!(report.leftovers, vec![source.clone()]);
        assert_eq!(report.purged, 1);
        assert!(!source.exists());
        assert_eq!(h.product(&a).status, ProductStatus::Consumed);
    }
}
