//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam of the pipeline, so the schedulers and the
//! verifier can be exercised without network access or SeaDAS binaries.
//!
//! # Example
//!
//! ```rust,ignore
//! use obflow_core::testing::{fixtures, MockBackend, MockRetriever};
//!
//! let retriever = MockRetriever::new();
//! let backend = MockBackend::new();
//!
//! let id = fixtures::l2_name("AQUA_MODIS", "20230101T003001");
//! backend.fail_target(&fixtures::target_of(&id)).await;
//! ```

mod mock_backend;
mod mock_catalog;
mod mock_retriever;

pub use mock_backend::{BackendCall, MockBackend};
pub use mock_catalog::MockCatalog;
pub use mock_retriever::{MockRetriever, MockVolumeMeter, RecordedRequest};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::granule::GranuleName;

    /// Resolution used by every fixture target.
    pub const RESOLUTION: &str = "1km";

    /// A level-2 ocean color granule name, e.g. `AQUA_MODIS.20230101T003001.L2.OC.nc`.
    pub fn l2_name(platform: &str, datetime: &str) -> String {
        format!("{}.{}.L2.OC.nc", platform, datetime)
    }

    /// OB.DAAC download URL of a granule.
    pub fn download_url(id: &str) -> String {
        format!("https://oceandata.sci.gsfc.nasa.gov/ob/getfile/{}", id)
    }

    /// Daily mapped target of a level-2 granule at [`RESOLUTION`].
    pub fn target_of(id: &str) -> String {
        GranuleName::parse(id)
            .ok()
            .and_then(|name| name.target_name(RESOLUTION))
            .unwrap_or_else(|| panic!("fixture {} is not a level-2 granule name", id))
    }
}
