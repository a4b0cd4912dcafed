//! Remote granule catalog.
//!
//! Discovery of level-2 granules available for a mission over a date range.
//! [`CmrCatalog`] talks to NASA's Common Metadata Repository.

mod cmr;
mod types;

pub use cmr::CmrCatalog;
pub use types::{CatalogClient, CatalogError};
