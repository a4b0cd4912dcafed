//! Entity store: the single source of truth for file lifecycle state.

mod sqlite_store;
mod traits;
mod types;

pub use sqlite_store::SqliteEntityStore;
pub use traits::{validate_priority, EntityStore, StoreError};
pub use types::{
    Derivative, DerivativeFilter, DerivativeStatus, EntityKind, NewDerivative, NewProduct,
    Product, ProductFilter, ProductStatus, StoreStats, DISCOVERED_PRIORITY, HIGHEST_PRIORITY,
    LOWEST_PRIORITY,
};
