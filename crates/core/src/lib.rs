pub mod backend;
pub mod catalog;
pub mod config;
pub mod download;
pub mod granule;
pub mod layout;
pub mod maintenance;
pub mod processing;
pub mod queue;
pub mod retrieval;
pub mod store;
pub mod testing;
pub mod verify;

pub use backend::{BackendError, ProcessingBackend, SeadasBackend, Stage};
pub use catalog::{CatalogClient, CatalogError, CmrCatalog};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
    SanitizedConfig,
};
pub use download::{DownloadError, DownloadScheduler, DownloadSummary, FsVolumeMeter, VolumeMeter};
pub use granule::{parse_missions, DateRange, GranuleName, GranuleNameError, Level, Mission};
pub use layout::DataLayout;
pub use processing::{ProcessingError, ProcessingScheduler, ProcessingSummary};
pub use queue::{QueueError, QueueRequest, QueueSummary, Queuer};
pub use retrieval::{HttpRetriever, RetrievalError, RetrievalOutcome, Retriever};
pub use store::{
    Derivative, DerivativeStatus, EntityKind, EntityStore, Product, ProductStatus,
    SqliteEntityStore, StoreError, StoreStats,
};
pub use verify::{Verifier, VerifyError, VerifyReport};
