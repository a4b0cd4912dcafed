//! Retrieval of individual granule files.

mod error;
mod http;
mod traits;

pub use error::RetrievalError;
pub use http::HttpRetriever;
pub use traits::{RetrievalOutcome, Retriever};
