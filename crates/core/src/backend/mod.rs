//! External processing toolchain.
//!
//! Turning a day of level-2 swaths into a mapped level-3 product takes two
//! stages: binning (`l2bin`) then mapping (`l3mapgen`).

mod error;
mod seadas;
mod traits;

pub use error::BackendError;
pub use seadas::SeadasBackend;
pub use traits::{ProcessingBackend, Stage};
