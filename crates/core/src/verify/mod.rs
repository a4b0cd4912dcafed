//! Reconciliation of the store against the data volume.
//!
//! The [`Verifier`] walks the product and derivative trees and brings the
//! store in line with what is actually on disk: unknown files are inserted,
//! stale statuses are corrected, and entities whose file has vanished are
//! downgraded so that they are fetched or produced again. It doubles as the
//! bootstrap for a data volume populated before the store existed.

mod types;
mod verifier;

pub use types::{PassReport, VerifyError, VerifyReport};
pub use verifier::Verifier;
