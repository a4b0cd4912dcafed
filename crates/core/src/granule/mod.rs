//! Granule file names.
//!
//! Ocean color granules encode their identity in a dotted positional name:
//!
//! ```text
//! AQUA_MODIS.20230101T003001.L2.OC.nc
//! AQUA_MODIS.20230101.L3m.DAY.OC.1km.nc
//! ```
//!
//! The file name is the natural key of every stored entity, so parsing is
//! pure and total: anything outside the grammar is a [`GranuleNameError`].

mod mission;
mod name;
mod range;

pub use mission::{parse_missions, Mission};
pub use name::{GranuleName, GranuleNameError, Level};
pub use range::{DateRange, InvalidDateRange};
