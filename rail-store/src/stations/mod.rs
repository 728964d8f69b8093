//! Station feed snapshot and import.
//!
//! The station feed is kept as a JSON snapshot on disk and refreshed when
//! it expires. [`import_stations`] upserts it into the station table.

mod error;
mod import;
mod names;
mod snapshot;

pub use error::StationError;
pub use import::{ImportReport, import_stations};
pub use names::normalize_name;
pub use snapshot::{StationRecord, StationSnapshot};
