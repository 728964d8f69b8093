//! Station import error types.

use std::path::PathBuf;

use crate::mapper::MapperError;

/// Errors reading a station snapshot or importing it.
#[derive(Debug, thiserror::Error)]
pub enum StationError {
    /// Snapshot file could not be read or written
    #[error("snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot contents are not valid JSON of the expected shape
    #[error("snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// System clock is before the unix epoch
    #[error("system time before unix epoch")]
    Clock,

    /// Writing stations to the store failed
    #[error(transparent)]
    Mapper(#[from] MapperError),
}
