//! On-disk station snapshot with a freshness window.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StoreConfig;

use super::error::StationError;

/// One station of the feed, as published: lowercase or padded CRS codes
/// are normal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    pub crs_code: String,
    pub name: String,
}

impl StationRecord {
    pub fn new(crs_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            crs_code: crs_code.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    /// Unix timestamp when the snapshot was written.
    cached_at_secs: u64,
    stations: Vec<StationRecord>,
}

/// JSON snapshot of the station feed.
#[derive(Debug, Clone)]
pub struct StationSnapshot {
    path: PathBuf,
    ttl: Duration,
}

impl StationSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let defaults = StoreConfig::default();
        Self {
            path: path.into(),
            ttl: defaults.snapshot_ttl,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.snapshot_path).with_ttl(config.snapshot_ttl)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stations from the snapshot, or `None` if there is no snapshot or it
    /// is older than the TTL.
    pub fn load(&self) -> Result<Option<Vec<StationRecord>>, StationError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        let snapshot: SnapshotFile = serde_json::from_str(&contents)?;

        let age_secs = now_secs()?.saturating_sub(snapshot.cached_at_secs);
        if age_secs >= self.ttl.as_secs() {
            debug!(path = %self.path.display(), age_secs, "station snapshot expired");
            return Ok(None);
        }
        Ok(Some(snapshot.stations))
    }

    /// Write `stations` stamped with the current time, creating parent
    /// directories as needed.
    pub fn save(&self, stations: &[StationRecord]) -> Result<(), StationError> {
        let snapshot = SnapshotFile {
            cached_at_secs: now_secs()?,
            stations: stations.to_vec(),
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> StationError {
        StationError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn now_secs() -> Result<u64, StationError> {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| StationError::Clock)
}
