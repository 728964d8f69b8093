//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::mapper::SelectStrategy;

/// Default snapshot TTL: 24 hours.
const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors reading configuration from the environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a number: {value:?}")]
    NotANumber { name: &'static str, value: String },

    #[error("{name} is not a boolean: {value:?}")]
    NotABool { name: &'static str, value: String },
}

/// Runtime settings for a store and its station import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path of the station snapshot file.
    pub snapshot_path: PathBuf,
    /// How long a snapshot stays valid.
    pub snapshot_ttl: Duration,
    /// Strategy used by batch loads that do not choose one explicitly.
    pub select_strategy: SelectStrategy,
    /// Ask the driver to prepare every command.
    pub prepared: bool,
}

impl StoreConfig {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            ..Self::default()
        }
    }

    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    pub fn with_select_strategy(mut self, strategy: SelectStrategy) -> Self {
        self.select_strategy = strategy;
        self
    }

    pub fn with_prepared(mut self, prepared: bool) -> Self {
        self.prepared = prepared;
        self
    }

    /// Read overrides from the process environment.
    ///
    /// - `RAIL_STORE_SNAPSHOT`: snapshot path
    /// - `RAIL_STORE_SNAPSHOT_TTL_SECS`: snapshot TTL in seconds
    /// - `RAIL_STORE_SELECT_ALL`: use full scans for batch loads
    /// - `RAIL_STORE_PREPARED`: prepare commands
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = lookup("RAIL_STORE_SNAPSHOT") {
            config.snapshot_path = path.into();
        }
        if let Some(value) = lookup("RAIL_STORE_SNAPSHOT_TTL_SECS") {
            let secs = value.trim().parse().map_err(|_| ConfigError::NotANumber {
                name: "RAIL_STORE_SNAPSHOT_TTL_SECS",
                value: value.clone(),
            })?;
            config.snapshot_ttl = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("RAIL_STORE_SELECT_ALL")
            && parse_bool("RAIL_STORE_SELECT_ALL", &value)?
        {
            config.select_strategy = SelectStrategy::All;
        }
        if let Some(value) = lookup("RAIL_STORE_PREPARED") {
            config.prepared = parse_bool("RAIL_STORE_PREPARED", &value)?;
        }
        Ok(config)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("stations_snapshot.json"),
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
            select_strategy: SelectStrategy::MultiKey,
            prepared: false,
        }
    }
}

/// Install the global `fmt` subscriber.
///
/// Respects `RUST_LOG`, defaulting to `info`. Call once at the start of
/// `main`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::NotABool {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.snapshot_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn environment_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("RAIL_STORE_SNAPSHOT", "/tmp/stations.json"),
            ("RAIL_STORE_SNAPSHOT_TTL_SECS", "60"),
            ("RAIL_STORE_SELECT_ALL", "yes"),
            ("RAIL_STORE_PREPARED", "1"),
        ]))
        .unwrap();

        assert_eq!(config.snapshot_path, PathBuf::from("/tmp/stations.json"));
        assert_eq!(config.snapshot_ttl, Duration::from_secs(60));
        assert_eq!(config.select_strategy, SelectStrategy::All);
        assert!(config.prepared);
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = StoreConfig::from_lookup(lookup(&[("RAIL_STORE_SNAPSHOT_TTL_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { .. }));

        let err = StoreConfig::from_lookup(lookup(&[("RAIL_STORE_PREPARED", "maybe")])).unwrap_err();
        assert_eq!(err.to_string(), "RAIL_STORE_PREPARED is not a boolean: \"maybe\"");
    }

    #[test]
    fn builders() {
        let config = StoreConfig::new("snap.json")
            .with_snapshot_ttl(Duration::from_secs(5))
            .with_select_strategy(SelectStrategy::All)
            .with_prepared(true);
        assert_eq!(config.snapshot_path, PathBuf::from("snap.json"));
        assert!(config.prepared);
    }
}
