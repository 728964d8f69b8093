//! Stations and their alternate keys.

use crate::domain::{Crs, parse_column};
use crate::driver::{DriverError, Row, Value};
use crate::entity::{ChangeState, Entity, EntityState, TableDef, UpdatableEntity};
use crate::mapper::AlternateKey;
use crate::stations::normalize_name;

/// A station row.
#[derive(Debug, Clone)]
pub struct Station {
    state: EntityState<i64>,
    changes: ChangeState,
    crs: Option<Crs>,
    name: String,
    search_name: String,
}

impl Station {
    /// A station that has not been stored yet.
    pub fn new(crs: Crs, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            state: EntityState::new(),
            changes: ChangeState::dirty(),
            crs: Some(crs),
            search_name: normalize_name(&name),
            name,
        }
    }

    /// CRS code. `None` only before the station is loaded.
    pub fn crs(&self) -> Option<Crs> {
        self.crs
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalised name used for lookups by name.
    pub fn search_name(&self) -> &str {
        &self.search_name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name != self.name {
            self.search_name = normalize_name(&name);
            self.name = name;
            self.on_change();
        }
    }
}

impl Entity for Station {
    type Key = i64;

    const TABLE: TableDef = TableDef {
        name: "station",
        key_column: "id",
        columns: &["crs", "name", "search_name"],
        upsert_key: &["crs"],
    };

    fn placeholder(key: i64) -> Self {
        Self {
            state: EntityState::placeholder(key),
            changes: ChangeState::default(),
            crs: None,
            name: String::new(),
            search_name: String::new(),
        }
    }

    fn state(&self) -> &EntityState<i64> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState<i64> {
        &mut self.state
    }

    fn read_row(&mut self, row: &Row) -> Result<(), DriverError> {
        self.crs = Some(parse_column(row, "crs", Crs::parse)?);
        self.name = row.get_string("name")?;
        self.search_name = row.get_string("search_name")?;
        Ok(())
    }
}

impl UpdatableEntity for Station {
    fn changes(&self) -> &ChangeState {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeState {
        &mut self.changes
    }

    fn fill_from(&mut self, other: &Self) {
        self.state.copy_from(&other.state);
        self.crs = other.crs;
        self.name = other.name.clone();
        self.search_name = other.search_name.clone();
    }

    fn write_values(&self) -> Vec<Value> {
        vec![
            self.crs.into(),
            self.name.as_str().into(),
            self.search_name.as_str().into(),
        ]
    }
}

/// Stations by CRS code.
pub struct StationByCrs;

impl AlternateKey<Station> for StationByCrs {
    type Key = Crs;
    const CACHE_NAME: &'static str = "station_by_crs";
    const COLUMN: &'static str = "crs";

    fn key_of(station: &Station) -> Option<Crs> {
        station.crs
    }

    fn read_key(row: &Row) -> Result<Crs, DriverError> {
        parse_column(row, "crs", Crs::parse)
    }

    fn to_value(key: &Crs) -> Value {
        (*key).into()
    }
}

/// Stations by normalised name. Look up with [`normalize_name`] applied.
pub struct StationByName;

impl AlternateKey<Station> for StationByName {
    type Key = String;
    const CACHE_NAME: &'static str = "station_by_name";
    const COLUMN: &'static str = "search_name";

    fn key_of(station: &Station) -> Option<String> {
        Some(station.search_name.clone()).filter(|name| !name.is_empty())
    }

    fn read_key(row: &Row) -> Result<String, DriverError> {
        row.get_string("search_name")
    }

    fn to_value(key: &String) -> Value {
        key.as_str().into()
    }
}
