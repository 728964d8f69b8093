//! The rail network model: stations, trains and their stops.
//!
//! [`Network`] bundles a mapper per table plus the selectors the rest of
//! the backend needs, all sharing one connection. Station lookups by CRS
//! and by name share the station identity cache, and stop collections
//! share the stop identity cache, so any two paths to the same row yield
//! the same instance.

mod station;
mod stop;
mod train;


use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::debug;

use crate::config::StoreConfig;
use crate::domain::Crs;
use crate::driver::{Command, Connection, DriverError, MemoryConnection, Row, TableSpec, Value};
use crate::entity::{Entity, EntityCollection, Shared};
use crate::mapper::{ArbitrarySelector, EntityMapper, MapperError, MultiSelector, SelectStrategy, Selector};
use crate::query::{Filter, Update};
use crate::stations::normalize_name;

pub use station::{Station, StationByCrs, StationByName};
pub use stop::{MaxStopOrdinal, Stop, StopsByTrain, TrainStops};
pub use train::Train;

/// Mappers and selectors over one connection.
pub struct Network {
    conn: Rc<dyn Connection>,
    strategy: SelectStrategy,
    pub stations: EntityMapper<Station>,
    pub stations_by_crs: Selector<StationByCrs, Station>,
    pub stations_by_name: Selector<StationByName, Station>,
    pub trains: EntityMapper<Train>,
    pub stops: EntityMapper<Stop>,
    pub stops_by_train: MultiSelector<StopsByTrain, Stop, TrainStops>,
    pub max_ordinal: ArbitrarySelector<MaxStopOrdinal>,
}

impl Network {
    pub fn new(conn: Rc<dyn Connection>, config: &StoreConfig) -> Result<Self, MapperError> {
        let stations = EntityMapper::new(Rc::clone(&conn)).prepared(config.prepared);
        let stations_by_crs = Selector::new(&stations)?;
        let stations_by_name = Selector::new(&stations)?;
        let stops = EntityMapper::new(Rc::clone(&conn)).prepared(config.prepared);
        let stops_by_train = MultiSelector::new(&stops);
        Ok(Self {
            strategy: config.select_strategy,
            trains: EntityMapper::new(Rc::clone(&conn)).prepared(config.prepared),
            max_ordinal: ArbitrarySelector::new(Rc::clone(&conn)).prepared(config.prepared),
            stations,
            stations_by_crs,
            stations_by_name,
            stops,
            stops_by_train,
            conn,
        })
    }

    pub fn station(&mut self, crs: Crs) -> Result<Option<Shared<Station>>, MapperError> {
        self.stations_by_crs.get_by_key(crs, false)
    }

    /// Station by name, compared after [`normalize_name`].
    pub fn station_named(&mut self, name: &str) -> Result<Option<Shared<Station>>, MapperError> {
        self.stations_by_name.get_by_key(normalize_name(name), false)
    }

    /// Stops of a train in calling order.
    pub fn stops_of(&mut self, train_id: i64) -> Result<Shared<TrainStops>, MapperError> {
        self.stops_by_train.get_by_key(train_id, false)
    }

    /// Trains and their stops in two round trips, whatever the number of
    /// trains. Unknown ids yield unfilled trains with empty stop lists.
    ///
    /// Both select sessions are closed before any error is returned.
    pub fn load_trains(
        &mut self,
        train_ids: &[i64],
    ) -> Result<Vec<(Shared<Train>, Shared<TrainStops>)>, MapperError> {
        self.trains.begin_select(self.strategy)?;
        if let Err(err) = self.stops_by_train.begin_select(self.strategy) {
            // Nothing is registered yet, so this issues no query
            self.trains.end_select()?;
            return Err(err);
        }

        let registered = self.register_trains(train_ids);
        let trains = self.trains.end_select();
        let stops = self.stops_by_train.end_select();
        let loaded = registered?;
        trains?;
        stops?;
        Ok(loaded)
    }

    fn register_trains(
        &mut self,
        train_ids: &[i64],
    ) -> Result<Vec<(Shared<Train>, Shared<TrainStops>)>, MapperError> {
        let mut registered = Vec::with_capacity(train_ids.len());
        for &id in train_ids {
            let train = self.trains.get_by_key(id, true)?;
            let stops = self.stops_by_train.get_by_key(id, true)?;
            registered.push((train, stops));
        }
        Ok(registered)
    }

    /// Append stops to the end of their trains.
    ///
    /// The current last ordinal of every train involved is read with one
    /// aggregate query; each stop is numbered after it in the order given
    /// and all stops are saved with one upsert. Cached stop collections
    /// of those trains are extended in place.
    pub fn append_stops(&mut self, stops: Vec<Stop>) -> Result<Vec<Shared<Stop>>, MapperError> {
        if stops.is_empty() {
            return Ok(Vec::new());
        }
        let mut train_ids: Vec<i64> = stops.iter().map(Stop::train_id).collect();
        train_ids.sort_unstable();
        train_ids.dedup();

        self.max_ordinal.begin_select(self.strategy)?;
        let mut holders = Vec::with_capacity(train_ids.len());
        for &id in &train_ids {
            holders.push(self.max_ordinal.get_by_key(id, true)?);
        }
        self.max_ordinal.end_select()?;

        let mut next: HashMap<i64, i32> = holders
            .iter()
            .map(|holder| {
                let holder = holder.borrow();
                (*holder.key(), holder.value().map_or(1, |last| last + 1))
            })
            .collect();

        let mut saved = Vec::with_capacity(stops.len());
        for mut stop in stops {
            let ordinal = next.entry(stop.train_id()).or_insert(1);
            stop.set_ordinal(*ordinal);
            *ordinal += 1;
            saved.push(self.stops.track(stop)?);
        }

        self.stops.begin_update()?;
        for stop in &saved {
            self.stops.update(stop)?;
        }
        self.stops.end_update()?;

        for holder in &holders {
            let mut holder = holder.borrow_mut();
            if let Some(&after) = next.get(holder.key()) {
                holder.set(after - 1);
            }
        }
        for stop in &saved {
            let train_id = stop.borrow().train_id();
            let Some(collection) = self.stops_by_train.get_cached(&train_id) else {
                continue;
            };
            let filled = collection.borrow().is_filled();
            if filled {
                collection.borrow_mut().push(Rc::clone(stop))?;
            }
        }
        debug!(stops = saved.len(), trains = train_ids.len(), "appended stops");
        Ok(saved)
    }

    /// Mark every stop of a train cancelled and reload its stops.
    pub fn cancel_train(&mut self, train_id: i64) -> Result<Shared<TrainStops>, MapperError> {
        let stmt = Update::table(Stop::TABLE.name)
            .set("cancelled")
            .where_eq("train_id")
            .build();
        let command = stmt.command(
            &*self.conn,
            self.stops.is_prepared(),
            [Value::Bool(true), Value::Int(train_id)],
        )?;
        let affected = self.conn.execute_non_query(&command)?;
        debug!(train_id, affected, "cancelled train");
        self.stops_by_train.get_by_key(train_id, true)
    }

    /// Write every changed station, train and stop. Returns the number of
    /// records written.
    pub fn save(&mut self) -> Result<usize, MapperError> {
        Ok(self.stations.update_save_cache()?
            + self.trains.update_save_cache()?
            + self.stops.update_save_cache()?)
    }
}

/// An in-memory connection with the network tables created.
pub fn memory_store() -> Result<Rc<MemoryConnection>, DriverError> {
    let conn = MemoryConnection::new();
    conn.create_table(
        Station::TABLE.name,
        TableSpec::new("id").serial().unique(Station::TABLE.upsert_key),
    );
    conn.create_table(
        Train::TABLE.name,
        TableSpec::new("id").serial().unique(Train::TABLE.upsert_key),
    );
    conn.create_table(
        Stop::TABLE.name,
        TableSpec::new("id").serial().unique(Stop::TABLE.upsert_key),
    );
    conn.set_query_handler(Stop::TABLE.name, Box::new(max_ordinal))?;
    Ok(Rc::new(conn))
}

/// Evaluates [`MaxStopOrdinal`] statements for the in-memory driver.
fn max_ordinal(command: &Command, rows: &[Row]) -> Option<Vec<Row>> {
    if !command.sql().contains("MAX(") {
        return None;
    }
    let wanted: Vec<&Value> = command
        .parameters()
        .iter()
        .filter(|(name, _)| name.starts_with("train_id"))
        .map(|(_, value)| value)
        .collect();

    let mut max: BTreeMap<i64, i32> = BTreeMap::new();
    for row in rows {
        let (Ok(train), Ok(ordinal)) = (row.get_i64("train_id"), row.get_i32("ordinal")) else {
            continue;
        };
        if !wanted.is_empty() && !wanted.contains(&&Value::Int(train)) {
            continue;
        }
        let entry = max.entry(train).or_insert(ordinal);
        *entry = (*entry).max(ordinal);
    }
    Some(
        max.into_iter()
            .map(|(train, ordinal)| Row::new().with("train_id", train).with("max_ordinal", ordinal))
            .collect(),
    )
}
