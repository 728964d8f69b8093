//! Calling points of a train.

use chrono::NaiveDateTime;

use crate::driver::{DriverError, Row, Value};
use crate::entity::{ChangeState, Entity, EntityState, Ordinal, OrdinalCollection, TableDef, UpdatableEntity};
use crate::mapper::{AggregateQuery, ForeignKey};
use crate::query::Select;

/// One call of a train at a station, at position `ordinal` in its run.
#[derive(Debug, Clone)]
pub struct Stop {
    state: EntityState<i64>,
    changes: ChangeState,
    train_id: i64,
    station_id: i64,
    ordinal: i32,
    platform: Option<String>,
    booked_arrival: Option<NaiveDateTime>,
    booked_departure: Option<NaiveDateTime>,
    cancelled: bool,
}

impl Stop {
    pub fn new(train_id: i64, station_id: i64, ordinal: i32) -> Self {
        Self {
            state: EntityState::new(),
            changes: ChangeState::dirty(),
            train_id,
            station_id,
            ordinal,
            platform: None,
            booked_arrival: None,
            booked_departure: None,
            cancelled: false,
        }
    }

    pub fn with_times(mut self, arrival: Option<NaiveDateTime>, departure: Option<NaiveDateTime>) -> Self {
        self.booked_arrival = arrival;
        self.booked_departure = departure;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn train_id(&self) -> i64 {
        self.train_id
    }

    pub fn station_id(&self) -> i64 {
        self.station_id
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn booked_arrival(&self) -> Option<NaiveDateTime> {
        self.booked_arrival
    }

    pub fn booked_departure(&self) -> Option<NaiveDateTime> {
        self.booked_departure
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_ordinal(&mut self, ordinal: i32) {
        if ordinal != self.ordinal {
            self.ordinal = ordinal;
            self.on_change();
        }
    }

    pub fn set_platform(&mut self, platform: Option<String>) {
        if platform != self.platform {
            self.platform = platform;
            self.on_change();
        }
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        if cancelled != self.cancelled {
            self.cancelled = cancelled;
            self.on_change();
        }
    }
}

impl Ordinal for Stop {
    fn ordinal(&self) -> i32 {
        self.ordinal
    }
}

impl Entity for Stop {
    type Key = i64;

    const TABLE: TableDef = TableDef {
        name: "stop",
        key_column: "id",
        columns: &[
            "train_id",
            "station_id",
            "ordinal",
            "platform",
            "booked_arrival",
            "booked_departure",
            "cancelled",
        ],
        upsert_key: &["train_id", "ordinal"],
    };

    fn placeholder(key: i64) -> Self {
        Self {
            state: EntityState::placeholder(key),
            changes: ChangeState::default(),
            train_id: 0,
            station_id: 0,
            ordinal: 0,
            platform: None,
            booked_arrival: None,
            booked_departure: None,
            cancelled: false,
        }
    }

    fn state(&self) -> &EntityState<i64> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState<i64> {
        &mut self.state
    }

    fn read_row(&mut self, row: &Row) -> Result<(), DriverError> {
        self.train_id = row.get_i64("train_id")?;
        self.station_id = row.get_i64("station_id")?;
        self.ordinal = row.get_i32("ordinal")?;
        self.platform = row.get_opt("platform")?;
        self.booked_arrival = row.get_opt("booked_arrival")?;
        self.booked_departure = row.get_opt("booked_departure")?;
        self.cancelled = row.get_bool("cancelled")?;
        Ok(())
    }
}

impl UpdatableEntity for Stop {
    fn changes(&self) -> &ChangeState {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeState {
        &mut self.changes
    }

    fn fill_from(&mut self, other: &Self) {
        self.state.copy_from(&other.state);
        self.train_id = other.train_id;
        self.station_id = other.station_id;
        self.ordinal = other.ordinal;
        self.platform = other.platform.clone();
        self.booked_arrival = other.booked_arrival;
        self.booked_departure = other.booked_departure;
        self.cancelled = other.cancelled;
    }

    fn write_values(&self) -> Vec<Value> {
        vec![
            self.train_id.into(),
            self.station_id.into(),
            self.ordinal.into(),
            self.platform.clone().into(),
            self.booked_arrival.into(),
            self.booked_departure.into(),
            self.cancelled.into(),
        ]
    }
}

/// Stops of a train in calling order.
pub type TrainStops = OrdinalCollection<i64, Stop>;

/// Groups stops by their train.
pub struct StopsByTrain;

impl ForeignKey<Stop> for StopsByTrain {
    type Group = i64;
    const COLUMN: &'static str = "train_id";
    const ORDER_BY: Option<&'static str> = Some("ordinal");

    fn collection_key(row: &Row) -> Result<i64, DriverError> {
        row.get_i64("train_id")
    }

    fn to_value(train_id: &i64) -> Value {
        (*train_id).into()
    }
}

/// Highest stop ordinal per train; no value for a train without stops.
pub struct MaxStopOrdinal;

impl AggregateQuery for MaxStopOrdinal {
    type Key = i64;
    type Output = i32;
    const KEY_COLUMN: &'static str = "train_id";

    fn select() -> Select {
        Select::from("stop")
            .column("train_id")
            .expr(r#"MAX("ordinal")"#, "max_ordinal")
            .group_by("train_id")
    }

    fn read_key(row: &Row) -> Result<i64, DriverError> {
        row.get_i64("train_id")
    }

    fn read_value(row: &Row) -> Result<Option<i32>, DriverError> {
        row.get_opt("max_ordinal")
    }

    fn to_value(train_id: &i64) -> Value {
        (*train_id).into()
    }
}
