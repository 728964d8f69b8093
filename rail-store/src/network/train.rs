//! Trains: one run of a timetabled service on one day.

use chrono::NaiveDate;

use crate::domain::{AtocCode, Headcode, ServiceUid, parse_column, parse_opt_column};
use crate::driver::{DriverError, Row, Value};
use crate::entity::{ChangeState, Entity, EntityState, TableDef, UpdatableEntity};

#[derive(Debug, Clone)]
pub struct Train {
    state: EntityState<i64>,
    changes: ChangeState,
    service_uid: Option<ServiceUid>,
    headcode: Option<Headcode>,
    operator: Option<AtocCode>,
    run_date: NaiveDate,
}

impl Train {
    pub fn new(service_uid: ServiceUid, run_date: NaiveDate) -> Self {
        Self {
            state: EntityState::new(),
            changes: ChangeState::dirty(),
            service_uid: Some(service_uid),
            headcode: None,
            operator: None,
            run_date,
        }
    }

    pub fn with_headcode(mut self, headcode: Headcode) -> Self {
        self.headcode = Some(headcode);
        self
    }

    pub fn with_operator(mut self, operator: AtocCode) -> Self {
        self.operator = Some(operator);
        self
    }

    /// `None` only before the train is loaded.
    pub fn service_uid(&self) -> Option<&ServiceUid> {
        self.service_uid.as_ref()
    }

    pub fn headcode(&self) -> Option<Headcode> {
        self.headcode
    }

    pub fn operator(&self) -> Option<AtocCode> {
        self.operator
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date
    }

    pub fn set_headcode(&mut self, headcode: Option<Headcode>) {
        if headcode != self.headcode {
            self.headcode = headcode;
            self.on_change();
        }
    }

    pub fn set_operator(&mut self, operator: Option<AtocCode>) {
        if operator != self.operator {
            self.operator = operator;
            self.on_change();
        }
    }
}

impl Entity for Train {
    type Key = i64;

    const TABLE: TableDef = TableDef {
        name: "train",
        key_column: "id",
        columns: &["service_uid", "headcode", "operator", "run_date"],
        upsert_key: &["service_uid", "run_date"],
    };

    fn placeholder(key: i64) -> Self {
        Self {
            state: EntityState::placeholder(key),
            changes: ChangeState::default(),
            service_uid: None,
            headcode: None,
            operator: None,
            run_date: NaiveDate::MIN,
        }
    }

    fn state(&self) -> &EntityState<i64> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState<i64> {
        &mut self.state
    }

    fn read_row(&mut self, row: &Row) -> Result<(), DriverError> {
        self.service_uid = Some(parse_column(row, "service_uid", |s| ServiceUid::new(s))?);
        // Non-standard reporting numbers are stored as NULL
        self.headcode = row
            .get_opt::<String>("headcode")?
            .and_then(|s| Headcode::parse(&s));
        self.operator = parse_opt_column(row, "operator", AtocCode::parse)?;
        self.run_date = row.get_as("run_date")?;
        Ok(())
    }
}

impl UpdatableEntity for Train {
    fn changes(&self) -> &ChangeState {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeState {
        &mut self.changes
    }

    fn fill_from(&mut self, other: &Self) {
        self.state.copy_from(&other.state);
        self.service_uid = other.service_uid.clone();
        self.headcode = other.headcode;
        self.operator = other.operator;
        self.run_date = other.run_date;
    }

    fn write_values(&self) -> Vec<Value> {
        vec![
            self.service_uid.clone().into(),
            self.headcode.into(),
            self.operator.into(),
            self.run_date.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn reads_optional_codes() {
        let row = Row::new()
            .with("id", 7i64)
            .with("service_uid", "P12345")
            .with("headcode", "ZZZZ")
            .with("operator", "GW")
            .with("run_date", date());
        let mut train = Train::placeholder(7);
        train.fill(&row).unwrap();

        assert_eq!(train.service_uid().unwrap().as_str(), "P12345");
        assert_eq!(train.headcode(), None);
        assert_eq!(train.operator().unwrap().as_str(), "GW");
        assert_eq!(train.run_date(), date());
    }

    #[test]
    fn write_values_follow_column_order() {
        let train = Train::new(ServiceUid::new("C11111").unwrap(), date())
            .with_headcode(Headcode::parse("1A23").unwrap());
        assert_eq!(
            train.write_values(),
            vec![
                Value::from("C11111"),
                Value::from("1A23"),
                Value::Null,
                Value::Date(date()),
            ]
        );
    }

    #[test]
    fn setters_track_changes() {
        let mut train = Train::placeholder(1);
        train.set_operator(None);
        assert!(!train.is_changed());
        train.set_operator(AtocCode::parse("XC").ok());
        assert!(train.is_changed());
    }
}
