//! Loading the station feed into the store.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::domain::Crs;
use crate::entity::{Entity, UpdatableEntity};
use crate::mapper::SelectStrategy;
use crate::network::{Network, Station};

use super::error::StationError;
use super::snapshot::StationRecord;

/// Outcome of [`import_stations`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Stations inserted or renamed.
    pub written: usize,
    /// Stations already stored with the same name.
    pub unchanged: usize,
    /// Records with an unusable CRS code.
    pub skipped: usize,
}

/// Upsert feed records into the station table, keyed on CRS.
///
/// Existing stations are found with one batched lookup and every new or
/// renamed station is written with one upsert. When a CRS appears more
/// than once the last record wins.
pub fn import_stations(
    network: &mut Network,
    records: &[StationRecord],
) -> Result<ImportReport, StationError> {
    let mut report = ImportReport::default();
    let mut wanted: Vec<(Crs, &str)> = Vec::with_capacity(records.len());
    let mut position: HashMap<Crs, usize> = HashMap::new();
    for record in records {
        match Crs::parse_lenient(&record.crs_code) {
            Ok(crs) => match position.get(&crs) {
                Some(&i) => wanted[i].1 = record.name.as_str(),
                None => {
                    position.insert(crs, wanted.len());
                    wanted.push((crs, record.name.as_str()));
                }
            },
            Err(err) => {
                warn!(crs = %record.crs_code, name = %record.name, %err, "skipping station");
                report.skipped += 1;
            }
        }
    }

    network.stations_by_crs.begin_select(SelectStrategy::MultiKey)?;
    for (crs, _) in &wanted {
        network.stations_by_crs.fill_by_key(*crs)?;
    }
    network.stations_by_crs.end_select()?;

    let mut dirty = Vec::new();
    for (crs, name) in wanted {
        let stored = network
            .stations_by_crs
            .get_cached(&crs)
            .filter(|s| s.borrow().is_filled());
        match stored {
            Some(station) => {
                station.borrow_mut().set_name(name);
                if station.borrow().is_changed() {
                    dirty.push(station);
                } else {
                    report.unchanged += 1;
                }
            }
            None => dirty.push(network.stations.track(Station::new(crs, name))?),
        }
    }

    network.stations.begin_update()?;
    for station in &dirty {
        network.stations.update(station)?;
    }
    network.stations.end_update()?;
    report.written = dirty.len();

    info!(
        written = report.written,
        unchanged = report.unchanged,
        skipped = report.skipped,
        "imported stations"
    );
    Ok(report)
}
