use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use tracing::info;

use rail_store::config::{StoreConfig, init_tracing};
use rail_store::driver::Connection;
use rail_store::network::{Network, memory_store};
use rail_store::stations::{StationRecord, StationSnapshot, import_stations};

/// Import a station feed into an in-memory store and report.
///
/// With a path argument the feed (a JSON array of `{crs_code, name}`) is
/// read from that file and written to the snapshot; without one the
/// snapshot must exist and be fresh.
fn main() -> ExitCode {
    init_tracing();
    match run(std::env::args_os().nth(1).map(PathBuf::from)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(feed: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let config = StoreConfig::from_env()?;
    let snapshot = StationSnapshot::from_config(&config);

    let records: Vec<StationRecord> = match feed {
        Some(path) => {
            let records: Vec<StationRecord> = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
            snapshot.save(&records)?;
            info!(path = %snapshot.path().display(), "refreshed station snapshot");
            records
        }
        None => snapshot.load()?.ok_or_else(|| {
            format!(
                "no fresh station snapshot at {}; pass a feed file",
                snapshot.path().display()
            )
        })?,
    };

    let conn = memory_store()?;
    let mut network = Network::new(Rc::clone(&conn) as Rc<dyn Connection>, &config)?;
    let report = import_stations(&mut network, &records)?;

    println!(
        "imported {} stations ({} unchanged, {} skipped) in {} round trips",
        report.written,
        report.unchanged,
        report.skipped,
        conn.command_count()
    );
    Ok(())
}
