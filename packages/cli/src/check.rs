//! Offline evaluation of an incident file against the configured zones.

use std::path::Path;

use safezone_engine::{AlertEngine, AlertNotification};
use safezone_geo::Coordinate;
use serde_json::Value;

use crate::config::{Config, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read incidents: {0}")]
    Io(#[from] std::io::Error),

    #[error("incident file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("incident file must hold a JSON array of records")]
    NotAnArray,

    #[error(transparent)]
    Zone(#[from] safezone_zone_models::ValidationError),
}

/// Runs the engine synchronously over `incidents` and prints one JSON
/// notification per alert to stdout.
///
/// # Errors
///
/// Returns [`CheckError`] if the file cannot be read or the config holds an
/// invalid zone.
pub fn run(
    config: &Config,
    incidents: &Path,
    position: Option<Coordinate>,
) -> Result<(), CheckError> {
    let contents = std::fs::read_to_string(incidents)?;
    let records = parse_records(&contents)?;
    let position = position.or(config.initial_position()?);

    let notifications = evaluate(config, &records, position)?;
    for notification in &notifications {
        println!("{}", serde_json::to_string(notification)?);
    }

    log::info!(
        "{} record(s) checked, {} alert(s)",
        records.len(),
        notifications.len()
    );
    Ok(())
}

fn parse_records(contents: &str) -> Result<Vec<Value>, CheckError> {
    match serde_json::from_str(contents)? {
        Value::Array(records) => Ok(records),
        _ => Err(CheckError::NotAnArray),
    }
}

fn evaluate(
    config: &Config,
    records: &[Value],
    position: Option<Coordinate>,
) -> Result<Vec<AlertNotification>, CheckError> {
    let mut engine = AlertEngine::new();
    let mut intents = Vec::new();

    for zone in &config.zones {
        let (_, found) = engine.on_zone_added(&zone.name, zone.radius_km, zone.center()?)?;
        intents.extend(found);
    }
    if let Some(position) = position {
        intents.extend(engine.on_self_position_changed(position));
    }

    let outcome = engine.on_incident_batch(records);
    if outcome.report.skipped > 0 || outcome.report.duplicates > 0 {
        log::warn!(
            "Skipped {} malformed and {} duplicate record(s)",
            outcome.report.skipped,
            outcome.report.duplicates
        );
    }
    intents.extend(outcome.intents);

    Ok(intents.iter().map(AlertNotification::from).collect())
}
