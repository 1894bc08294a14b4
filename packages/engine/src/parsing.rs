//! Parsing of untrusted incident records.
//!
//! Records arrive as loose JSON from the bulk fetch and the live push
//! stream. Identity is read from `_id` (falling back to `id`) and
//! coordinates from `lat`/`lng`, which may be numbers or numeric strings.

use std::str::FromStr;

use safezone_geo::Coordinate;
use safezone_incident_models::{DEFAULT_INCIDENT_TYPE, Incident, IncidentId, Severity};
use serde_json::Value;

use crate::RecordError;

/// Parses one raw record into an [`Incident`].
///
/// # Errors
///
/// Returns [`RecordError`] if the record is not an object, has no usable id,
/// or its `lat`/`lng` are missing, non-numeric, or out of range.
pub fn parse_incident(raw: &Value) -> Result<Incident, RecordError> {
    let Some(record) = raw.as_object() else {
        return Err(RecordError::NotAnObject);
    };

    let id = record
        .get("_id")
        .and_then(parse_id)
        .or_else(|| record.get("id").and_then(parse_id))
        .ok_or(RecordError::MissingId)?;

    let latitude = parse_number(record.get("lat")).ok_or(RecordError::MissingCoordinate)?;
    let longitude = parse_number(record.get("lng")).ok_or(RecordError::MissingCoordinate)?;
    let coordinate = Coordinate::new(latitude, longitude)?;

    let incident_type = non_blank_str(record.get("type"))
        .unwrap_or(DEFAULT_INCIDENT_TYPE)
        .to_string();

    let severity = match non_blank_str(record.get("severity")) {
        Some(s) => Severity::from_str(s.trim()).unwrap_or_else(|_| {
            log::debug!("Unknown severity {s:?} on incident {id}, using default");
            Severity::default()
        }),
        None => Severity::default(),
    };

    let description = non_blank_str(record.get("description")).map(ToString::to_string);

    Ok(Incident {
        id,
        coordinate,
        incident_type,
        severity,
        description,
    })
}

fn parse_id(value: &Value) -> Option<IncidentId> {
    match value {
        Value::String(s) => IncidentId::new(s.trim()),
        Value::Number(n) => IncidentId::new(n.to_string()),
        _ => None,
    }
}

/// Coerces a JSON number or numeric string to `f64`.
fn parse_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn non_blank_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
