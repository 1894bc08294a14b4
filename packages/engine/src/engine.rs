//! Incremental (zone, incident) membership evaluation.
//!
//! Every trigger evaluates only the pairs it can affect:
//!
//! * a new incident against every zone,
//! * a new zone against every incident,
//! * a moved self zone against every incident.
//!
//! A pair alerts when the incident lies within the zone radius (inclusive)
//! and its [`AlertKey`] has not been claimed yet. Keys are claimed before
//! the intent leaves the engine, so a failed notification is never retried.
//! Intents come out ordered by incident feed order, then zone order.

use safezone_geo::{Coordinate, distance_km};
use safezone_incident_models::{Incident, Severity};
use safezone_zone_models::{ValidationError, Zone, ZoneId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feed::{IncidentFeed, IngestOutcome, IngestReport};
use crate::ledger::{AlertKey, AlertLedger};
use crate::zone_store::ZoneStore;

/// A decision that the user should be told about `incident` in `zone`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertIntent {
    pub zone: Zone,
    pub incident: Incident,
    pub distance_km: f64,
}

impl AlertIntent {
    #[must_use]
    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.zone.id.clone(), self.incident.id.clone())
    }
}

/// Outcome of [`AlertEngine::on_incident_batch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub report: IngestReport,
    pub intents: Vec<AlertIntent>,
}

/// Owns the zone store, the incident feed, and the alert ledger.
///
/// All mutation goes through the `on_*` triggers, each of which runs to
/// completion and returns the intents it produced.
#[derive(Debug, Default)]
pub struct AlertEngine {
    zones: ZoneStore,
    feed: IncidentFeed,
    ledger: AlertLedger,
}

impl AlertEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            zones: ZoneStore::new(),
            feed: IncidentFeed::new(),
            ledger: AlertLedger::new(),
        }
    }

    /// Admits one live-pushed record and evaluates it against every zone.
    ///
    /// Malformed and duplicate records produce no intents.
    pub fn on_new_incident(&mut self, raw: &Value) -> Vec<AlertIntent> {
        match self.feed.ingest_one(raw) {
            IngestOutcome::Admitted(incident) => self.evaluate_incident(&incident),
            IngestOutcome::Duplicate(_) | IngestOutcome::Rejected(_) => Vec::new(),
        }
    }

    /// Admits a bulk-fetched batch and evaluates each new incident in input
    /// order.
    pub fn on_incident_batch(&mut self, raw: &[Value]) -> BatchOutcome {
        let report = self.feed.ingest_batch(raw);
        let intents = report
            .admitted
            .iter()
            .flat_map(|incident| self.evaluate_incident(incident))
            .collect();
        BatchOutcome { report, intents }
    }

    /// Creates a zone and evaluates every known incident against it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for a blank name or non-positive radius;
    /// engine state is unchanged in that case.
    pub fn on_zone_added(
        &mut self,
        name: &str,
        radius_km: f64,
        center: Coordinate,
    ) -> Result<(Zone, Vec<AlertIntent>), ValidationError> {
        let zone = self.zones.add_zone(name, center, radius_km)?;
        log::info!(
            "Added zone {:?} ({}) radius {} km at {}",
            zone.name,
            zone.id,
            zone.radius_km,
            zone.center
        );
        let intents = self.evaluate_zone(&zone);
        Ok((zone, intents))
    }

    /// Adds a zone that already has an id, e.g. one loaded from the backend,
    /// and evaluates every known incident against it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the zone is malformed or its id is
    /// already present.
    pub fn on_zone_restored(&mut self, zone: Zone) -> Result<Vec<AlertIntent>, ValidationError> {
        let zone = self.zones.insert(zone)?.clone();
        log::debug!("Restored zone {:?} ({})", zone.name, zone.id);
        Ok(self.evaluate_zone(&zone))
    }

    /// Re-centers the self zone and evaluates it against every incident.
    ///
    /// Keys claimed before the move are never revisited, so an incident the
    /// user has moved away from is not retracted or re-alerted.
    pub fn on_self_position_changed(&mut self, position: Coordinate) -> Vec<AlertIntent> {
        let zone = self.zones.upsert_self_zone(position).clone();
        log::trace!("Self zone moved to {position}");
        self.evaluate_zone(&zone)
    }

    /// Removes every zone (the self zone included) and forgets every alert.
    ///
    /// This is the only way ledger keys are released.
    pub fn on_clear_zones(&mut self) {
        log::info!(
            "Clearing {} zone(s) and {} alert record(s)",
            self.zones.len(),
            self.ledger.len()
        );
        self.zones.clear();
        self.ledger.reset();
    }

    /// Highest severity of any incident currently inside the zone, or
    /// `None` if the zone is unknown or holds no incidents.
    #[must_use]
    pub fn zone_threat(&self, id: &ZoneId) -> Option<Severity> {
        let zone = self.zones.get(id)?;
        self.feed
            .all()
            .iter()
            .filter(|incident| distance_km(&zone.center, &incident.coordinate) <= zone.radius_km)
            .map(|incident| incident.severity)
            .max()
    }

    #[must_use]
    pub const fn zones(&self) -> &ZoneStore {
        &self.zones
    }

    #[must_use]
    pub const fn feed(&self) -> &IncidentFeed {
        &self.feed
    }

    #[must_use]
    pub const fn ledger(&self) -> &AlertLedger {
        &self.ledger
    }

    fn evaluate_incident(&mut self, incident: &Incident) -> Vec<AlertIntent> {
        self.zones
            .list()
            .iter()
            .filter_map(|zone| evaluate_pair(&mut self.ledger, zone, incident))
            .collect()
    }

    fn evaluate_zone(&mut self, zone: &Zone) -> Vec<AlertIntent> {
        self.feed
            .all()
            .iter()
            .filter_map(|incident| evaluate_pair(&mut self.ledger, zone, incident))
            .collect()
    }
}

fn evaluate_pair(
    ledger: &mut AlertLedger,
    zone: &Zone,
    incident: &Incident,
) -> Option<AlertIntent> {
    let distance_km = distance_km(&zone.center, &incident.coordinate);
    if distance_km > zone.radius_km {
        return None;
    }
    if !ledger.claim(AlertKey::new(zone.id.clone(), incident.id.clone())) {
        return None;
    }

    log::info!(
        "Incident {} ({}, {}) is {distance_km:.2} km inside zone {:?}",
        incident.id,
        incident.incident_type,
        incident.severity,
        zone.name
    );

    Some(AlertIntent {
        zone: zone.clone(),
        incident: incident.clone(),
        distance_km,
    })
}
