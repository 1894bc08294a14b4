//! Append-only, deduplicated incident feed.

use std::collections::BTreeSet;

use safezone_incident_models::{HeatPoint, Incident, IncidentId};
use serde_json::Value;

use crate::RecordError;
use crate::parsing::parse_incident;

/// Result of offering one raw record to the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The record parsed and its id was new.
    Admitted(Incident),
    /// The id is already in the feed; the record was ignored.
    Duplicate(IncidentId),
    /// The record failed validation.
    Rejected(RecordError),
}

/// Tally of a bulk ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Newly admitted incidents, in input order.
    pub admitted: Vec<Incident>,
    /// Records dropped because they failed validation.
    pub skipped: usize,
    /// Records dropped because their id was already present.
    pub duplicates: usize,
}

/// Every incident seen this session, in arrival order.
#[derive(Debug, Default)]
pub struct IncidentFeed {
    incidents: Vec<Incident>,
    ids: BTreeSet<IncidentId>,
}

impl IncidentFeed {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            incidents: Vec::new(),
            ids: BTreeSet::new(),
        }
    }

    /// Parses and admits a single record, as delivered by the live stream.
    pub fn ingest_one(&mut self, raw: &Value) -> IngestOutcome {
        match parse_incident(raw) {
            Ok(incident) => self.admit(incident),
            Err(e) => {
                log::warn!("Skipping incident record: {e}");
                IngestOutcome::Rejected(e)
            }
        }
    }

    /// Parses and admits a batch of records, as returned by the bulk fetch.
    ///
    /// Malformed records are counted and skipped; the rest of the batch is
    /// still processed. Re-ingesting an already admitted id is a no-op.
    pub fn ingest_batch(&mut self, raw: &[Value]) -> IngestReport {
        let mut report = IngestReport::default();

        for record in raw {
            match self.ingest_one(record) {
                IngestOutcome::Admitted(incident) => report.admitted.push(incident),
                IngestOutcome::Duplicate(_) => report.duplicates += 1,
                IngestOutcome::Rejected(_) => report.skipped += 1,
            }
        }

        if report.skipped > 0 {
            log::warn!(
                "Skipped {} malformed incident record(s) out of {}",
                report.skipped,
                raw.len()
            );
        }

        report
    }

    fn admit(&mut self, incident: Incident) -> IngestOutcome {
        if !self.ids.insert(incident.id.clone()) {
            log::debug!("Ignoring duplicate incident {}", incident.id);
            return IngestOutcome::Duplicate(incident.id);
        }
        self.incidents.push(incident.clone());
        IngestOutcome::Admitted(incident)
    }

    #[must_use]
    pub fn all(&self) -> &[Incident] {
        &self.incidents
    }

    /// Weighted heatmap points for every incident, in feed order.
    #[must_use]
    pub fn heat_points(&self) -> Vec<HeatPoint> {
        self.incidents.iter().map(HeatPoint::from).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }
}
