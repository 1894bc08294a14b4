//! At-most-once bookkeeping for (zone, incident) alerts.

use std::collections::BTreeSet;

use safezone_incident_models::IncidentId;
use safezone_zone_models::ZoneId;
use serde::{Deserialize, Serialize};

/// The deduplication unit: one alert per zone/incident pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertKey {
    pub zone_id: ZoneId,
    pub incident_id: IncidentId,
}

impl AlertKey {
    #[must_use]
    pub const fn new(zone_id: ZoneId, incident_id: IncidentId) -> Self {
        Self {
            zone_id,
            incident_id,
        }
    }
}

impl std::fmt::Display for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.zone_id, self.incident_id)
    }
}

/// Keys that have already produced an alert this session.
///
/// Only grows, except through [`AlertLedger::reset`].
#[derive(Debug, Default)]
pub struct AlertLedger {
    consumed: BTreeSet<AlertKey>,
}

impl AlertLedger {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            consumed: BTreeSet::new(),
        }
    }

    /// Marks `key` as consumed. Returns `true` only the first time a key is
    /// claimed; the caller may alert exactly when this returns `true`.
    pub fn claim(&mut self, key: AlertKey) -> bool {
        self.consumed.insert(key)
    }

    #[must_use]
    pub fn contains(&self, key: &AlertKey) -> bool {
        self.consumed.contains(key)
    }

    pub fn reset(&mut self) {
        self.consumed.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}
