#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident types shared by the alerting engine and the backend client.
//!
//! An [`Incident`] is the validated, immutable form of a crime report. Raw
//! records from the backend are parsed into this shape by the engine's
//! incident feed; anything that cannot be parsed never becomes an
//! [`Incident`].

use safezone_geo::Coordinate;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Label used when a record carries no incident type.
pub const DEFAULT_INCIDENT_TYPE: &str = "Incident";

/// Opaque incident identity assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    /// Wraps a backend identifier. Returns `None` for blank ids.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// The identifier as sent by the backend.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reported severity of an incident.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
    /// Minor incidents
    Low,
    /// The default when a report does not say
    #[default]
    Medium,
    /// Violent or otherwise urgent incidents
    High,
}

impl Severity {
    /// Weight of a single incident of this severity on the crime heatmap.
    #[must_use]
    pub const fn heat_weight(self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 1.5,
            Self::High => 2.0,
        }
    }
}

/// A validated incident admitted to the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Backend identity, unique within a session.
    pub id: IncidentId,
    /// Where the incident happened.
    pub coordinate: Coordinate,
    /// Free-form incident type, e.g. "Theft".
    #[serde(rename = "type")]
    pub incident_type: String,
    /// Reported severity.
    pub severity: Severity,
    /// Optional reporter description.
    pub description: Option<String>,
}

/// A single weighted point for heatmap rendering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatPoint {
    /// Position of the incident.
    pub coordinate: Coordinate,
    /// See [`Severity::heat_weight`].
    pub weight: f64,
}

impl From<&Incident> for HeatPoint {
    fn from(incident: &Incident) -> Self {
        Self {
            coordinate: incident.coordinate,
            weight: incident.severity.heat_weight(),
        }
    }
}
