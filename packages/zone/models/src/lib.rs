#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety zone types.
//!
//! Two flavors of zone share the [`Zone`] shape: the implicit self zone that
//! follows the user's live position (reserved id [`ZoneId::SELF`], fixed
//! [`SELF_ZONE_RADIUS_KM`] radius) and explicit zones the user creates by
//! name.

use safezone_geo::Coordinate;
use serde::{Deserialize, Serialize};

/// Radius of the zone that tracks the user's live position.
pub const SELF_ZONE_RADIUS_KM: f64 = 10.0;

/// Display name of the self zone.
pub const SELF_ZONE_NAME: &str = "Current location";

/// Errors raised when zone creation input is malformed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The zone name was empty or whitespace.
    #[error("zone name must not be empty")]
    EmptyName,

    /// The radius was zero, negative, or not a finite number.
    #[error("zone radius must be a positive number of kilometres, got {0}")]
    InvalidRadius(f64),

    /// An explicit zone tried to claim the reserved self id, or reused an
    /// id that is already in the store.
    #[error("zone id {0} is already in use")]
    DuplicateId(ZoneId),

    /// The zone center did not parse as a coordinate.
    #[error("invalid zone center: {0}")]
    InvalidCenter(#[from] safezone_geo::CoordinateError),
}

/// Stable zone identity.
///
/// Explicit zones carry an id assigned by the store or the backend; the
/// self zone always uses [`ZoneId::SELF`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    /// Sentinel id of the self zone.
    pub const SELF: &'static str = "self";

    /// Wraps an explicit zone id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id of the self zone.
    #[must_use]
    pub fn self_zone() -> Self {
        Self(Self::SELF.to_string())
    }

    /// Whether this is the reserved self-zone id.
    #[must_use]
    pub fn is_self(&self) -> bool {
        self.0 == Self::SELF
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A circular safety zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Stable identity.
    pub id: ZoneId,
    /// User-facing name.
    pub name: String,
    /// Center of the circle.
    pub center: Coordinate,
    /// Radius in kilometres, always positive.
    pub radius_km: f64,
}

impl Zone {
    /// Builds an explicit zone after validating its inputs.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyName`] if `name` is blank
    /// * [`ValidationError::InvalidRadius`] if `radius_km` is not a positive
    ///   finite number
    /// * [`ValidationError::DuplicateId`] if `id` is the reserved self id
    pub fn new(
        id: ZoneId,
        name: impl Into<String>,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        validate_radius(radius_km)?;
        if id.is_self() {
            return Err(ValidationError::DuplicateId(id));
        }
        Ok(Self {
            id,
            name,
            center,
            radius_km,
        })
    }

    /// The self zone centered on `position`.
    #[must_use]
    pub fn self_zone(position: Coordinate) -> Self {
        Self {
            id: ZoneId::self_zone(),
            name: SELF_ZONE_NAME.to_string(),
            center: position,
            radius_km: SELF_ZONE_RADIUS_KM,
        }
    }

    #[must_use]
    pub fn is_self(&self) -> bool {
        self.id.is_self()
    }
}

/// Checks that a radius is a positive, finite number of kilometres.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidRadius`] otherwise.
pub fn validate_radius(radius_km: f64) -> Result<(), ValidationError> {
    if radius_km.is_finite() && radius_km > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidRadius(radius_km))
    }
}
