//! The set of zones incidents are evaluated against.

use safezone_geo::Coordinate;
use safezone_zone_models::{ValidationError, Zone, ZoneId, validate_radius};

/// Active zones in insertion order.
///
/// The self zone lives in the same list as explicit zones. It takes its
/// position in the order the first time a live position arrives and is
/// re-centered in place afterwards.
#[derive(Debug, Default)]
pub struct ZoneStore {
    zones: Vec<Zone>,
}

impl ZoneStore {
    #[must_use]
    pub const fn new() -> Self {
        Self { zones: Vec::new() }
    }

    /// Centers the self zone on `position`, creating it on first use.
    pub fn upsert_self_zone(&mut self, position: Coordinate) -> &Zone {
        let idx = match self.zones.iter().position(Zone::is_self) {
            Some(idx) => {
                self.zones[idx].center = position;
                idx
            }
            None => {
                self.zones.push(Zone::self_zone(position));
                self.zones.len() - 1
            }
        };
        &self.zones[idx]
    }

    /// Creates an explicit zone with a fresh id and appends it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if `name` is blank or `radius_km` is not
    /// positive. The store is unchanged on error.
    pub fn add_zone(
        &mut self,
        name: &str,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Zone, ValidationError> {
        let id = ZoneId::new(uuid::Uuid::new_v4().to_string());
        let zone = Zone::new(id, name, center, radius_km)?;
        self.zones.push(zone.clone());
        Ok(zone)
    }

    /// Appends a zone whose id was assigned elsewhere (e.g. by the backend).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the zone is malformed, claims the self
    /// id, or its id is already present.
    pub fn insert(&mut self, zone: Zone) -> Result<&Zone, ValidationError> {
        if zone.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        validate_radius(zone.radius_km)?;
        if zone.is_self() || self.get(&zone.id).is_some() {
            return Err(ValidationError::DuplicateId(zone.id));
        }
        self.zones.push(zone);
        Ok(&self.zones[self.zones.len() - 1])
    }

    /// Removes every zone, the self zone included.
    pub fn clear(&mut self) {
        self.zones.clear();
    }

    #[must_use]
    pub fn list(&self) -> &[Zone] {
        &self.zones
    }

    #[must_use]
    pub fn get(&self, id: &ZoneId) -> Option<&Zone> {
        self.zones.iter().find(|z| &z.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[test]
    fn self_zone_is_recentered_in_place() {
        let mut store = ZoneStore::new();
        store.add_zone("Home", coord(1.0, 1.0), 1.0).unwrap();
        store.upsert_self_zone(coord(2.0, 2.0));
        store.add_zone("Work", coord(3.0, 3.0), 1.0).unwrap();
        store.upsert_self_zone(coord(4.0, 4.0));

        let names: Vec<&str> = store.list().iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, ["Home", "Current location", "Work"]);
        assert_eq!(
            store.get(&ZoneId::self_zone()).unwrap().center,
            coord(4.0, 4.0)
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn add_zone_assigns_unique_ids() {
        let mut store = ZoneStore::new();
        let a = store.add_zone("A", coord(1.0, 1.0), 1.0).unwrap();
        let b = store.add_zone("A", coord(1.0, 1.0), 1.0).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn invalid_zone_leaves_store_unchanged() {
        let mut store = ZoneStore::new();
        assert_eq!(
            store.add_zone("", coord(1.0, 1.0), 1.0),
            Err(ValidationError::EmptyName)
        );
        assert!(store.add_zone("A", coord(1.0, 1.0), 0.0).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn insert_rejects_duplicates_and_self_id() {
        let mut store = ZoneStore::new();
        let zone = Zone::new(ZoneId::new("srv-1"), "Park", coord(1.0, 1.0), 2.0).unwrap();
        store.insert(zone.clone()).unwrap();
        assert!(matches!(
            store.insert(zone),
            Err(ValidationError::DuplicateId(_))
        ));

        let mut fake_self = Zone::self_zone(coord(1.0, 1.0));
        fake_self.name = "Imposter".to_string();
        assert!(matches!(
            store.insert(fake_self),
            Err(ValidationError::DuplicateId(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_removes_self_zone_too() {
        let mut store = ZoneStore::new();
        store.upsert_self_zone(coord(2.0, 2.0));
        store.add_zone("Home", coord(1.0, 1.0), 1.0).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert!(store.get(&ZoneId::self_zone()).is_none());
    }
}
