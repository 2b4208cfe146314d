//! In-memory R-tree for radius queries over a fixed set of locations.
//!
//! Locations are projected onto the unit sphere as 3D Cartesian points.
//! Straight-line chord length is monotonic in great-circle distance, so a
//! Euclidean radius query is exact everywhere, including across the
//! antimeridian and at the poles where a lat/lng envelope breaks down.
//! Candidates are re-checked with [`haversine_meters`] so results agree
//! with [`crate::distance_meters`].

use rstar::RTree;
use rstar::primitives::GeomWithData;
use safety_map_event_models::Location;

use crate::{EARTH_RADIUS_METERS, GeoError, haversine_meters, validate};

/// Relative slack on the chord radius so floating-point noise never drops
/// a point the haversine check would accept.
const CHORD_SLACK: f64 = 1e-9;

type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// Pre-built spatial index over a slice of locations.
///
/// Entries are addressed by their position in the slice the index was
/// built from.
pub struct ProximityIndex {
    tree: RTree<IndexedPoint>,
    locations: Vec<Location>,
}

impl ProximityIndex {
    /// Builds the index.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::NonFiniteCoordinate`] if any location is
    /// non-finite.
    pub fn build(locations: &[Location]) -> Result<Self, GeoError> {
        let mut entries = Vec::with_capacity(locations.len());
        for (idx, location) in locations.iter().enumerate() {
            validate(location)?;
            entries.push(GeomWithData::new(to_unit_vector(location), idx));
        }

        Ok(Self {
            tree: RTree::bulk_load(entries),
            locations: locations.to_vec(),
        })
    }

    /// Number of indexed locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Returns the indices of every other entry within `radius_meters` of
    /// entry `idx`, in ascending index order.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidRadius`] if the radius is negative or
    /// non-finite.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn neighbors(&self, idx: usize, radius_meters: f64) -> Result<Vec<usize>, GeoError> {
        let center = self.locations[idx];
        let mut found = self.within(&center, radius_meters)?;
        found.retain(|&other| other != idx);
        Ok(found)
    }

    /// Returns the indices of every entry within `radius_meters` of
    /// `center`, in ascending index order.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the center is non-finite or the radius is
    /// negative or non-finite.
    pub fn within(&self, center: &Location, radius_meters: f64) -> Result<Vec<usize>, GeoError> {
        validate(center)?;
        if !radius_meters.is_finite() || radius_meters < 0.0 {
            return Err(GeoError::InvalidRadius {
                meters: radius_meters,
            });
        }

        let chord = chord_for_distance(radius_meters) * (1.0 + CHORD_SLACK) + CHORD_SLACK;
        let query = to_unit_vector(center);

        let mut found: Vec<usize> = self
            .tree
            .locate_within_distance(query, chord * chord)
            .map(|entry| entry.data)
            .filter(|&other| haversine_meters(center, &self.locations[other]) <= radius_meters)
            .collect();
        found.sort_unstable();

        Ok(found)
    }
}

fn to_unit_vector(location: &Location) -> [f64; 3] {
    let lat = location.lat.to_radians();
    let lng = location.lng.to_radians();
    [lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin()]
}

/// Chord length on the unit sphere subtending `meters` of arc.
fn chord_for_distance(meters: f64) -> f64 {
    let angle = (meters / EARTH_RADIUS_METERS).min(std::f64::consts::PI);
    2.0 * (angle / 2.0).sin()
}
