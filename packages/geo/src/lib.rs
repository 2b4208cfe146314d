#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Great-circle distance, bounding boxes, and proximity indexing.
//!
//! Distances use the haversine formula on a spherical Earth of radius
//! 6,371 km. Bounding boxes use the flat 111,320 m/degree approximation
//! and are only a pre-filter; callers needing exact radius semantics must
//! re-check candidates with [`distance_meters`].

pub mod index;

use safety_map_event_models::Location;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use index::ProximityIndex;

/// Mean Earth radius used for all distance math.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Approximate length of one degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Longitude half-width used when the longitude scale collapses near the
/// poles.
pub const POLAR_LNG_DELTA_DEGREES: f64 = 0.01;

const LNG_SCALE_EPSILON: f64 = 1e-6;

/// Errors produced by geo math on malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeoError {
    /// A coordinate component was `NaN` or infinite.
    #[error("Non-finite coordinate: lat={lat}, lng={lng}")]
    NonFiniteCoordinate {
        /// Offending latitude.
        lat: f64,
        /// Offending longitude.
        lng: f64,
    },

    /// A radius was negative, `NaN`, or infinite.
    #[error("Invalid radius: {meters} meters")]
    InvalidRadius {
        /// Offending radius.
        meters: f64,
    },
}

/// An axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Southern latitude boundary.
    pub min_lat: f64,
    /// Northern latitude boundary.
    pub max_lat: f64,
    /// Western longitude boundary.
    pub min_lng: f64,
    /// Eastern longitude boundary.
    pub max_lng: f64,
}

impl BoundingBox {
    /// Whether the location falls inside the box (inclusive).
    #[must_use]
    pub fn contains(&self, location: &Location) -> bool {
        (self.min_lat..=self.max_lat).contains(&location.lat)
            && (self.min_lng..=self.max_lng).contains(&location.lng)
    }
}

/// Rejects locations with non-finite components.
///
/// # Errors
///
/// Returns [`GeoError::NonFiniteCoordinate`] if either component is `NaN`
/// or infinite.
pub const fn validate(location: &Location) -> Result<(), GeoError> {
    if location.is_finite() {
        Ok(())
    } else {
        Err(GeoError::NonFiniteCoordinate {
            lat: location.lat,
            lng: location.lng,
        })
    }
}

/// Haversine distance in meters without input validation.
///
/// Callers must have validated both locations; non-finite input yields
/// `NaN`.
#[must_use]
pub fn haversine_meters(a: &Location, b: &Location) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let sin_d_lat = (d_lat / 2.0).sin();
    let sin_d_lng = (d_lng / 2.0).sin();

    let h = sin_d_lng.mul_add(
        sin_d_lng * (lat1.cos() * lat2.cos()),
        sin_d_lat * sin_d_lat,
    );

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Great-circle distance between two locations in meters.
///
/// Symmetric, zero for coincident points, and monotonically increasing
/// with angular separation.
///
/// # Errors
///
/// Returns [`GeoError::NonFiniteCoordinate`] if either location has a
/// non-finite component.
pub fn distance_meters(a: &Location, b: &Location) -> Result<f64, GeoError> {
    validate(a)?;
    validate(b)?;
    Ok(haversine_meters(a, b))
}

/// Approximates a square bounding box of half-width `radius_meters`
/// around `center`.
///
/// Latitude uses 111,320 m/degree; longitude scales that by
/// `cos(latitude)`. Where the longitude scale collapses (at the poles) a
/// fixed 0.01 degree longitude delta is used instead.
///
/// # Errors
///
/// Returns [`GeoError`] if the center is non-finite or the radius is
/// negative or non-finite.
pub fn bounding_box(center: &Location, radius_meters: f64) -> Result<BoundingBox, GeoError> {
    validate(center)?;
    if !radius_meters.is_finite() || radius_meters < 0.0 {
        return Err(GeoError::InvalidRadius {
            meters: radius_meters,
        });
    }

    let lat_delta = radius_meters / METERS_PER_DEGREE;
    let lng_scale = center.lat.to_radians().cos() * METERS_PER_DEGREE;
    let lng_delta = if lng_scale.abs() < LNG_SCALE_EPSILON {
        log::debug!(
            "Longitude scale collapsed at lat={}; using fixed delta",
            center.lat
        );
        POLAR_LNG_DELTA_DEGREES
    } else {
        radius_meters / lng_scale.abs()
    };

    Ok(BoundingBox {
        min_lat: center.lat - lat_delta,
        max_lat: center.lat + lat_delta,
        min_lng: center.lng - lng_delta,
        max_lng: center.lng + lng_delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let a = Location::new(48.8584, 2.2945);
        assert!(distance_meters(&a, &a).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Location::new(41.8827, -87.6278);
        let b = Location::new(38.8951, -77.0364);
        let ab = distance_meters(&a, &b).unwrap();
        let ba = distance_meters(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let d = distance_meters(&Location::new(0.0, 0.0), &Location::new(0.0, 1.0)).unwrap();
        assert!((d - 111_320.0).abs() / 111_320.0 < 0.01, "got {d}");
    }

    #[test]
    fn distance_grows_with_separation() {
        let origin = Location::new(10.0, 10.0);
        let mut last = 0.0;
        for step in 1..=20 {
            let other = Location::new(10.0, f64::from(step).mul_add(0.5, 10.0));
            let d = distance_meters(&origin, &other).unwrap();
            assert!(d > last, "distance not increasing at step {step}");
            last = d;
        }
    }

    #[test]
    fn distance_rejects_non_finite() {
        let ok = Location::new(0.0, 0.0);
        let bad = Location::new(f64::NAN, 0.0);
        assert!(matches!(
            distance_meters(&ok, &bad),
            Err(GeoError::NonFiniteCoordinate { .. })
        ));
        assert!(distance_meters(&Location::new(0.0, f64::INFINITY), &ok).is_err());
    }

    #[test]
    fn bounding_box_at_equator_is_square() {
        let bbox = bounding_box(&Location::new(0.0, 0.0), 111_320.0).unwrap();
        assert!((bbox.max_lat - 1.0).abs() < 1e-9);
        assert!((bbox.min_lat + 1.0).abs() < 1e-9);
        assert!((bbox.max_lng - 1.0).abs() < 1e-9);
        assert!((bbox.min_lng + 1.0).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_widens_longitude_at_higher_latitude() {
        let bbox = bounding_box(&Location::new(60.0, 10.0), 1_000.0).unwrap();
        let lat_half = (bbox.max_lat - bbox.min_lat) / 2.0;
        let lng_half = (bbox.max_lng - bbox.min_lng) / 2.0;
        // cos(60°) = 0.5, so longitude spans twice the degrees
        assert!((lng_half / lat_half - 2.0).abs() < 1e-6);
        assert!(bbox.contains(&Location::new(60.0, 10.0)));
    }

    #[test]
    fn bounding_box_falls_back_at_pole() {
        let bbox = bounding_box(&Location::new(90.0, 0.0), 500.0).unwrap();
        assert!((bbox.max_lng - POLAR_LNG_DELTA_DEGREES).abs() < 1e-12);
        assert!((bbox.min_lng + POLAR_LNG_DELTA_DEGREES).abs() < 1e-12);
        assert!(bbox.min_lng.is_finite() && bbox.max_lng.is_finite());
    }

    #[test]
    fn bounding_box_rejects_bad_input() {
        assert!(matches!(
            bounding_box(&Location::new(0.0, 0.0), -1.0),
            Err(GeoError::InvalidRadius { .. })
        ));
        assert!(bounding_box(&Location::new(0.0, 0.0), f64::NAN).is_err());
        assert!(bounding_box(&Location::new(f64::NAN, 0.0), 10.0).is_err());
    }
}
