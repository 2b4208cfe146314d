#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Density-based hotspot detection over recent geolocated reports.
//!
//! Hotspots are recomputed from scratch on every call: there is no
//! persisted cluster identity, but a cluster's ID is derived from its
//! member report IDs so an unchanged report set always yields the same
//! IDs.

pub mod detect;

use chrono::{DateTime, Duration, Utc};
use safety_map_event_models::{Location, Report};
use safety_map_geo::GeoError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use detect::detect_hotspots;

/// Errors that can occur during hotspot detection.
#[derive(Debug, Error)]
pub enum HotspotError {
    /// A report had unusable coordinates.
    #[error("Invalid report {report_id}: {source}")]
    InvalidReport {
        /// ID of the offending report.
        report_id: String,
        /// Underlying geo validation failure.
        source: GeoError,
    },

    /// Geo math failed.
    #[error("Geo error: {0}")]
    Geo(#[from] GeoError),

    /// Clustering options were out of range.
    #[error("Invalid options: {message}")]
    InvalidOptions {
        /// Description of what went wrong.
        message: String,
    },
}

/// Tunables for a clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOptions {
    /// Maximum distance between two reports for them to be neighbors.
    pub proximity_meters: f64,
    /// Minimum number of reports (a point plus its neighbors) needed to
    /// seed or extend a cluster.
    pub minimum_events: usize,
    /// Only reports created within this many hours of `now` participate.
    pub lookback_hours: u32,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            proximity_meters: 500.0,
            minimum_events: 3,
            lookback_hours: 24,
        }
    }
}

impl ClusterOptions {
    /// Overlays `HOTSPOT_PROXIMITY_METERS`, `HOTSPOT_MINIMUM_EVENTS`, and
    /// `HOTSPOT_LOOKBACK_HOURS` on the defaults.
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            proximity_meters: env_or("HOTSPOT_PROXIMITY_METERS", defaults.proximity_meters),
            minimum_events: env_or("HOTSPOT_MINIMUM_EVENTS", defaults.minimum_events),
            lookback_hours: env_or("HOTSPOT_LOOKBACK_HOURS", defaults.lookback_hours),
        }
    }

    /// Checks that the options describe a meaningful run.
    ///
    /// # Errors
    ///
    /// Returns [`HotspotError::InvalidOptions`] if the proximity is
    /// negative or non-finite.
    pub fn validate(&self) -> Result<(), HotspotError> {
        if !self.proximity_meters.is_finite() || self.proximity_meters < 0.0 {
            return Err(HotspotError::InvalidOptions {
                message: format!(
                    "proximity_meters must be a non-negative number, got {}",
                    self.proximity_meters
                ),
            });
        }
        Ok(())
    }

    /// Earliest `created_at` that still falls inside the lookback window.
    ///
    /// # Errors
    ///
    /// Returns [`HotspotError::InvalidOptions`] if the window reaches
    /// before the earliest representable timestamp.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, HotspotError> {
        now.checked_sub_signed(Duration::hours(i64::from(self.lookback_hours)))
            .ok_or_else(|| HotspotError::InvalidOptions {
                message: format!("lookback_hours {} is out of range", self.lookback_hours),
            })
    }
}

fn env_or<T: std::str::FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring invalid {name}={raw:?}; using {default}");
            default
        }),
        Err(_) => default,
    }
}

/// A detected hotspot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotCluster {
    /// Member report IDs, sorted and joined with `|`.
    pub id: String,
    /// Coordinate-wise mean of the member locations.
    pub center: Location,
    /// Radius covering every member plus a safety margin; never below
    /// [`MIN_RADIUS_METERS`].
    pub radius_meters: f64,
    /// Reports in the cluster.
    pub members: Vec<Report>,
}

/// Smallest radius a hotspot circle is drawn with.
pub const MIN_RADIUS_METERS: f64 = 200.0;

/// Lower bound of the padding added beyond the farthest member.
pub const MIN_PADDING_METERS: f64 = 75.0;

/// Upper bound of the padding added beyond the farthest member.
pub const MAX_PADDING_METERS: f64 = 250.0;

/// Fraction of the farthest-member distance used as padding.
pub const PADDING_RATIO: f64 = 0.2;

/// Builds a stable cluster ID from member report IDs.
#[must_use]
pub fn cluster_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let mut ids: Vec<&str> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_id_is_order_independent() {
        assert_eq!(cluster_id(["c", "a", "b"]), "a|b|c");
        assert_eq!(cluster_id(["b", "c", "a"]), "a|b|c");
    }

    #[test]
    fn default_options() {
        let options = ClusterOptions::default();
        assert!((options.proximity_meters - 500.0).abs() < f64::EPSILON);
        assert_eq!(options.minimum_events, 3);
        assert_eq!(options.lookback_hours, 24);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_bad_proximity() {
        let options = ClusterOptions {
            proximity_meters: f64::NAN,
            ..ClusterOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(HotspotError::InvalidOptions { .. })
        ));

        let options = ClusterOptions {
            proximity_meters: -1.0,
            ..ClusterOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn options_deserialize_from_camel_case() {
        let options: ClusterOptions = serde_json::from_str(
            r#"{"proximityMeters": 250.0, "minimumEvents": 4, "lookbackHours": 12}"#,
        )
        .unwrap();
        assert_eq!(options.minimum_events, 4);
        assert_eq!(options.lookback_hours, 12);
    }

    #[test]
    fn cutoff_subtracts_lookback() {
        let now = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let options = ClusterOptions::default();
        assert_eq!(options.cutoff(now).unwrap(), now - Duration::hours(24));

        let options = ClusterOptions {
            lookback_hours: u32::MAX,
            ..ClusterOptions::default()
        };
        assert!(matches!(
            options.cutoff(now),
            Err(HotspotError::InvalidOptions { .. })
        ));
    }
}
