#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Database row types.
//!
//! These mirror the `events` and `profiles` tables column for column,
//! including their loose typing: `status` and `category` are plain text
//! and the profile metric columns are nullable. Conversion into the
//! domain types in `safety_map_event_models` and
//! `safety_map_reputation_models` is where that looseness is resolved.

use chrono::{DateTime, Utc};
use safety_map_event_models::{Category, Event, EventStatus, Location};
use safety_map_reputation_models::ReporterProfile;
use serde::{Deserialize, Serialize};

/// A row of the `events` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    /// Primary key (UUID text).
    pub id: String,
    /// Short headline.
    pub title: String,
    /// Free-form details.
    pub description: Option<String>,
    /// Category slug.
    pub category: String,
    /// Free-form subcategory.
    pub subcategory: Option<String>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Human-readable address.
    pub address: Option<String>,
    /// Creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Attached photo URL.
    pub image_url: Option<String>,
    /// Confirmation count.
    pub verification_count: i32,
    /// Whether the event is shown.
    pub is_active: bool,
    /// Affected radius.
    pub radius_meters: Option<f64>,
    /// Moderation status text; may be missing or unknown.
    pub status: Option<String>,
    /// Reporting user.
    pub reporter_id: Option<String>,
}

impl EventRow {
    /// Whether the stored status is one of the known values.
    #[must_use]
    pub fn has_known_status(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.parse::<EventStatus>().is_ok())
    }

    /// Converts the row into an [`Event`].
    ///
    /// Unknown statuses become [`EventStatus::Pending`].
    ///
    /// # Errors
    ///
    /// Returns the offending slug if `category` is not a known category.
    pub fn into_event(self) -> Result<Event, String> {
        let category = self.category.parse::<Category>().map_err(|_| self.category.clone())?;
        Ok(Event {
            status: EventStatus::coerce(self.status.as_deref()),
            id: self.id,
            title: self.title,
            description: self.description,
            category,
            subcategory: self.subcategory,
            location: Location::new(self.lat, self.lng),
            address: self.address,
            created_at: self.created_at,
            image_url: self.image_url,
            verification_count: self.verification_count,
            is_active: self.is_active,
            radius_meters: self.radius_meters,
            reporter_id: self.reporter_id,
        })
    }
}

/// A row of the `profiles` table. Metric columns are nullable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    /// User ID.
    pub id: String,
    /// Cumulative score.
    pub report_score: Option<i32>,
    /// Derived level.
    pub report_level: Option<i32>,
    /// Valid report count.
    pub total_valid_reports: Option<i32>,
    /// Invalid report count.
    pub total_invalid_reports: Option<i32>,
    /// Ban expiry.
    pub report_ban_until: Option<DateTime<Utc>>,
    /// Ban tier.
    pub report_ban_tier: Option<i32>,
    /// Premium expiry.
    pub premium_until: Option<DateTime<Utc>>,
}

fn non_negative(value: Option<i32>) -> u32 {
    value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0)
}

impl From<ProfileRow> for ReporterProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            report_score: row.report_score.unwrap_or(0),
            report_level: non_negative(row.report_level),
            total_valid_reports: non_negative(row.total_valid_reports),
            total_invalid_reports: non_negative(row.total_invalid_reports),
            report_ban_until: row.report_ban_until,
            report_ban_tier: non_negative(row.report_ban_tier),
            premium_until: row.premium_until,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> EventRow {
        EventRow {
            id: "0b7e4a52-2f0e-4c1b-9a51-6f1f3d7f8a10".to_string(),
            title: "Bag snatching".to_string(),
            description: Some("Near the north exit".to_string()),
            category: "crime-alert".to_string(),
            subcategory: Some("pickpockets".to_string()),
            lat: 41.3851,
            lng: 2.1734,
            address: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            image_url: None,
            verification_count: 4,
            is_active: true,
            radius_meters: Some(150.0),
            status: Some("spam".to_string()),
            reporter_id: Some("user-9".to_string()),
        }
    }

    #[test]
    fn converts_known_values() {
        let event = row().into_event().unwrap();
        assert_eq!(event.category, Category::CrimeAlert);
        assert_eq!(event.status, EventStatus::Spam);
        assert_eq!(event.location, Location::new(41.3851, 2.1734));
        assert_eq!(event.verification_count, 4);
    }

    #[test]
    fn unknown_status_coerces_to_pending() {
        let mut row = row();
        row.status = Some("archived".to_string());
        assert!(!row.has_known_status());
        assert_eq!(row.into_event().unwrap().status, EventStatus::Pending);

        let mut row = self::row();
        row.status = None;
        assert_eq!(row.into_event().unwrap().status, EventStatus::Pending);
    }

    #[test]
    fn unknown_category_is_an_error() {
        let mut row = row();
        row.category = "weather".to_string();
        assert_eq!(row.into_event().unwrap_err(), "weather");
    }

    #[test]
    fn null_profile_metrics_default_to_zero() {
        let profile = ReporterProfile::from(ProfileRow {
            id: "u1".to_string(),
            report_score: Some(-4),
            report_ban_tier: Some(-1),
            ..ProfileRow::default()
        });
        assert_eq!(profile, {
            let mut expected = ReporterProfile::new("u1");
            expected.report_score = -4;
            expected
        });
    }
}
