#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety event taxonomy, moderation status, and report types.
//!
//! This crate defines the shared vocabulary of the safety map: the event
//! categories users can report, the moderation status lifecycle of a
//! report, and the minimal geolocated [`Report`] shape consumed by the
//! hotspot detector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Subcategory used by the default hotspot policy.
pub const PICKPOCKETS_SUBCATEGORY: &str = "pickpockets";

/// Top-level event categories a user can report.
#[derive(
    Debug,
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
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Category {
    /// Immediate danger to people in the area
    Danger,
    /// Obstructed street, sidewalk, or path
    BlockedPath,
    /// Public gathering or organized event
    Event,
    /// Demonstration or protest
    Protest,
    /// Crime warning (pickpockets, theft, assault, ...)
    CrimeAlert,
}

impl Category {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Danger,
            Self::BlockedPath,
            Self::Event,
            Self::Protest,
            Self::CrimeAlert,
        ]
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Danger => "Danger",
            Self::BlockedPath => "Blocked path",
            Self::Event => "Event",
            Self::Protest => "Protest",
            Self::CrimeAlert => "Crime alert",
        }
    }
}

/// Moderation status of a report.
///
/// Every report starts as [`EventStatus::Pending`]. Moderators (or the
/// reporter) move it to one of the terminal-looking states, but any state
/// can transition to any other; each transition is scored once against the
/// reporter's profile.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventStatus {
    /// Awaiting review
    #[default]
    Pending,
    /// Confirmed as a genuine report
    Valid,
    /// Rejected as spam
    Spam,
    /// Rejected as false information
    False,
}

impl EventStatus {
    /// Coerces a loosely-typed stored status into a known variant.
    ///
    /// Missing or unknown values are treated as [`EventStatus::Pending`].
    #[must_use]
    pub fn coerce(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::Pending)
    }

    /// Whether this status counts towards the reporter's valid total.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Whether this status counts towards the reporter's invalid total.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Spam | Self::False)
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Pending, Self::Valid, Self::Spam, Self::False]
    }
}

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Location {
    /// Creates a new location.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// A geolocated, time-stamped report as consumed by clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Event ID.
    pub id: String,
    /// Top-level category.
    pub category: Category,
    /// Free-form subcategory (e.g. `"pickpockets"`).
    pub subcategory: Option<String>,
    /// Where the report was filed.
    pub location: Location,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
}

/// A stored safety event as returned to clients.
///
/// The `status` column is loosely typed in storage; it is coerced with
/// [`EventStatus::coerce`] when the row is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event ID (UUID).
    pub id: String,
    /// Short headline.
    pub title: String,
    /// Free-form details.
    pub description: Option<String>,
    /// Top-level category.
    pub category: Category,
    /// Free-form subcategory.
    pub subcategory: Option<String>,
    /// Where the event happened.
    pub location: Location,
    /// Human-readable address, if geocoded.
    pub address: Option<String>,
    /// When the event was reported.
    pub created_at: DateTime<Utc>,
    /// Attached photo URL.
    pub image_url: Option<String>,
    /// Number of users who confirmed the event.
    pub verification_count: i32,
    /// Whether the event is still shown on the map.
    pub is_active: bool,
    /// Affected radius drawn around the event.
    pub radius_meters: Option<f64>,
    /// Moderation status.
    pub status: EventStatus,
    /// User who filed the report, if known.
    pub reporter_id: Option<String>,
}

impl Event {
    /// Projects the event onto the minimal shape used by clustering.
    #[must_use]
    pub fn to_report(&self) -> Report {
        Report {
            id: self.id.clone(),
            category: self.category,
            subcategory: self.subcategory.clone(),
            location: self.location,
            created_at: self.created_at,
        }
    }
}

/// A report submitted by a user, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    /// Short headline.
    pub title: String,
    /// Free-form details.
    #[serde(default)]
    pub description: Option<String>,
    /// Top-level category.
    pub category: Category,
    /// Free-form subcategory.
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Where the event happened.
    pub location: Location,
    /// Human-readable address.
    #[serde(default)]
    pub address: Option<String>,
    /// Attached photo URL.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Affected radius.
    #[serde(default)]
    pub radius_meters: Option<f64>,
    /// Submitting user, if signed in.
    #[serde(default)]
    pub reporter_id: Option<String>,
}

impl NewEvent {
    /// Checks that the report can be stored.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found: a blank title,
    /// a coordinate outside WGS84 bounds, or a non-positive radius.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        let Location { lat, lng } = self.location;
        if !self.location.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lng)
        {
            return Err(format!("location ({lat}, {lng}) is out of range"));
        }
        match self.radius_meters {
            Some(radius) if !(radius.is_finite() && radius > 0.0) => {
                Err(format!("radiusMeters must be positive, got {radius}"))
            }
            _ => Ok(()),
        }
    }
}

/// Selects the reports that participate in a clustering run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilter {
    /// Category that must match exactly.
    pub category: Category,
    /// Subcategory that must match exactly, or `None` to accept any.
    pub subcategory: Option<String>,
}

impl ReportFilter {
    /// The pickpocket hotspot policy: `crime-alert` / `pickpockets`.
    #[must_use]
    pub fn pickpockets() -> Self {
        Self {
            category: Category::CrimeAlert,
            subcategory: Some(PICKPOCKETS_SUBCATEGORY.to_string()),
        }
    }

    /// Whether the given report matches this filter.
    #[must_use]
    pub fn matches(&self, report: &Report) -> bool {
        if report.category != self.category {
            return false;
        }
        match &self.subcategory {
            Some(expected) => report.subcategory.as_deref() == Some(expected.as_str()),
            None => true,
        }
    }
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self::pickpockets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(category: Category, subcategory: Option<&str>) -> Report {
        Report {
            id: "r1".to_string(),
            category,
            subcategory: subcategory.map(str::to_string),
            location: Location::new(0.0, 0.0),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn category_uses_kebab_case_on_the_wire() {
        assert_eq!(Category::CrimeAlert.to_string(), "crime-alert");
        assert_eq!("blocked-path".parse::<Category>().unwrap(), Category::BlockedPath);
        let json = serde_json::to_string(&Category::CrimeAlert).unwrap();
        assert_eq!(json, "\"crime-alert\"");
    }

    #[test]
    fn status_coercion_defaults_to_pending() {
        assert_eq!(EventStatus::coerce(Some("valid")), EventStatus::Valid);
        assert_eq!(EventStatus::coerce(Some("false")), EventStatus::False);
        assert_eq!(EventStatus::coerce(Some("VALID")), EventStatus::Pending);
        assert_eq!(EventStatus::coerce(Some("archived")), EventStatus::Pending);
        assert_eq!(EventStatus::coerce(None), EventStatus::Pending);
    }

    #[test]
    fn status_classification() {
        assert!(EventStatus::Valid.is_valid());
        assert!(!EventStatus::Pending.is_valid());
        assert!(EventStatus::Spam.is_invalid());
        assert!(EventStatus::False.is_invalid());
        assert!(!EventStatus::Valid.is_invalid());
        assert!(!EventStatus::Pending.is_invalid());
    }

    #[test]
    fn pickpocket_filter_requires_both_fields() {
        let filter = ReportFilter::pickpockets();
        assert!(filter.matches(&report(Category::CrimeAlert, Some("pickpockets"))));
        assert!(!filter.matches(&report(Category::CrimeAlert, Some("assault"))));
        assert!(!filter.matches(&report(Category::CrimeAlert, None)));
        assert!(!filter.matches(&report(Category::Danger, Some("pickpockets"))));
    }

    #[test]
    fn filter_without_subcategory_accepts_any() {
        let filter = ReportFilter {
            category: Category::Protest,
            subcategory: None,
        };
        assert!(filter.matches(&report(Category::Protest, None)));
        assert!(filter.matches(&report(Category::Protest, Some("march"))));
        assert!(!filter.matches(&report(Category::Event, None)));
    }

    #[test]
    fn event_projects_to_report() {
        let event = Event {
            id: "e1".to_string(),
            title: "Phone snatched".to_string(),
            description: None,
            category: Category::CrimeAlert,
            subcategory: Some("pickpockets".to_string()),
            location: Location::new(41.88, -87.63),
            address: Some("Union Station".to_string()),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            image_url: None,
            verification_count: 2,
            is_active: true,
            radius_meters: None,
            status: EventStatus::Valid,
            reporter_id: Some("u1".to_string()),
        };

        let report = event.to_report();
        assert_eq!(report.id, "e1");
        assert!(ReportFilter::pickpockets().matches(&report));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["verificationCount"], 2);
        assert_eq!(json["status"], "valid");
        assert_eq!(json["reporterId"], "u1");
    }

    fn new_event() -> NewEvent {
        NewEvent {
            title: "Protest at the square".to_string(),
            description: None,
            category: Category::Protest,
            subcategory: None,
            location: Location::new(48.8566, 2.3522),
            address: None,
            image_url: None,
            radius_meters: Some(300.0),
            reporter_id: None,
        }
    }

    #[test]
    fn new_event_validation() {
        assert!(new_event().validate().is_ok());

        let mut blank = new_event();
        blank.title = "   ".to_string();
        assert_eq!(blank.validate().unwrap_err(), "title must not be empty");

        let mut off_map = new_event();
        off_map.location = Location::new(91.0, 0.0);
        assert!(off_map.validate().is_err());

        let mut nan = new_event();
        nan.location = Location::new(f64::NAN, 0.0);
        assert!(nan.validate().is_err());

        let mut zero_radius = new_event();
        zero_radius.radius_meters = Some(0.0);
        assert!(zero_radius.validate().is_err());
    }

    #[test]
    fn new_event_optional_fields_default() {
        let event: NewEvent = serde_json::from_str(
            r#"{"title":"Flooded underpass","category":"blocked-path","location":{"lat":1.0,"lng":2.0}}"#,
        )
        .unwrap();
        assert_eq!(event.category, Category::BlockedPath);
        assert!(event.reporter_id.is_none());
        assert!(event.radius_meters.is_none());
    }

    #[test]
    fn location_finiteness() {
        assert!(Location::new(41.88, -87.63).is_finite());
        assert!(!Location::new(f64::NAN, 0.0).is_finite());
        assert!(!Location::new(0.0, f64::INFINITY).is_finite());
    }
}
