#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety advisor request and derived filter types.

use safety_map_event_models::{Category, Location};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Summary used when nothing more specific could be derived.
pub const DEFAULT_SUMMARY: &str =
    "No additional filters were derived; using defaults from the request.";

/// What kind of answer the user is after.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// Events at or near one address
    SpecificAddressQuery,
    /// General safety picture for an area
    #[default]
    BroadAreaSafetyGuidance,
    /// Planning around an upcoming gathering
    EventPlanning,
    /// Checking a route before travelling it
    RouteSafetyCheck,
}

/// An advisor question as sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorRequest {
    /// Kind of answer requested.
    #[serde(default)]
    pub request_type: RequestType,
    /// The user's question.
    pub user_query: String,
    /// Named area the question is about, if any.
    #[serde(default)]
    pub area_name: Option<String>,
    /// Declared lookback in months, if any.
    #[serde(default)]
    pub timeframe_months: Option<f64>,
    /// Declared center point, if any.
    #[serde(default)]
    pub coordinates: Option<Location>,
}

/// Normalized event filters derived from an advisor question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyQueryFilters {
    /// Only events from the last N months (`1..=24`).
    pub timeframe_months: Option<u32>,
    /// Only events in these categories; empty means all.
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Free-text keywords matched against address, title, and description.
    #[serde(default)]
    pub location_keywords: Vec<String>,
    /// Search radius around `coordinates`.
    pub radius_meters: Option<f64>,
    /// Search center.
    pub coordinates: Option<Location>,
    /// One-sentence description of the filters.
    #[serde(default = "default_summary")]
    pub summary: String,
}

fn default_summary() -> String {
    DEFAULT_SUMMARY.to_string()
}

impl Default for SafetyQueryFilters {
    fn default() -> Self {
        Self {
            timeframe_months: None,
            categories: vec![],
            location_keywords: vec![],
            radius_meters: None,
            coordinates: None,
            summary: default_summary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_type_wire_format() {
        assert_eq!(
            RequestType::RouteSafetyCheck.to_string(),
            "ROUTE_SAFETY_CHECK"
        );
        let parsed: RequestType = serde_json::from_str("\"EVENT_PLANNING\"").unwrap();
        assert_eq!(parsed, RequestType::EventPlanning);
    }

    #[test]
    fn minimal_request_deserializes() {
        let request: AdvisorRequest =
            serde_json::from_str(r#"{"userQuery": "Is the old town safe at night?"}"#).unwrap();
        assert_eq!(request.request_type, RequestType::BroadAreaSafetyGuidance);
        assert!(request.area_name.is_none());
        assert!(request.coordinates.is_none());
    }

    #[test]
    fn filters_default_to_unfiltered() {
        let filters: SafetyQueryFilters = serde_json::from_str("{}").unwrap();
        assert_eq!(filters, SafetyQueryFilters::default());
        assert_eq!(filters.summary, DEFAULT_SUMMARY);
    }
}
