//! Event query predicates built from normalized filters.
//!
//! Predicates are AND-ed together. The bounding-box predicates are a
//! coarse pre-filter only: callers that need the true radius must also
//! apply [`EventQuery::within_radius`] to the rows they get back.

use chrono::{DateTime, Months, Utc};
use safety_map_advisor_models::SafetyQueryFilters;
use safety_map_event_models::{Category, Location};
use safety_map_geo::{bounding_box, haversine_meters, validate};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::AdvisorError;

/// Default number of results for free-text search.
pub const DEFAULT_SEARCH_LIMIT: u32 = 8;

/// Escape character used in `LIKE` patterns.
pub const LIKE_ESCAPE: char = '\\';

/// Text columns keyword predicates can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SearchField {
    /// Event headline
    Title,
    /// Event details
    Description,
    /// Geocoded address
    Address,
}

/// Columns searched by advisor keywords.
pub const KEYWORD_FIELDS: [SearchField; 3] = [
    SearchField::Address,
    SearchField::Title,
    SearchField::Description,
];

/// Columns searched by free-text search.
pub const SEARCH_FIELDS: [SearchField; 3] = [
    SearchField::Title,
    SearchField::Description,
    SearchField::Address,
];

/// A single event filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Predicate {
    /// `created_at >= since`
    CreatedAtOrAfter {
        /// Inclusive lower bound.
        since: DateTime<Utc>,
    },
    /// `category IN (..)`
    CategoryIn {
        /// Accepted categories; never empty.
        categories: Vec<Category>,
    },
    /// Any of `fields` matches any of `patterns` (case-insensitive `LIKE`).
    AnyFieldContains {
        /// Columns to search.
        fields: Vec<SearchField>,
        /// Escaped `LIKE` patterns, already wrapped in `%`.
        patterns: Vec<String>,
    },
    /// `lat BETWEEN min AND max`
    LatBetween {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// `lng BETWEEN min AND max`
    LngBetween {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

/// Exact circle the bounding-box predicates approximate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadiusFilter {
    /// Circle center.
    pub center: Location,
    /// Circle radius.
    pub radius_meters: f64,
}

/// A conjunction of predicates over the `events` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    /// Conditions, AND-ed.
    pub predicates: Vec<Predicate>,
    /// Set when the query has a radius; use for post-filtering.
    pub radius: Option<RadiusFilter>,
}

impl EventQuery {
    /// Whether a location passes the exact radius check.
    ///
    /// Always `true` for queries without a radius.
    #[must_use]
    pub fn within_radius(&self, location: &Location) -> bool {
        self.radius.is_none_or(|radius| {
            location.is_finite()
                && haversine_meters(&radius.center, location) <= radius.radius_meters
        })
    }
}

/// Escapes `LIKE` metacharacters so the text matches literally.
#[must_use]
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// `%keyword%` with the keyword escaped, or `None` for keywords too short
/// to be useful.
#[must_use]
pub fn contains_pattern(keyword: &str) -> Option<String> {
    let keyword = keyword.trim();
    (keyword.chars().count() > 1).then(|| format!("%{}%", escape_like(keyword)))
}

/// Pattern for free-text search: each whitespace-separated term escaped,
/// joined and wrapped with `%`.
///
/// Returns `None` for blank input.
#[must_use]
pub fn search_pattern(text: &str) -> Option<String> {
    let terms: Vec<String> = text.split_whitespace().map(escape_like).collect();
    if terms.is_empty() {
        return None;
    }
    Some(format!("%{}%", terms.join("%")))
}

/// Builds the query for a filter set, evaluated at `now`.
///
/// # Errors
///
/// Returns [`AdvisorError::Validation`] if the timeframe is zero or
/// reaches before the representable calendar, or if the radius or
/// coordinates are not usable.
pub fn build_event_query(
    filters: &SafetyQueryFilters,
    now: DateTime<Utc>,
) -> Result<EventQuery, AdvisorError> {
    let mut query = EventQuery::default();

    if let Some(months) = filters.timeframe_months {
        if months == 0 {
            return Err(AdvisorError::Validation {
                message: "timeframe must be at least one month".to_string(),
            });
        }
        let since = now
            .checked_sub_months(Months::new(months))
            .ok_or_else(|| AdvisorError::Validation {
                message: format!("timeframe of {months} months is out of range"),
            })?;
        query.predicates.push(Predicate::CreatedAtOrAfter { since });
    }

    if !filters.categories.is_empty() {
        query.predicates.push(Predicate::CategoryIn {
            categories: filters.categories.clone(),
        });
    }

    let patterns: Vec<String> = filters
        .location_keywords
        .iter()
        .filter_map(|k| contains_pattern(k))
        .collect();
    if !patterns.is_empty() {
        query.predicates.push(Predicate::AnyFieldContains {
            fields: KEYWORD_FIELDS.to_vec(),
            patterns,
        });
    }

    if let (Some(radius_meters), Some(center)) = (filters.radius_meters, filters.coordinates) {
        validate(&center)?;
        if radius_meters <= 0.0 {
            return Err(AdvisorError::Validation {
                message: format!("radius must be positive, got {radius_meters}"),
            });
        }
        let bbox = bounding_box(&center, radius_meters)?;
        query.predicates.push(Predicate::LatBetween {
            min: bbox.min_lat,
            max: bbox.max_lat,
        });
        query.predicates.push(Predicate::LngBetween {
            min: bbox.min_lng,
            max: bbox.max_lng,
        });
        query.radius = Some(RadiusFilter {
            center,
            radius_meters,
        });
    } else if let Some(center) = filters.coordinates {
        validate(&center)?;
    }

    log::debug!(
        "Built event query with {} predicate(s)",
        query.predicates.len()
    );

    Ok(query)
}
