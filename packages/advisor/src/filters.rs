//! Validation and normalization of model-proposed event filters.
//!
//! The model is asked for a JSON object shaped like
//! [`SafetyQueryFilters`]. Its answer is checked against the same limits
//! the prompt states; anything that fails to parse or validate is
//! replaced by filters derived from the request alone.

use std::collections::HashSet;

use safety_map_advisor_models::{AdvisorRequest, DEFAULT_SUMMARY, SafetyQueryFilters};
use safety_map_event_models::{Category, Location};
use serde::Deserialize;

/// Longest lookback a filter may request.
pub const MAX_TIMEFRAME_MONTHS: u32 = 24;

/// Most categories a model answer may list.
pub const MAX_CATEGORIES: usize = 5;

/// Most keywords a model answer may list.
pub const MAX_KEYWORDS: usize = 6;

/// Accepted keyword length range, in characters.
pub const KEYWORD_LENGTH: std::ops::RangeInclusive<usize> = 2..=60;

/// Smallest radius a filter is clamped to.
pub const MIN_RADIUS_METERS: f64 = 50.0;

/// Largest radius a filter may request.
pub const MAX_RADIUS_METERS: f64 = 25_000.0;

/// Longest summary a model answer may carry.
pub const MAX_SUMMARY_CHARS: usize = 400;

/// The model's answer before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposedFilters {
    timeframe_months: Option<f64>,
    categories: Option<Vec<Category>>,
    location_keywords: Option<Vec<String>>,
    radius_meters: Option<f64>,
    coordinates: Option<Location>,
    summary: Option<String>,
}

impl ProposedFilters {
    fn validate(&self) -> Result<(), String> {
        if let Some(months) = self.timeframe_months
            && !(is_whole(months) && months > 0.0 && months <= f64::from(MAX_TIMEFRAME_MONTHS))
        {
            return Err(format!(
                "timeframeMonths must be an integer in 1..={MAX_TIMEFRAME_MONTHS}, got {months}"
            ));
        }

        if let Some(categories) = &self.categories
            && categories.len() > MAX_CATEGORIES
        {
            return Err(format!(
                "at most {MAX_CATEGORIES} categories allowed, got {}",
                categories.len()
            ));
        }

        if let Some(keywords) = &self.location_keywords {
            if keywords.len() > MAX_KEYWORDS {
                return Err(format!(
                    "at most {MAX_KEYWORDS} keywords allowed, got {}",
                    keywords.len()
                ));
            }
            if let Some(bad) = keywords
                .iter()
                .find(|k| !KEYWORD_LENGTH.contains(&k.chars().count()))
            {
                return Err(format!("keyword {bad:?} has an invalid length"));
            }
        }

        if let Some(radius) = self.radius_meters
            && !(is_whole(radius) && radius > 0.0 && radius <= MAX_RADIUS_METERS)
        {
            return Err(format!(
                "radiusMeters must be an integer in 1..={MAX_RADIUS_METERS}, got {radius}"
            ));
        }

        if let Some(coordinates) = &self.coordinates
            && !coordinates.is_finite()
        {
            return Err("coordinates must be finite".to_string());
        }

        if let Some(summary) = &self.summary
            && !(1..=MAX_SUMMARY_CHARS).contains(&summary.chars().count())
        {
            return Err(format!(
                "summary must be 1..={MAX_SUMMARY_CHARS} characters"
            ));
        }

        Ok(())
    }
}

fn is_whole(value: f64) -> bool {
    value.fract().abs() < f64::EPSILON
}

/// Rounds and clamps a lookback to `1..=24` months.
///
/// Non-finite input yields `None`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn normalize_timeframe(months: f64) -> Option<u32> {
    if !months.is_finite() {
        return None;
    }
    Some(months.round().clamp(1.0, f64::from(MAX_TIMEFRAME_MONTHS)) as u32)
}

/// Clamps a radius to `50..=25_000` meters.
///
/// Non-finite input yields `None`.
#[must_use]
pub fn clamp_radius(meters: f64) -> Option<f64> {
    meters
        .is_finite()
        .then(|| meters.clamp(MIN_RADIUS_METERS, MAX_RADIUS_METERS))
}

/// Removes duplicate categories, keeping first occurrences in order.
#[must_use]
pub fn dedupe_categories(categories: &[Category]) -> Vec<Category> {
    let mut seen = HashSet::new();
    categories
        .iter()
        .copied()
        .filter(|category| seen.insert(*category))
        .collect()
}

/// Trims keywords and drops duplicates and out-of-range lengths, keeping
/// first occurrences in order.
#[must_use]
pub fn dedupe_keywords<'a>(keywords: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .map(str::trim)
        .filter(|k| KEYWORD_LENGTH.contains(&k.chars().count()))
        .filter(|k| seen.insert(*k))
        .map(str::to_string)
        .collect()
}

/// Strips a surrounding Markdown code fence (with optional language tag).
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-');
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Describes the filters in one or two sentences.
#[must_use]
pub fn summarize(filters: &SafetyQueryFilters) -> String {
    let mut parts = Vec::new();

    if let Some(months) = filters.timeframe_months {
        let plural = if months > 1 { "s" } else { "" };
        parts.push(format!("Events from the last {months} month{plural}."));
    }

    if !filters.categories.is_empty() {
        let readable = filters
            .categories
            .iter()
            .map(AsRef::<str>::as_ref)
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("Categories: {readable}."));
    }

    if !filters.location_keywords.is_empty() {
        parts.push(format!(
            "Keyword focus: {}.",
            filters.location_keywords.join(", ")
        ));
    }

    if let Some(radius) = filters.radius_meters {
        parts.push(format!("Radius: ~{radius:.0} meters."));
    }

    if parts.is_empty() {
        DEFAULT_SUMMARY.to_string()
    } else {
        parts.join(" ")
    }
}

/// Filters derived from the request alone.
#[must_use]
pub fn fallback_filters(request: &AdvisorRequest) -> SafetyQueryFilters {
    let timeframe_months = request.timeframe_months.and_then(normalize_timeframe);

    let mut parts = Vec::new();
    if let Some(months) = timeframe_months
        && request.timeframe_months.is_some_and(|m| m.abs() > f64::EPSILON)
    {
        parts.push(format!("Timeframe limited to the last {months} months."));
    }
    if request.coordinates.is_some() {
        parts.push("Using provided coordinates as the central point.".to_string());
    }

    SafetyQueryFilters {
        timeframe_months,
        coordinates: request.coordinates,
        summary: if parts.is_empty() {
            DEFAULT_SUMMARY.to_string()
        } else {
            parts.join(" ")
        },
        ..SafetyQueryFilters::default()
    }
}

/// Turns the model's raw answer into normalized filters.
///
/// Falls back to [`fallback_filters`] when there is no answer or it is not
/// a valid filter object.
#[must_use]
pub fn derive_filters(response: Option<&str>, request: &AdvisorRequest) -> SafetyQueryFilters {
    let Some(response) = response.map(strip_code_fence).filter(|r| !r.is_empty()) else {
        log::debug!("No filter response; using request defaults");
        return fallback_filters(request);
    };

    let proposed: ProposedFilters = match serde_json::from_str(response) {
        Ok(proposed) => proposed,
        Err(e) => {
            log::warn!("Filter response is not a valid filter object: {e}");
            return fallback_filters(request);
        }
    };

    if let Err(message) = proposed.validate() {
        log::warn!("Filter response failed validation: {message}");
        return fallback_filters(request);
    }

    normalize(proposed, request)
}

fn normalize(proposed: ProposedFilters, request: &AdvisorRequest) -> SafetyQueryFilters {
    let timeframe_months = proposed
        .timeframe_months
        .or(request.timeframe_months)
        .and_then(normalize_timeframe);

    let categories = dedupe_categories(proposed.categories.as_deref().unwrap_or_default());

    let location_keywords = dedupe_keywords(
        proposed
            .location_keywords
            .iter()
            .flatten()
            .map(String::as_str)
            .chain(request.area_name.as_deref()),
    );

    let mut filters = SafetyQueryFilters {
        timeframe_months,
        categories,
        location_keywords,
        radius_meters: proposed.radius_meters.and_then(clamp_radius),
        coordinates: proposed.coordinates.or(request.coordinates),
        summary: String::new(),
    };

    filters.summary = match proposed.summary.as_deref().map(str::trim) {
        Some(summary) if !summary.is_empty() => summary.to_string(),
        _ => summarize(&filters),
    };

    filters
}
