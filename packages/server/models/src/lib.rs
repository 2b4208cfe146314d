#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the safety map server.
//!
//! Events are returned in their domain shape from
//! `safety_map_event_models`; this crate only holds the envelopes and
//! parameters specific to the HTTP surface.

use chrono::{DateTime, Utc};
use safety_map_advisor_models::AdvisorRequest;
use safety_map_hotspot::{ClusterOptions, HotspotCluster};
use safety_map_reputation_models::ReporterProfile;
use serde::{Deserialize, Serialize};

/// Upper bound on `limit` for free-text search.
pub const MAX_SEARCH_LIMIT: u32 = 50;

/// Default page size of `GET /api/events`.
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
}

/// Body of `POST /api/events/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateBody {
    /// Requested status, parsed strictly.
    pub status: String,
}

/// Query parameters for `GET /api/events/search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQueryParams {
    /// Free text.
    pub q: Option<String>,
    /// Maximum results.
    pub limit: Option<u32>,
}

/// Query parameters for `GET /api/events`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEventsParams {
    /// Maximum results.
    pub limit: Option<u32>,
}

/// Response of `GET /api/profiles/{id}`: the stored profile plus the
/// ban and premium flags evaluated at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProfile {
    /// Stored reputation state.
    #[serde(flatten)]
    pub profile: ReporterProfile,
    /// Whether reporting is currently blocked.
    pub is_banned: bool,
    /// Whether premium access is currently granted.
    pub has_premium: bool,
}

impl ApiProfile {
    /// Evaluates the time-dependent flags of `profile` at `now`.
    #[must_use]
    pub fn at(profile: ReporterProfile, now: DateTime<Utc>) -> Self {
        Self {
            is_banned: profile.is_banned_at(now),
            has_premium: profile.has_premium_at(now),
            profile,
        }
    }
}

/// Response of `GET /api/hotspots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHotspots {
    /// The instant clustering was evaluated at.
    pub generated_at: DateTime<Utc>,
    /// Options the clusters were computed with.
    pub options: ClusterOptions,
    /// Detected hotspots.
    pub clusters: Vec<HotspotCluster>,
}

/// Body of `POST /api/advisor/filters`: the user's request plus the raw
/// text of the filter proposal, if one was obtained.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDerivationBody {
    /// The advisor request.
    pub request: AdvisorRequest,
    /// Raw proposal text; may be fenced JSON or garbage.
    pub response: Option<String>,
}
