#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reporter trust profile types.
//!
//! A [`ReporterProfile`] is the persistent reputation state of one user.
//! It is only ever mutated by applying moderation status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent reputation state of a reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReporterProfile {
    /// User ID (same as the auth user ID).
    pub id: String,
    /// Cumulative score; may go negative.
    pub report_score: i32,
    /// Level derived from the non-negative part of the score.
    pub report_level: u32,
    /// Reports currently marked valid.
    pub total_valid_reports: u32,
    /// Reports currently marked spam or false.
    pub total_invalid_reports: u32,
    /// Reporting is blocked until this instant, if set.
    pub report_ban_until: Option<DateTime<Utc>>,
    /// Escalation tier reached by accumulated invalid reports.
    pub report_ban_tier: u32,
    /// Premium access is granted until this instant, if set.
    pub premium_until: Option<DateTime<Utc>>,
}

impl ReporterProfile {
    /// A fresh profile with every metric at zero.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            report_score: 0,
            report_level: 0,
            total_valid_reports: 0,
            total_invalid_reports: 0,
            report_ban_until: None,
            report_ban_tier: 0,
            premium_until: None,
        }
    }

    /// Whether the reporter is banned at `now`.
    #[must_use]
    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        self.report_ban_until.is_some_and(|until| until > now)
    }

    /// Whether the reporter has premium access at `now`.
    #[must_use]
    pub fn has_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.premium_until.is_some_and(|until| until > now)
    }
}
