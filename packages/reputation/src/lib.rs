#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reporter score, level, ban, and premium transitions.
//!
//! The engine is incremental: each moderation status change is applied as
//! a delta between the previous and next status, never by recounting the
//! reporter's full history. Applying every transition a report has gone
//! through yields the same counts and score as scoring its final status
//! once.
//!
//! All time arithmetic is relative to an explicit `now`.

use chrono::{DateTime, Duration, Utc};
use safety_map_event_models::EventStatus;
use safety_map_reputation_models::ReporterProfile;

/// Score needed per level.
pub const LEVEL_SCORE_STEP: i32 = 20;

/// Invalid reports needed per ban tier.
pub const INVALID_REPORTS_PER_TIER: u32 = 3;

/// Ban length in days for tier 1, 2, and 3+.
pub const BAN_DURATIONS_DAYS: [i64; 3] = [1, 2, 7];

/// Premium days granted per level gained.
pub const PREMIUM_DAYS_PER_LEVEL: i64 = 7;

/// Points a report in the given status contributes to the score.
#[must_use]
pub const fn status_points(status: EventStatus) -> i32 {
    match status {
        EventStatus::Pending => 0,
        EventStatus::Valid => 1,
        EventStatus::Spam | EventStatus::False => -1,
    }
}

/// Per-field changes caused by one status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionDelta {
    /// Change to `report_score`.
    pub score: i32,
    /// Change to `total_valid_reports` (before clamping).
    pub valid: i32,
    /// Change to `total_invalid_reports` (before clamping).
    pub invalid: i32,
}

impl TransitionDelta {
    /// Computes the delta for moving a report from `previous` to `next`.
    #[must_use]
    pub fn between(previous: EventStatus, next: EventStatus) -> Self {
        Self {
            score: status_points(next) - status_points(previous),
            valid: i32::from(next.is_valid()) - i32::from(previous.is_valid()),
            invalid: i32::from(next.is_invalid()) - i32::from(previous.is_invalid()),
        }
    }

    /// Whether the transition changes nothing.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.score == 0 && self.valid == 0 && self.invalid == 0
    }
}

/// Ban tier and expiry after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanState {
    /// Resulting tier.
    pub tier: u32,
    /// Resulting expiry.
    pub until: Option<DateTime<Utc>>,
}

/// Level reached at `score`. Negative scores are level 0.
#[must_use]
pub const fn level_for_score(score: i32) -> u32 {
    if score <= 0 {
        0
    } else {
        score.unsigned_abs() / LEVEL_SCORE_STEP.unsigned_abs()
    }
}

/// Ban tier reached with `invalid_reports` invalid reports.
#[must_use]
pub const fn tier_for_invalid(invalid_reports: u32) -> u32 {
    invalid_reports / INVALID_REPORTS_PER_TIER
}

/// Ban length for a tier; tiers past the schedule use the last entry.
///
/// Returns `None` for tier 0.
#[must_use]
pub fn ban_duration(tier: u32) -> Option<Duration> {
    let tier = usize::try_from(tier).ok()?;
    if tier == 0 {
        return None;
    }
    let idx = tier.min(BAN_DURATIONS_DAYS.len()) - 1;
    Some(Duration::days(BAN_DURATIONS_DAYS[idx]))
}

/// Resolves the ban after the invalid count moved the tier from
/// `previous_tier` to `next_tier`.
///
/// An escalation issues a fresh ban extending from the later of `now` and
/// the current expiry. Dropping to tier 0 clears the ban. Otherwise the
/// current expiry is kept untouched.
#[must_use]
pub fn resolve_ban(
    previous_tier: u32,
    next_tier: u32,
    current_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> BanState {
    if next_tier > previous_tier {
        let base = current_until.filter(|until| *until > now).unwrap_or(now);
        return BanState {
            tier: next_tier,
            until: ban_duration(next_tier).map(|duration| base + duration),
        };
    }

    if next_tier == 0 {
        return BanState {
            tier: 0,
            until: None,
        };
    }

    BanState {
        tier: next_tier,
        until: current_until,
    }
}

/// Extends premium access by [`PREMIUM_DAYS_PER_LEVEL`] per level gained.
///
/// Losing levels never revokes premium already granted.
#[must_use]
pub fn extend_premium(
    previous_level: u32,
    next_level: u32,
    current_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let gained = next_level.saturating_sub(previous_level);
    if gained == 0 {
        return current_until;
    }

    let base = current_until.filter(|until| *until > now).unwrap_or(now);
    Some(base + Duration::days(i64::from(gained) * PREMIUM_DAYS_PER_LEVEL))
}

/// Applies one status transition to a reporter's profile.
///
/// A transition to the same status returns the profile unchanged.
#[must_use]
pub fn apply_transition(
    profile: &ReporterProfile,
    previous: EventStatus,
    next: EventStatus,
    now: DateTime<Utc>,
) -> ReporterProfile {
    if previous == next {
        return profile.clone();
    }

    let delta = TransitionDelta::between(previous, next);

    let report_score = profile.report_score.saturating_add(delta.score);
    let total_valid_reports = apply_count_delta(profile.total_valid_reports, delta.valid);
    let total_invalid_reports = apply_count_delta(profile.total_invalid_reports, delta.invalid);
    let report_level = level_for_score(report_score);

    let ban = resolve_ban(
        profile.report_ban_tier,
        tier_for_invalid(total_invalid_reports),
        profile.report_ban_until,
        now,
    );

    let premium_until = extend_premium(
        profile.report_level,
        report_level,
        profile.premium_until,
        now,
    );

    if ban.tier > profile.report_ban_tier {
        log::info!(
            "Reporter {} escalated to ban tier {} until {:?}",
            profile.id,
            ban.tier,
            ban.until
        );
    }
    if report_level > profile.report_level {
        log::info!(
            "Reporter {} reached level {report_level}; premium until {premium_until:?}",
            profile.id
        );
    }

    ReporterProfile {
        id: profile.id.clone(),
        report_score,
        report_level,
        total_valid_reports,
        total_invalid_reports,
        report_ban_until: ban.until,
        report_ban_tier: ban.tier,
        premium_until,
    }
}

/// Adds a signed delta to a count, clamping at zero.
const fn apply_count_delta(count: u32, delta: i32) -> u32 {
    if delta >= 0 {
        count.saturating_add(delta.unsigned_abs())
    } else {
        count.saturating_sub(delta.unsigned_abs())
    }
}
