#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Event moderation.
//!
//! [`update_event_status`] moves an event to a new moderation status and
//! applies the reputation consequences to the event's reporter. The store
//! is abstracted behind [`ModerationStore`] so the same sequence can run
//! against a plain connection or inside a transaction.
//!
//! The four store calls are issued strictly in order: load event, write
//! event status, load-or-create profile, write profile. Without a
//! transactional store, a failure after the event write leaves the profile
//! one transition behind.
//!
//! [`ensure_can_report`] is the gate new reports pass before they are
//! stored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use safety_map_event_models::{Event, EventStatus};
use safety_map_reputation::apply_transition;
use safety_map_reputation_models::ReporterProfile;
use thiserror::Error;

/// Errors that can occur while moderating an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModerationError {
    /// The event does not exist.
    #[error("Event not found: {event_id}")]
    NotFound {
        /// ID that was looked up.
        event_id: String,
    },

    /// The request was malformed.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of what went wrong.
        message: String,
    },

    /// The reporter is serving a reporting ban.
    #[error("Reporting is disabled for {reporter_id} until {until}")]
    Banned {
        /// Banned reporter.
        reporter_id: String,
        /// Ban expiry.
        until: DateTime<Utc>,
    },

    /// The underlying store failed.
    #[error("{message}")]
    Store {
        /// Store error message, unchanged.
        message: String,
    },
}

impl ModerationError {
    /// Wraps any store failure, keeping its message.
    #[must_use]
    pub fn store(error: impl std::fmt::Display) -> Self {
        Self::Store {
            message: error.to_string(),
        }
    }
}

/// Persistence operations the moderation service needs.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Loads an event, or `None` if it does not exist.
    async fn get_event_by_id(&self, event_id: &str) -> Result<Option<Event>, ModerationError>;

    /// Writes the status column and returns the updated event, or `None`
    /// if the row disappeared.
    async fn update_event_status_column(
        &self,
        event_id: &str,
        status: EventStatus,
    ) -> Result<Option<Event>, ModerationError>;

    /// Loads a reporter's profile, inserting a zeroed one if absent.
    async fn get_or_create_profile(
        &self,
        reporter_id: &str,
    ) -> Result<ReporterProfile, ModerationError>;

    /// Writes every metric column of the profile.
    async fn update_profile(&self, profile: &ReporterProfile) -> Result<(), ModerationError>;
}

/// Parses a client-supplied status strictly.
///
/// Unlike [`EventStatus::coerce`], unknown values are rejected.
///
/// # Errors
///
/// Returns [`ModerationError::Validation`] if `raw` is not one of the four
/// statuses.
pub fn parse_status(raw: &str) -> Result<EventStatus, ModerationError> {
    raw.trim()
        .parse()
        .map_err(|_| ModerationError::Validation {
            message: format!(
                "Unknown status {raw:?}; expected one of: {}",
                EventStatus::all()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
}

/// Gate applied before a new report is accepted.
///
/// Anonymous reports (`None`) and reporters without an active ban pass.
///
/// # Errors
///
/// Returns [`ModerationError::Banned`] while the profile's ban has not
/// expired at `now`.
pub fn ensure_can_report(
    profile: Option<&ReporterProfile>,
    now: DateTime<Utc>,
) -> Result<(), ModerationError> {
    let Some(profile) = profile.filter(|profile| profile.is_banned_at(now)) else {
        return Ok(());
    };
    let until = profile.report_ban_until.unwrap_or(now);
    log::info!("Rejecting report from {}: banned until {until}", profile.id);
    Err(ModerationError::Banned {
        reporter_id: profile.id.clone(),
        until,
    })
}

/// Moves an event to `next` and applies the reputation delta to its
/// reporter.
///
/// Returns the event unchanged when it is already in `next`.
///
/// # Errors
///
/// * [`ModerationError::NotFound`] if the event does not exist
/// * [`ModerationError::Store`] if any store call fails
pub async fn update_event_status(
    store: &dyn ModerationStore,
    event_id: &str,
    next: EventStatus,
    now: DateTime<Utc>,
) -> Result<Event, ModerationError> {
    let current = store
        .get_event_by_id(event_id)
        .await
        .inspect_err(|e| log::error!("Failed to load event {event_id}: {e}"))?
        .ok_or_else(|| ModerationError::NotFound {
            event_id: event_id.to_string(),
        })?;

    let previous = current.status;
    if previous == next {
        log::debug!("Event {event_id} already {next}; nothing to do");
        return Ok(current);
    }

    log::debug!("Event {event_id}: {previous} -> {next}");

    let updated = store
        .update_event_status_column(event_id, next)
        .await
        .inspect_err(|e| log::error!("Failed to update event {event_id} status: {e}"))?
        .ok_or_else(|| {
            log::error!("Event {event_id} vanished during status update");
            ModerationError::NotFound {
                event_id: event_id.to_string(),
            }
        })?;

    if let Some(reporter_id) = current.reporter_id.as_deref() {
        apply_reporter_metrics(store, reporter_id, previous, next, now).await?;
    }

    Ok(updated)
}

async fn apply_reporter_metrics(
    store: &dyn ModerationStore,
    reporter_id: &str,
    previous: EventStatus,
    next: EventStatus,
    now: DateTime<Utc>,
) -> Result<(), ModerationError> {
    let profile = store
        .get_or_create_profile(reporter_id)
        .await
        .inspect_err(|e| log::error!("Failed to load profile {reporter_id}: {e}"))?;

    let updated = apply_transition(&profile, previous, next, now);
    log::debug!(
        "Reporter {reporter_id}: score {} -> {}, level {} -> {}",
        profile.report_score,
        updated.report_score,
        profile.report_level,
        updated.report_level
    );

    store
        .update_profile(&updated)
        .await
        .inspect_err(|e| log::error!("Failed to update profile {reporter_id}: {e}"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Duration;
    use safety_map_event_models::{Category, Location};
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Failures {
        load_event: bool,
        update_event: bool,
        load_profile: bool,
        update_profile: bool,
    }

    #[derive(Default)]
    struct MemoryStore {
        events: Mutex<BTreeMap<String, Event>>,
        profiles: Mutex<BTreeMap<String, ReporterProfile>>,
        calls: Mutex<Vec<&'static str>>,
        failures: Failures,
    }

    impl MemoryStore {
        async fn with_event(event: Event) -> Self {
            let store = Self::default();
            store.events.lock().await.insert(event.id.clone(), event);
            store
        }

        async fn record(&self, call: &'static str, fail: bool) -> Result<(), ModerationError> {
            self.calls.lock().await.push(call);
            if fail {
                return Err(ModerationError::store(format!("{call} failed")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ModerationStore for MemoryStore {
        async fn get_event_by_id(&self, event_id: &str) -> Result<Option<Event>, ModerationError> {
            self.record("get_event", self.failures.load_event).await?;
            Ok(self.events.lock().await.get(event_id).cloned())
        }

        async fn update_event_status_column(
            &self,
            event_id: &str,
            status: EventStatus,
        ) -> Result<Option<Event>, ModerationError> {
            self.record("update_event", self.failures.update_event)
                .await?;
            let mut events = self.events.lock().await;
            Ok(events.get_mut(event_id).map(|event| {
                event.status = status;
                event.clone()
            }))
        }

        async fn get_or_create_profile(
            &self,
            reporter_id: &str,
        ) -> Result<ReporterProfile, ModerationError> {
            self.record("get_profile", self.failures.load_profile)
                .await?;
            let mut profiles = self.profiles.lock().await;
            Ok(profiles
                .entry(reporter_id.to_string())
                .or_insert_with(|| ReporterProfile::new(reporter_id))
                .clone())
        }

        async fn update_profile(&self, profile: &ReporterProfile) -> Result<(), ModerationError> {
            self.record("update_profile", self.failures.update_profile)
                .await?;
            self.profiles
                .lock()
                .await
                .insert(profile.id.clone(), profile.clone());
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000)
    }

    fn event(id: &str, status: EventStatus, reporter_id: Option<&str>) -> Event {
        Event {
            id: id.to_string(),
            title: "Suspicious crowd".to_string(),
            description: None,
            category: Category::CrimeAlert,
            subcategory: Some("pickpockets".to_string()),
            location: Location::new(48.8584, 2.2945),
            address: None,
            created_at: now() - Duration::hours(1),
            image_url: None,
            verification_count: 0,
            is_active: true,
            radius_meters: None,
            status,
            reporter_id: reporter_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn valid_transition_updates_event_and_profile() {
        let store = MemoryStore::with_event(event("e1", EventStatus::Pending, Some("u1"))).await;

        let updated = update_event_status(&store, "e1", EventStatus::Valid, now())
            .await
            .unwrap();
        assert_eq!(updated.status, EventStatus::Valid);

        let profiles = store.profiles.lock().await;
        let profile = &profiles["u1"];
        assert_eq!(profile.report_score, 1);
        assert_eq!(profile.total_valid_reports, 1);
        drop(profiles);

        assert_eq!(
            *store.calls.lock().await,
            vec!["get_event", "update_event", "get_profile", "update_profile"]
        );
    }

    #[tokio::test]
    async fn missing_event_is_not_found() {
        let store = MemoryStore::default();
        let err = update_event_status(&store, "nope", EventStatus::Spam, now())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ModerationError::NotFound {
                event_id: "nope".to_string()
            }
        );
        assert_eq!(*store.calls.lock().await, vec!["get_event"]);
    }

    #[tokio::test]
    async fn same_status_skips_all_writes() {
        let store = MemoryStore::with_event(event("e1", EventStatus::Spam, Some("u1"))).await;

        let result = update_event_status(&store, "e1", EventStatus::Spam, now())
            .await
            .unwrap();
        assert_eq!(result.status, EventStatus::Spam);
        assert_eq!(*store.calls.lock().await, vec!["get_event"]);
        assert!(store.profiles.lock().await.is_empty());
    }

    #[tokio::test]
    async fn event_without_reporter_touches_no_profile() {
        let store = MemoryStore::with_event(event("e1", EventStatus::Pending, None)).await;

        update_event_status(&store, "e1", EventStatus::False, now())
            .await
            .unwrap();
        assert_eq!(*store.calls.lock().await, vec!["get_event", "update_event"]);
        assert!(store.profiles.lock().await.is_empty());
    }

    #[tokio::test]
    async fn profile_is_created_lazily_then_reused() {
        let store = MemoryStore::default();
        for id in ["e1", "e2", "e3"] {
            store
                .events
                .lock()
                .await
                .insert(id.to_string(), event(id, EventStatus::Pending, Some("u1")));
        }

        for id in ["e1", "e2", "e3"] {
            update_event_status(&store, id, EventStatus::Spam, now())
                .await
                .unwrap();
        }

        let profiles = store.profiles.lock().await;
        assert_eq!(profiles.len(), 1);
        let profile = &profiles["u1"];
        assert_eq!(profile.total_invalid_reports, 3);
        assert_eq!(profile.report_ban_tier, 1);
        assert_eq!(profile.report_ban_until, Some(now() + Duration::days(1)));
    }

    #[tokio::test]
    async fn event_update_failure_propagates_message() {
        let mut store = MemoryStore::with_event(event("e1", EventStatus::Pending, Some("u1"))).await;
        store.failures.update_event = true;

        let err = update_event_status(&store, "e1", EventStatus::Valid, now())
            .await
            .unwrap_err();
        assert_eq!(err, ModerationError::store("update_event failed"));
        assert_eq!(err.to_string(), "update_event failed");
        assert!(store.profiles.lock().await.is_empty());
    }

    #[tokio::test]
    async fn profile_failure_after_event_write_leaves_event_updated() {
        let mut store = MemoryStore::with_event(event("e1", EventStatus::Pending, Some("u1"))).await;
        store.failures.update_profile = true;

        let err = update_event_status(&store, "e1", EventStatus::Valid, now())
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Store { .. }));

        // No compensation: the status write stays.
        assert_eq!(store.events.lock().await["e1"].status, EventStatus::Valid);
        assert_eq!(store.profiles.lock().await["u1"].report_score, 0);
    }

    #[tokio::test]
    async fn load_failures_propagate() {
        let mut store = MemoryStore::with_event(event("e1", EventStatus::Pending, Some("u1"))).await;
        store.failures.load_event = true;
        assert!(matches!(
            update_event_status(&store, "e1", EventStatus::Valid, now()).await,
            Err(ModerationError::Store { .. })
        ));

        store.failures.load_event = false;
        store.failures.load_profile = true;
        assert!(matches!(
            update_event_status(&store, "e1", EventStatus::Valid, now()).await,
            Err(ModerationError::Store { .. })
        ));
    }

    #[tokio::test]
    async fn reversal_restores_counts() {
        let store = MemoryStore::with_event(event("e1", EventStatus::Pending, Some("u1"))).await;

        update_event_status(&store, "e1", EventStatus::Spam, now())
            .await
            .unwrap();
        update_event_status(&store, "e1", EventStatus::Valid, now())
            .await
            .unwrap();

        let profiles = store.profiles.lock().await;
        let profile = &profiles["u1"];
        assert_eq!(profile.report_score, 1);
        assert_eq!(profile.total_valid_reports, 1);
        assert_eq!(profile.total_invalid_reports, 0);
    }

    #[test]
    fn strict_status_parsing() {
        assert_eq!(parse_status("valid").unwrap(), EventStatus::Valid);
        assert_eq!(parse_status(" false ").unwrap(), EventStatus::False);
        let err = parse_status("archived").unwrap_err();
        assert!(matches!(err, ModerationError::Validation { .. }));
        assert!(err.to_string().contains("pending, valid, spam, false"));
    }

    #[test]
    fn banned_reporters_cannot_report() {
        let mut profile = ReporterProfile::new("u1");
        assert!(ensure_can_report(None, now()).is_ok());
        assert!(ensure_can_report(Some(&profile), now()).is_ok());

        let until = now() + Duration::days(2);
        profile.report_ban_until = Some(until);
        assert_eq!(
            ensure_can_report(Some(&profile), now()),
            Err(ModerationError::Banned {
                reporter_id: "u1".to_string(),
                until,
            })
        );

        assert!(ensure_can_report(Some(&profile), until).is_ok());
    }

    #[tokio::test]
    async fn third_invalid_report_blocks_reporting() {
        let store = MemoryStore::default();
        for id in ["e1", "e2", "e3"] {
            store
                .events
                .lock()
                .await
                .insert(id.to_string(), event(id, EventStatus::Pending, Some("u1")));
        }

        for id in ["e1", "e2"] {
            update_event_status(&store, id, EventStatus::Spam, now())
                .await
                .unwrap();
        }
        let profile = store.profiles.lock().await["u1"].clone();
        assert!(ensure_can_report(Some(&profile), now()).is_ok());

        update_event_status(&store, "e3", EventStatus::False, now())
            .await
            .unwrap();
        let profile = store.profiles.lock().await["u1"].clone();
        assert!(matches!(
            ensure_can_report(Some(&profile), now()),
            Err(ModerationError::Banned { .. })
        ));
        assert!(ensure_can_report(Some(&profile), now() + Duration::days(2)).is_ok());
    }
}
