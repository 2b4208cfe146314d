//! Postgres-backed [`ModerationStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use safety_map_event_models::{Event, EventStatus};
use safety_map_moderation::{ModerationError, ModerationStore, update_event_status};
use safety_map_reputation_models::ReporterProfile;
use switchy_database::Database;

use crate::queries;

/// Moderation store over a database connection or open transaction.
pub struct DatabaseStore<'a> {
    db: &'a dyn Database,
    lock_rows: bool,
}

impl<'a> DatabaseStore<'a> {
    /// A store that reads rows without locking them.
    #[must_use]
    pub const fn new(db: &'a dyn Database) -> Self {
        Self {
            db,
            lock_rows: false,
        }
    }

    /// A store that takes `FOR UPDATE` row locks on reads. Only
    /// meaningful inside a transaction.
    #[must_use]
    pub const fn locking(db: &'a dyn Database) -> Self {
        Self {
            db,
            lock_rows: true,
        }
    }
}

#[async_trait]
impl ModerationStore for DatabaseStore<'_> {
    async fn get_event_by_id(&self, event_id: &str) -> Result<Option<Event>, ModerationError> {
        queries::get_event_by_id(self.db, event_id, self.lock_rows)
            .await
            .map_err(ModerationError::store)
    }

    async fn update_event_status_column(
        &self,
        event_id: &str,
        status: EventStatus,
    ) -> Result<Option<Event>, ModerationError> {
        queries::update_event_status_column(self.db, event_id, status)
            .await
            .map_err(ModerationError::store)
    }

    async fn get_or_create_profile(
        &self,
        reporter_id: &str,
    ) -> Result<ReporterProfile, ModerationError> {
        queries::get_or_create_profile(self.db, reporter_id, self.lock_rows)
            .await
            .map_err(ModerationError::store)
    }

    async fn update_profile(&self, profile: &ReporterProfile) -> Result<(), ModerationError> {
        queries::update_profile(self.db, profile)
            .await
            .map_err(ModerationError::store)
    }
}

/// Runs [`update_event_status`] inside a single transaction.
///
/// The event and profile rows are locked for the duration, so concurrent
/// moderation of the same event or reporter is serialized. Any failure
/// rolls back both the status change and the profile update.
///
/// # Errors
///
/// Returns the [`ModerationError`] from the service, or
/// [`ModerationError::Store`] if the transaction cannot be opened or
/// committed.
pub async fn update_event_status_atomic(
    db: &dyn Database,
    event_id: &str,
    next: EventStatus,
    now: DateTime<Utc>,
) -> Result<Event, ModerationError> {
    let txn = db
        .begin_transaction()
        .await
        .map_err(ModerationError::store)?;

    let store = DatabaseStore::locking(txn.as_ref());
    let result = update_event_status(&store, event_id, next, now).await;

    match result {
        Ok(event) => {
            txn.commit().await.map_err(ModerationError::store)?;
            Ok(event)
        }
        Err(e) => {
            if let Err(rollback) = txn.rollback().await {
                log::error!("Failed to roll back status update for {event_id}: {rollback}");
            }
            Err(e)
        }
    }
}
