//! Database query functions for safety events and reporter profiles.
//!
//! All queries use `query_raw_params()` / `exec_raw_params()` with `$n`
//! placeholders. Rows are read through `ToValue` into the loosely-typed
//! row structs from `safety_map_database_models` and converted to domain
//! types at this boundary.

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use safety_map_advisor::{EventQuery, Predicate, search_pattern};
use safety_map_database_models::{EventRow, ProfileRow};
use safety_map_event_models::{Event, EventStatus, NewEvent, Report, ReportFilter};
use safety_map_reputation_models::ReporterProfile;
use switchy_database::{Database, DatabaseValue};

use crate::DbError;

/// Columns selected for every event query.
const EVENT_COLUMNS: &str = "id, title, description, category, subcategory, lat, lng, address, \
     created_at, image_url, verification_count, is_active, radius_meters, status, reporter_id";

/// Columns selected for every profile query.
const PROFILE_COLUMNS: &str = "id, report_score, report_level, total_valid_reports, \
     total_invalid_reports, report_ban_until, report_ban_tier, premium_until";

fn to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
}

fn optional_datetime(value: Option<DateTime<Utc>>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |dt| DatabaseValue::DateTime(dt.naive_utc()))
}

fn optional_string(value: Option<&str>) -> DatabaseValue {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or(DatabaseValue::Null, |s| DatabaseValue::String(s.to_string()))
}

fn count_param(value: u32) -> DatabaseValue {
    DatabaseValue::Int32(i32::try_from(value).unwrap_or(i32::MAX))
}

/// Columns an event cannot be placed on the map or ordered without.
fn required<T, E: std::fmt::Display>(
    value: Result<T, E>,
    event_id: &str,
    column: &str,
) -> Result<T, DbError> {
    value.map_err(|e| DbError::Conversion {
        message: format!("Failed to parse {column} for event {event_id}: {e}"),
    })
}

fn row_to_event_row(row: &switchy_database::Row) -> Result<EventRow, DbError> {
    let id: String = row.to_value("id").map_err(|e| DbError::Conversion {
        message: format!("Failed to parse event id: {e}"),
    })?;

    let created_at: NaiveDateTime = required(row.to_value("created_at"), &id, "created_at")?;
    let lat: f64 = required(row.to_value("lat"), &id, "lat")?;
    let lng: f64 = required(row.to_value("lng"), &id, "lng")?;

    Ok(EventRow {
        title: row.to_value("title").unwrap_or_default(),
        description: row.to_value("description").unwrap_or(None),
        category: row.to_value("category").unwrap_or_default(),
        subcategory: row.to_value("subcategory").unwrap_or(None),
        lat,
        lng,
        address: row.to_value("address").unwrap_or(None),
        created_at: to_utc(created_at),
        image_url: row.to_value("image_url").unwrap_or(None),
        verification_count: row
            .to_value::<Option<i32>>("verification_count")
            .unwrap_or(None)
            .unwrap_or(0),
        is_active: row
            .to_value::<Option<bool>>("is_active")
            .unwrap_or(None)
            .unwrap_or(true),
        radius_meters: row.to_value("radius_meters").unwrap_or(None),
        status: row.to_value("status").unwrap_or(None),
        reporter_id: row.to_value("reporter_id").unwrap_or(None),
        id,
    })
}

fn row_to_event(row: &switchy_database::Row) -> Result<Event, DbError> {
    let event_row = row_to_event_row(row)?;

    if event_row.status.is_some() && !event_row.has_known_status() {
        log::warn!(
            "Event {} has unknown status {:?}; treating as pending",
            event_row.id,
            event_row.status
        );
    }

    let id = event_row.id.clone();
    event_row.into_event().map_err(|category| DbError::Conversion {
        message: format!("Unknown category '{category}' for event {id}"),
    })
}

/// Converts a list of rows, skipping rows with an unknown category.
fn rows_to_events(rows: &[switchy_database::Row]) -> Result<Vec<Event>, DbError> {
    let mut events = Vec::with_capacity(rows.len());

    for row in rows {
        match row_to_event(row) {
            Ok(event) => events.push(event),
            Err(DbError::Conversion { message }) => {
                log::warn!("Skipping event row: {message}");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(events)
}

fn row_to_profile(row: &switchy_database::Row) -> ReporterProfile {
    let ban_until: Option<NaiveDateTime> = row.to_value("report_ban_until").unwrap_or(None);
    let premium_until: Option<NaiveDateTime> = row.to_value("premium_until").unwrap_or(None);

    ProfileRow {
        id: row.to_value("id").unwrap_or_default(),
        report_score: row.to_value("report_score").unwrap_or(None),
        report_level: row.to_value("report_level").unwrap_or(None),
        total_valid_reports: row.to_value("total_valid_reports").unwrap_or(None),
        total_invalid_reports: row.to_value("total_invalid_reports").unwrap_or(None),
        report_ban_until: ban_until.map(to_utc),
        report_ban_tier: row.to_value("report_ban_tier").unwrap_or(None),
        premium_until: premium_until.map(to_utc),
    }
    .into()
}

fn for_update(lock: bool) -> &'static str {
    if lock { " FOR UPDATE" } else { "" }
}

/// Loads a single event by ID.
///
/// When `lock` is set the row is locked until the surrounding
/// transaction ends.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the row cannot be converted.
pub async fn get_event_by_id(
    db: &dyn Database,
    id: &str,
    lock: bool,
) -> Result<Option<Event>, DbError> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1{}",
        for_update(lock)
    );

    let rows = db
        .query_raw_params(&sql, &[DatabaseValue::String(id.to_string())])
        .await?;

    rows.first().map(row_to_event).transpose()
}

/// Stores a new report as a `pending`, active, unverified event and
/// returns the inserted row.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails or returns no row.
pub async fn create_event(db: &dyn Database, event: &NewEvent) -> Result<Event, DbError> {
    let sql = format!(
        "INSERT INTO events (title, description, category, subcategory, lat, lng, address,
             image_url, radius_meters, reporter_id, status, verification_count, is_active)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, TRUE)
         RETURNING {EVENT_COLUMNS}"
    );

    let rows = db
        .query_raw_params(
            &sql,
            &[
                DatabaseValue::String(event.title.trim().to_string()),
                optional_string(event.description.as_deref()),
                DatabaseValue::String(event.category.as_ref().to_string()),
                optional_string(event.subcategory.as_deref()),
                DatabaseValue::Real64(event.location.lat),
                DatabaseValue::Real64(event.location.lng),
                optional_string(event.address.as_deref()),
                optional_string(event.image_url.as_deref()),
                event
                    .radius_meters
                    .map_or(DatabaseValue::Null, DatabaseValue::Real64),
                optional_string(event.reporter_id.as_deref()),
                DatabaseValue::String(EventStatus::Pending.as_ref().to_string()),
            ],
        )
        .await?;

    let row = rows.first().ok_or_else(|| DbError::Conversion {
        message: "Insert into events returned no row".to_string(),
    })?;
    let created = row_to_event(row)?;

    log::info!(
        "Created {} event {} at ({}, {})",
        created.category,
        created.id,
        created.location.lat,
        created.location.lng
    );

    Ok(created)
}

/// Writes a new status to an event and returns the updated row, or `None`
/// if no row with that ID exists.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails or the row cannot be converted.
pub async fn update_event_status_column(
    db: &dyn Database,
    id: &str,
    status: EventStatus,
) -> Result<Option<Event>, DbError> {
    let sql = format!("UPDATE events SET status = $2 WHERE id = $1 RETURNING {EVENT_COLUMNS}");

    let rows = db
        .query_raw_params(
            &sql,
            &[
                DatabaseValue::String(id.to_string()),
                DatabaseValue::String(status.as_ref().to_string()),
            ],
        )
        .await?;

    rows.first().map(row_to_event).transpose()
}

/// Loads a reporter profile, inserting a zeroed row first if none exists.
///
/// # Errors
///
/// Returns [`DbError`] if either statement fails or the row is missing
/// after the insert.
pub async fn get_or_create_profile(
    db: &dyn Database,
    id: &str,
    lock: bool,
) -> Result<ReporterProfile, DbError> {
    let created = db
        .exec_raw_params(
            "INSERT INTO profiles (id) VALUES ($1) ON CONFLICT (id) DO NOTHING",
            &[DatabaseValue::String(id.to_string())],
        )
        .await?;

    if created > 0 {
        log::info!("Created reporter profile for {id}");
    }

    let sql = format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1{}",
        for_update(lock)
    );

    let rows = db
        .query_raw_params(&sql, &[DatabaseValue::String(id.to_string())])
        .await?;

    let row = rows.first().ok_or_else(|| DbError::Conversion {
        message: format!("Profile not found after insert: {id}"),
    })?;

    Ok(row_to_profile(row))
}

/// Loads a reporter profile without creating one.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn get_profile(
    db: &dyn Database,
    id: &str,
) -> Result<Option<ReporterProfile>, DbError> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");

    let rows = db
        .query_raw_params(&sql, &[DatabaseValue::String(id.to_string())])
        .await?;

    Ok(rows.first().map(row_to_profile))
}

/// Persists every metric column of a reporter profile.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub async fn update_profile(db: &dyn Database, profile: &ReporterProfile) -> Result<(), DbError> {
    db.exec_raw_params(
        "UPDATE profiles SET
            report_score = $2,
            report_level = $3,
            total_valid_reports = $4,
            total_invalid_reports = $5,
            report_ban_until = $6,
            report_ban_tier = $7,
            premium_until = $8
         WHERE id = $1",
        &[
            DatabaseValue::String(profile.id.clone()),
            DatabaseValue::Int32(profile.report_score),
            count_param(profile.report_level),
            count_param(profile.total_valid_reports),
            count_param(profile.total_invalid_reports),
            optional_datetime(profile.report_ban_until),
            count_param(profile.report_ban_tier),
            optional_datetime(profile.premium_until),
        ],
    )
    .await?;

    Ok(())
}

/// Loads active reports matching `filter` created at or after `since`, as
/// input for hotspot detection.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn fetch_recent_reports(
    db: &dyn Database,
    filter: &ReportFilter,
    since: DateTime<Utc>,
) -> Result<Vec<Report>, DbError> {
    let mut sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events
         WHERE is_active IS NOT FALSE AND category = $1 AND created_at >= $2"
    );
    let mut params = vec![
        DatabaseValue::String(filter.category.as_ref().to_string()),
        DatabaseValue::DateTime(since.naive_utc()),
    ];

    if let Some(subcategory) = &filter.subcategory {
        sql.push_str(" AND subcategory = $3");
        params.push(DatabaseValue::String(subcategory.clone()));
    }

    sql.push_str(" ORDER BY created_at DESC");

    let rows = db.query_raw_params(&sql, &params).await?;
    let events = rows_to_events(&rows)?;

    log::debug!(
        "Loaded {} recent {} reports since {since}",
        events.len(),
        filter.category
    );

    Ok(events.iter().map(Event::to_report).collect())
}

/// Renders the predicates of an [`EventQuery`] as `WHERE` fragments.
///
/// Placeholders are numbered from `start_idx`. Returns the fragments (to
/// be joined with `AND`), their parameters, and the next free index.
#[must_use]
pub fn event_query_filters(
    query: &EventQuery,
    start_idx: u32,
) -> (Vec<String>, Vec<DatabaseValue>, u32) {
    let mut frags = Vec::new();
    let mut params: Vec<DatabaseValue> = Vec::new();
    let mut idx = start_idx;

    for predicate in &query.predicates {
        match predicate {
            Predicate::CreatedAtOrAfter { since } => {
                frags.push(format!("created_at >= ${idx}"));
                params.push(DatabaseValue::DateTime(since.naive_utc()));
                idx += 1;
            }
            Predicate::CategoryIn { categories } => {
                let mut placeholders = Vec::with_capacity(categories.len());
                for category in categories {
                    placeholders.push(format!("${idx}"));
                    params.push(DatabaseValue::String(category.as_ref().to_string()));
                    idx += 1;
                }
                frags.push(format!("category IN ({})", placeholders.join(", ")));
            }
            Predicate::AnyFieldContains { fields, patterns } => {
                let mut alternatives = Vec::with_capacity(fields.len() * patterns.len());
                for pattern in patterns {
                    for field in fields {
                        alternatives.push(format!("{field} ILIKE ${idx} ESCAPE '\\'"));
                    }
                    params.push(DatabaseValue::String(pattern.clone()));
                    idx += 1;
                }
                if !alternatives.is_empty() {
                    frags.push(format!("({})", alternatives.join(" OR ")));
                }
            }
            Predicate::LatBetween { min, max } => {
                frags.push(format!("lat BETWEEN ${} AND ${}", idx, idx + 1));
                params.push(DatabaseValue::Real64(*min));
                params.push(DatabaseValue::Real64(*max));
                idx += 2;
            }
            Predicate::LngBetween { min, max } => {
                frags.push(format!("lng BETWEEN ${} AND ${}", idx, idx + 1));
                params.push(DatabaseValue::Real64(*min));
                params.push(DatabaseValue::Real64(*max));
                idx += 2;
            }
        }
    }

    (frags, params, idx)
}

/// Runs an [`EventQuery`], newest first, then drops rows outside the
/// query's exact radius.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn query_events(
    db: &dyn Database,
    query: &EventQuery,
    limit: u32,
) -> Result<Vec<Event>, DbError> {
    let (frags, mut params, idx) = event_query_filters(query, 1);

    let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1=1");
    for frag in &frags {
        write!(sql, " AND {frag}").unwrap();
    }
    write!(sql, " ORDER BY created_at DESC LIMIT ${idx}").unwrap();
    params.push(DatabaseValue::Int64(i64::from(limit)));

    let rows = db.query_raw_params(&sql, &params).await?;
    let mut events = rows_to_events(&rows)?;

    let fetched = events.len();
    events.retain(|event| query.within_radius(&event.location));

    log::debug!(
        "Event query matched {fetched} rows, {} within radius",
        events.len()
    );

    Ok(events)
}

/// Free-text search over title, description, and address of active
/// events, newest first.
///
/// Returns an empty list for blank input without touching the database.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn search_events(
    db: &dyn Database,
    text: &str,
    limit: u32,
) -> Result<Vec<Event>, DbError> {
    let Some(pattern) = search_pattern(text) else {
        return Ok(Vec::new());
    };

    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events
         WHERE (title ILIKE $1 ESCAPE '\\'
             OR description ILIKE $1 ESCAPE '\\'
             OR address ILIKE $1 ESCAPE '\\')
           AND is_active = TRUE
         ORDER BY created_at DESC
         LIMIT $2"
    );

    let rows = db
        .query_raw_params(
            &sql,
            &[
                DatabaseValue::String(pattern),
                DatabaseValue::Int64(i64::from(limit)),
            ],
        )
        .await?;

    rows_to_events(&rows)
}

/// Adds one confirmation to an event and returns the updated row, or
/// `None` if no row with that ID exists.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails or the row cannot be converted.
pub async fn increment_verification(db: &dyn Database, id: &str) -> Result<Option<Event>, DbError> {
    let sql = format!(
        "UPDATE events SET verification_count = COALESCE(verification_count, 0) + 1
         WHERE id = $1 RETURNING {EVENT_COLUMNS}"
    );

    let rows = db
        .query_raw_params(&sql, &[DatabaseValue::String(id.to_string())])
        .await?;

    rows.first().map(row_to_event).transpose()
}
