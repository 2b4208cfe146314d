//! HTTP handler functions for the safety map API.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use chrono::Utc;
use safety_map_advisor::query::DEFAULT_SEARCH_LIMIT;
use safety_map_advisor::{EventQuery, MAX_ADVISOR_EVENTS, build_event_query, derive_filters};
use safety_map_advisor_models::SafetyQueryFilters;
use safety_map_database::{queries, update_event_status_atomic};
use safety_map_event_models::NewEvent;
use safety_map_hotspot::detect_hotspots;
use safety_map_moderation::{ensure_can_report, parse_status};
use safety_map_server_models::{
    ApiHealth, ApiHotspots, ApiProfile, DEFAULT_LIST_LIMIT, FilterDerivationBody,
    ListEventsParams, MAX_SEARCH_LIMIT, SearchQueryParams, StatusUpdateBody,
};
use serde::Serialize;

use crate::{AppState, ServerError};

fn respond<T: Serialize>(action: &str, result: Result<T, ServerError>) -> HttpResponse {
    respond_with(StatusCode::OK, action, result)
}

fn respond_with<T: Serialize>(
    status: StatusCode,
    action: &str,
    result: Result<T, ServerError>,
) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::build(status).json(body),
        Err(e) => {
            if e.status_code().is_server_error() {
                log::error!("Failed to {action}: {e}");
            } else {
                log::debug!("Rejected {action}: {e}");
            }
            e.to_response()
        }
    }
}

/// Event IDs are UUIDs; anything else cannot exist.
fn validate_event_id(id: &str) -> Result<(), ServerError> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ServerError::BadRequest {
            message: format!("Invalid event id: {id}"),
        })
}

fn search_limit(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT)
}

fn list_limit(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_ADVISOR_EVENTS)
}

fn validate_new_event(event: &NewEvent) -> Result<(), ServerError> {
    event
        .validate()
        .map_err(|message| ServerError::BadRequest { message })
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/events`
///
/// Lists events newest first.
pub async fn list_events(
    state: web::Data<AppState>,
    params: web::Query<ListEventsParams>,
) -> HttpResponse {
    let limit = list_limit(params.limit);

    let result = queries::query_events(state.db.as_ref(), &EventQuery::default(), limit)
        .await
        .map_err(ServerError::from);

    respond("list events", result)
}

/// `POST /api/events`
///
/// Stores a new report as a pending event. Reports from a reporter whose
/// ban has not expired are rejected with 403.
pub async fn create_event(
    state: web::Data<AppState>,
    body: web::Json<NewEvent>,
) -> HttpResponse {
    let event = body.into_inner();

    let result = async {
        validate_new_event(&event)?;

        if let Some(reporter_id) = event.reporter_id.as_deref() {
            let profile = queries::get_profile(state.db.as_ref(), reporter_id).await?;
            ensure_can_report(profile.as_ref(), Utc::now())?;
        }

        let created = queries::create_event(state.db.as_ref(), &event).await?;
        Ok::<_, ServerError>(created)
    }
    .await;

    respond_with(StatusCode::CREATED, "create event", result)
}

/// `GET /api/events/{id}`
pub async fn get_event(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let event_id = path.into_inner();

    let result = async {
        validate_event_id(&event_id)?;
        queries::get_event_by_id(state.db.as_ref(), &event_id, false)
            .await?
            .ok_or_else(|| ServerError::NotFound {
                message: format!("Event not found: {event_id}"),
            })
    }
    .await;

    respond("get event", result)
}

/// `GET /api/profiles/{id}`
///
/// Returns a reporter's reputation with the ban and premium flags
/// evaluated now. Profiles are not created on read.
pub async fn get_profile(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let reporter_id = path.into_inner();

    let result = async {
        let profile = queries::get_profile(state.db.as_ref(), &reporter_id)
            .await?
            .ok_or_else(|| ServerError::NotFound {
                message: format!("Profile not found: {reporter_id}"),
            })?;
        Ok::<_, ServerError>(ApiProfile::at(profile, Utc::now()))
    }
    .await;

    respond("get profile", result)
}

/// `POST /api/events/{id}/status`
///
/// Moves an event to a new moderation status and updates its reporter's
/// metrics in one transaction.
pub async fn update_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<StatusUpdateBody>,
) -> HttpResponse {
    let event_id = path.into_inner();

    let result = async {
        validate_event_id(&event_id)?;
        let next = parse_status(&body.status)?;
        let event =
            update_event_status_atomic(state.db.as_ref(), &event_id, next, Utc::now()).await?;
        Ok::<_, ServerError>(event)
    }
    .await;

    respond("update event status", result)
}

/// `GET /api/hotspots`
///
/// Clusters recent reports matching the configured filter.
pub async fn hotspots(state: web::Data<AppState>) -> HttpResponse {
    let result = async {
        let now = Utc::now();
        let options = state.cluster_options;
        let since = options.cutoff(now)?;

        let reports =
            queries::fetch_recent_reports(state.db.as_ref(), &state.report_filter, since).await?;
        let clusters = detect_hotspots(&reports, &state.report_filter, &options, now)?;

        Ok::<_, ServerError>(ApiHotspots {
            generated_at: now,
            options,
            clusters,
        })
    }
    .await;

    respond("detect hotspots", result)
}

/// `POST /api/events/query`
///
/// Loads events matching normalized advisor filters, newest first.
pub async fn query_events(
    state: web::Data<AppState>,
    body: web::Json<SafetyQueryFilters>,
) -> HttpResponse {
    let result = async {
        let query = build_event_query(&body, Utc::now())?;
        let events = queries::query_events(state.db.as_ref(), &query, MAX_ADVISOR_EVENTS).await?;
        Ok::<_, ServerError>(events)
    }
    .await;

    respond("query events", result)
}

/// `GET /api/events/search`
///
/// Free-text search across active events.
pub async fn search_events(
    state: web::Data<AppState>,
    params: web::Query<SearchQueryParams>,
) -> HttpResponse {
    let text = params.q.as_deref().unwrap_or_default();
    let limit = search_limit(params.limit);

    let result = queries::search_events(state.db.as_ref(), text, limit)
        .await
        .map_err(ServerError::from);

    respond("search events", result)
}

/// `POST /api/events/{id}/verify`
///
/// Adds one confirmation to an event.
pub async fn verify_event(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let event_id = path.into_inner();

    let result = async {
        validate_event_id(&event_id)?;
        queries::increment_verification(state.db.as_ref(), &event_id)
            .await?
            .ok_or_else(|| ServerError::NotFound {
                message: format!("Event not found: {event_id}"),
            })
    }
    .await;

    respond("verify event", result)
}

/// `POST /api/advisor/filters`
///
/// Normalizes a filter proposal for an advisor request, falling back to
/// the request's own filters when the proposal is unusable.
pub async fn advisor_filters(body: web::Json<FilterDerivationBody>) -> HttpResponse {
    let body = body.into_inner();
    HttpResponse::Ok().json(derive_filters(body.response.as_deref(), &body.request))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, test};

    use super::*;

    #[test]
    fn event_ids_must_be_uuids() {
        assert!(validate_event_id("0b7e4a52-2f0e-4c1b-9a51-6f1f3d7f8a10").is_ok());
        let e = validate_event_id("42").unwrap_err();
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(e.to_string(), "Invalid event id: 42");
    }

    #[test]
    fn search_limit_defaults_and_clamps() {
        assert_eq!(search_limit(None), DEFAULT_SEARCH_LIMIT);
        assert_eq!(search_limit(Some(0)), 1);
        assert_eq!(search_limit(Some(20)), 20);
        assert_eq!(search_limit(Some(10_000)), MAX_SEARCH_LIMIT);
    }

    #[test]
    fn list_limit_defaults_and_clamps() {
        assert_eq!(list_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(list_limit(Some(0)), 1);
        assert_eq!(list_limit(Some(1_000_000)), MAX_ADVISOR_EVENTS);
    }

    #[test]
    fn invalid_new_events_are_bad_requests() {
        let mut event: NewEvent = serde_json::from_value(serde_json::json!({
            "title": "Pickpocket at the station",
            "category": "crime-alert",
            "subcategory": "pickpockets",
            "location": { "lat": 41.38, "lng": 2.17 },
            "reporterId": "u1"
        }))
        .unwrap();
        assert!(validate_new_event(&event).is_ok());

        event.location.lat = 123.0;
        let e = validate_new_event(&event).unwrap_err();
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(e.to_string(), "location (123, 2.17) is out of range");
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let app =
            test::init_service(App::new().service(web::scope("/api").configure(crate::routes)))
                .await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[actix_web::test]
    async fn advisor_filters_fall_back_on_garbage() {
        let app =
            test::init_service(App::new().service(web::scope("/api").configure(crate::routes)))
                .await;
        let req = test::TestRequest::post()
            .uri("/api/advisor/filters")
            .set_json(serde_json::json!({
                "request": {
                    "requestType": "SPECIFIC_ADDRESS_QUERY",
                    "userQuery": "Anything near the station?",
                    "timeframeMonths": 3,
                    "coordinates": { "lat": 41.38, "lng": 2.17 }
                },
                "response": "not json"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["timeframeMonths"], 3);
        assert_eq!(body["coordinates"]["lat"], 41.38);
        assert_eq!(body["categories"], serde_json::json!([]));
    }

    #[actix_web::test]
    async fn advisor_filters_normalize_a_fenced_proposal() {
        let app =
            test::init_service(App::new().service(web::scope("/api").configure(crate::routes)))
                .await;
        let proposal = "```json\n{\"timeframeMonths\": 6, \"categories\": [\"crime-alert\", \"crime-alert\"], \
                        \"radiusMeters\": 10, \"summary\": \" Recent pickpocketing \"}\n```";
        let req = test::TestRequest::post()
            .uri("/api/advisor/filters")
            .set_json(serde_json::json!({
                "request": { "userQuery": "Pickpockets lately?" },
                "response": proposal
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["timeframeMonths"], 6);
        assert_eq!(body["categories"], serde_json::json!(["crime-alert"]));
        assert_eq!(body["radiusMeters"], 50.0);
        assert_eq!(body["summary"], "Recent pickpocketing");
    }
}
