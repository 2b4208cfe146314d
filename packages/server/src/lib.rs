#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the safety map.
//!
//! Serves report submission, event moderation, reporter profiles, hotspot
//! detection, advisor event queries and free-text search over the
//! Postgres store. Status updates go through the transactional moderation
//! path, and banned reporters cannot submit new reports.

mod handlers;

use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use safety_map_advisor::AdvisorError;
use safety_map_database::{DbError, db, run_migrations};
use safety_map_event_models::ReportFilter;
use safety_map_hotspot::{ClusterOptions, HotspotError};
use safety_map_moderation::ModerationError;
use safety_map_server_models::ApiError;
use std::sync::Arc;
use switchy_database::Database;
use thiserror::Error;

/// Shared application state.
pub struct AppState {
    /// Database connection.
    pub db: Arc<dyn Database>,
    /// Hotspot tunables, read once at startup.
    pub cluster_options: ClusterOptions,
    /// Which reports feed hotspot detection.
    pub report_filter: ReportFilter,
}

/// A failed request, classified by HTTP status.
#[derive(Debug, Error)]
pub enum ServerError {
    /// 404
    #[error("{message}")]
    NotFound {
        /// Description of what was missing.
        message: String,
    },

    /// 400
    #[error("{message}")]
    BadRequest {
        /// Description of what was wrong with the request.
        message: String,
    },

    /// 403
    #[error("{message}")]
    Forbidden {
        /// Why the caller may not do this.
        message: String,
    },

    /// 500
    #[error("{message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl ServerError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON error response for this error.
    #[must_use]
    pub fn to_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiError {
            error: self.to_string(),
        })
    }
}

impl From<ModerationError> for ServerError {
    fn from(e: ModerationError) -> Self {
        match e {
            ModerationError::NotFound { .. } => Self::NotFound {
                message: e.to_string(),
            },
            ModerationError::Validation { message } => Self::BadRequest { message },
            ModerationError::Banned { .. } => Self::Forbidden {
                message: e.to_string(),
            },
            ModerationError::Store { message } => Self::Internal { message },
        }
    }
}

impl From<AdvisorError> for ServerError {
    fn from(e: AdvisorError) -> Self {
        Self::BadRequest {
            message: e.to_string(),
        }
    }
}

impl From<DbError> for ServerError {
    fn from(e: DbError) -> Self {
        Self::Internal {
            message: e.to_string(),
        }
    }
}

impl From<HotspotError> for ServerError {
    fn from(e: HotspotError) -> Self {
        Self::BadRequest {
            message: e.to_string(),
        }
    }
}

/// Starts the safety map API server.
///
/// Connects to the database, runs migrations, reads hotspot options from
/// the environment, and serves until shut down.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
///
/// # Panics
///
/// Panics if the database connection or migrations fail.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    log::info!("Connecting to database...");
    let db_conn = db::connect_from_env()
        .await
        .expect("Failed to connect to database");

    log::info!("Running migrations...");
    run_migrations(db_conn.as_ref())
        .await
        .expect("Failed to run migrations");

    let cluster_options = ClusterOptions::from_env();
    log::info!(
        "Hotspots: {}m proximity, {} events minimum, {}h lookback",
        cluster_options.proximity_meters,
        cluster_options.minimum_events,
        cluster_options.lookback_hours
    );

    let state = web::Data::new(AppState {
        db: Arc::from(db_conn),
        cluster_options,
        report_filter: ReportFilter::pickpockets(),
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(web::scope("/api").configure(routes))
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

/// Registers every API route under the current scope.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .route("/hotspots", web::get().to(handlers::hotspots))
        .route("/events", web::get().to(handlers::list_events))
        .route("/events", web::post().to(handlers::create_event))
        .route("/events/query", web::post().to(handlers::query_events))
        .route("/events/search", web::get().to(handlers::search_events))
        .route("/events/{id}", web::get().to(handlers::get_event))
        .route("/events/{id}/status", web::post().to(handlers::update_status))
        .route("/events/{id}/verify", web::post().to(handlers::verify_event))
        .route("/profiles/{id}", web::get().to(handlers::get_profile))
        .route("/advisor/filters", web::post().to(handlers::advisor_filters));
}
