#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety advisor filter handling.
//!
//! The text completion provider that reads a user's question and proposes
//! filters is external. This crate validates and normalizes what it
//! returns ([`filters`]) and turns the result into typed event query
//! predicates ([`query`]) that the database layer renders as SQL.

pub mod filters;
pub mod query;

use thiserror::Error;

pub use filters::derive_filters;
pub use query::{EventQuery, Predicate, SearchField, build_event_query, search_pattern};

/// Maximum events loaded to answer one advisor question.
pub const MAX_ADVISOR_EVENTS: u32 = 1000;

/// Errors that can occur while building advisor queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvisorError {
    /// The filters describe an impossible query.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of what went wrong.
        message: String,
    },
}

impl From<safety_map_geo::GeoError> for AdvisorError {
    fn from(e: safety_map_geo::GeoError) -> Self {
        Self::Validation {
            message: e.to_string(),
        }
    }
}
