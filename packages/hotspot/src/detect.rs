//! Connected-components clustering over a proximity graph.
//!
//! Equivalent to DBSCAN with `eps = proximity_meters` and
//! `minPts = minimum_events`. A report is a *core* point when it and its
//! neighbors number at least `minimum_events`; density is evaluated
//! against the full candidate set, so it does not depend on visit order.
//!
//! Core points extend the cluster frontier. Non-core points become
//! passive members of every cluster whose core points reach them, but
//! never extend a cluster themselves. Cluster membership is therefore
//! independent of input order; only the emission order follows the order
//! in which seeds are first encountered.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use safety_map_event_models::{Location, Report, ReportFilter};
use safety_map_geo::{ProximityIndex, haversine_meters, validate};

use crate::{
    ClusterOptions, HotspotCluster, HotspotError, MAX_PADDING_METERS, MIN_PADDING_METERS,
    MIN_RADIUS_METERS, PADDING_RATIO, cluster_id,
};

/// Detects hotspots among `reports` matching `filter` that were created
/// at or after `now - options.lookback_hours`.
///
/// # Errors
///
/// Returns [`HotspotError::InvalidReport`] if a candidate report has a
/// non-finite coordinate, or [`HotspotError::InvalidOptions`] if the
/// options are out of range.
pub fn detect_hotspots(
    reports: &[Report],
    filter: &ReportFilter,
    options: &ClusterOptions,
    now: DateTime<Utc>,
) -> Result<Vec<HotspotCluster>, HotspotError> {
    options.validate()?;

    let cutoff = options.cutoff(now)?;

    let candidates: Vec<&Report> = reports
        .iter()
        .filter(|report| filter.matches(report) && report.created_at >= cutoff)
        .collect();

    log::debug!(
        "Hotspot detection: {} of {} reports are recent {} candidates",
        candidates.len(),
        reports.len(),
        filter.category
    );

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    for report in &candidates {
        validate(&report.location).map_err(|source| HotspotError::InvalidReport {
            report_id: report.id.clone(),
            source,
        })?;
    }

    let locations: Vec<Location> = candidates.iter().map(|r| r.location).collect();
    let index = ProximityIndex::build(&locations)?;

    let neighbors: Vec<Vec<usize>> = (0..candidates.len())
        .map(|idx| index.neighbors(idx, options.proximity_meters))
        .collect::<Result<_, _>>()?;

    let is_core = |idx: usize| neighbors[idx].len() + 1 >= options.minimum_events;

    let mut visited = vec![false; candidates.len()];
    let mut clusters = Vec::new();

    for seed in 0..candidates.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        if !is_core(seed) {
            continue;
        }

        let mut members: Vec<usize> = Vec::with_capacity(neighbors[seed].len() + 1);
        let mut in_cluster: BTreeSet<usize> = BTreeSet::new();
        members.push(seed);
        in_cluster.insert(seed);
        for &n in &neighbors[seed] {
            if in_cluster.insert(n) {
                members.push(n);
            }
        }

        let mut frontier: Vec<usize> = neighbors[seed].clone();

        while let Some(current) = frontier.pop() {
            if visited[current] {
                continue;
            }
            visited[current] = true;

            if !is_core(current) {
                continue;
            }

            for &next in &neighbors[current] {
                if in_cluster.insert(next) {
                    members.push(next);
                    frontier.push(next);
                }
            }
        }

        if members.len() < options.minimum_events {
            continue;
        }

        let member_locations: Vec<Location> = members.iter().map(|&i| locations[i]).collect();
        let center = mean_location(&member_locations);
        let radius_meters = cover_radius(&center, &member_locations);

        let id = cluster_id(members.iter().map(|&i| candidates[i].id.as_str()));

        clusters.push(HotspotCluster {
            id,
            center,
            radius_meters,
            members: members.iter().map(|&i| candidates[i].clone()).collect(),
        });
    }

    log::debug!("Hotspot detection produced {} clusters", clusters.len());

    Ok(clusters)
}

/// Coordinate-wise arithmetic mean.
#[allow(clippy::cast_precision_loss)]
fn mean_location(locations: &[Location]) -> Location {
    let count = locations.len() as f64;
    let (lat, lng) = locations
        .iter()
        .fold((0.0, 0.0), |(lat, lng), l| (lat + l.lat, lng + l.lng));
    Location::new(lat / count, lng / count)
}

/// Farthest-member distance plus padding, floored at
/// [`MIN_RADIUS_METERS`].
fn cover_radius(center: &Location, locations: &[Location]) -> f64 {
    let max_distance = locations
        .iter()
        .map(|l| haversine_meters(center, l))
        .fold(0.0_f64, f64::max);

    let padding = (max_distance * PADDING_RATIO).clamp(MIN_PADDING_METERS, MAX_PADDING_METERS);

    (max_distance + padding).max(MIN_RADIUS_METERS)
}
