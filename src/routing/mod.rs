//! The routing boundary: pairwise matrices and per-segment route traces.
//!
//! [`RoutingBackend`] is the only seam between the planning core and the
//! outside world's map data. Two implementations ship: [`osrm::OsrmBackend`]
//! (a real HTTP client against an OSRM server) and
//! [`haversine::HaversineBackend`] (a dependency-free great-circle estimate,
//! used as a default and in tests).

pub mod haversine;
pub mod osrm;
pub mod osrm_data;
pub mod polyline;

use crate::error::PlannerError;
use crate::model::Location;

/// Pairwise duration (seconds) and distance (metres) matrices, and
/// per-segment route traces along an ordered list of locations.
///
/// Durations returned by [`RoutingBackend::duration_distance_matrix`] must
/// already include whatever traffic coefficient the backend applies (the
/// reference OSRM backend scales durations by 1.5 and leaves distances
/// unscaled — only durations carry a traffic multiplier, since distance is a
/// road-network property independent of congestion).
pub trait RoutingBackend {
    /// Pairwise `(durations_s, distances_m)` for the given locations, in the
    /// same order as `locations`. Both matrices are square, with a zero
    /// diagonal.
    fn duration_distance_matrix(
        &self,
        locations: &[Location],
    ) -> Result<(Vec<Vec<i64>>, Vec<Vec<i64>>), PlannerError>;

    /// Per-segment `(durations_s, distances_m)` walking the ordered
    /// `locations` list. Length equals `locations.len()`, first entry is
    /// always `0` (no travel before the first stop).
    fn duration_distance_route(
        &self,
        locations: &[Location],
    ) -> Result<(Vec<i64>, Vec<i64>), PlannerError>;
}

/// A single timestamped stop produced by walking a route with
/// [`crate::service::PlanningService::route_along`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimedStop {
    pub location: Location,
    pub arrival_time: i64,
    pub leg_distance_m: i64,
}

/// The result of walking an ordered list of locations with a starting time.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTrace {
    pub stops: Vec<TimedStop>,
}
