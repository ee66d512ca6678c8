//! A deterministic, dependency-free [`RoutingBackend`] for tests.
//!
//! Travel time is a simple, reproducible function of coordinates rather
//! than a real road network, so solver/assembler tests never depend on
//! network access or a running OSRM server.

use godeliver_planner::error::PlannerError;
use godeliver_planner::model::Location;
use godeliver_planner::routing::RoutingBackend;

/// Manhattan distance in decimal-degree units, scaled to whole seconds —
/// enough structure to make precedence/time-window tests meaningful while
/// staying exactly reproducible.
const DEGREES_TO_SECONDS: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct GridBackend;

impl RoutingBackend for GridBackend {
    fn duration_distance_matrix(
        &self,
        locations: &[Location],
    ) -> Result<(Vec<Vec<i64>>, Vec<Vec<i64>>), PlannerError> {
        let n = locations.len();
        let mut durations = vec![vec![0i64; n]; n];
        let mut distances = vec![vec![0i64; n]; n];

        for (i, a) in locations.iter().enumerate() {
            for (j, b) in locations.iter().enumerate() {
                if i == j {
                    continue;
                }
                let (d_s, d_m) = leg(a, b);
                durations[i][j] = d_s;
                distances[i][j] = d_m;
            }
        }

        Ok((durations, distances))
    }

    fn duration_distance_route(
        &self,
        locations: &[Location],
    ) -> Result<(Vec<i64>, Vec<i64>), PlannerError> {
        let mut durations = vec![0i64; locations.len()];
        let mut distances = vec![0i64; locations.len()];
        for i in 1..locations.len() {
            let (d_s, d_m) = leg(&locations[i - 1], &locations[i]);
            durations[i] = d_s;
            distances[i] = d_m;
        }
        Ok((durations, distances))
    }
}

fn leg(a: &Location, b: &Location) -> (i64, i64) {
    let manhattan_degrees = (a.lat - b.lat).abs() + (a.lon - b.lon).abs();
    let seconds = (manhattan_degrees * DEGREES_TO_SECONDS).round() as i64;
    let metres = (manhattan_degrees * DEGREES_TO_SECONDS * 10.0).round() as i64;
    (seconds, metres)
}
