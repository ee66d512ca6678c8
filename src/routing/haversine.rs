//! Haversine distance matrix provider (fallback / zero-setup default).
//!
//! Uses great-circle distance to estimate travel time. Less accurate than
//! OSRM (ignores roads) but always available and has no network dependency,
//! which makes it the natural choice for tests.

use crate::error::PlannerError;
use crate::model::Location;
use crate::routing::RoutingBackend;

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine-based routing backend.
///
/// Estimates travel time using straight-line distance and an assumed speed.
#[derive(Debug, Clone)]
pub struct HaversineBackend {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineBackend {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineBackend {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    fn km_to_seconds(&self, km: f64) -> i64 {
        let hours = km / self.speed_kmh;
        (hours * 3600.0).round() as i64
    }
}

/// Great-circle distance between two `(lat, lon)` points, in metres.
pub fn haversine_metres(from: (f64, f64), to: (f64, f64)) -> f64 {
    haversine_km(from, to) * 1000.0
}

fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

impl RoutingBackend for HaversineBackend {
    fn duration_distance_matrix(
        &self,
        locations: &[Location],
    ) -> Result<(Vec<Vec<i64>>, Vec<Vec<i64>>), PlannerError> {
        let n = locations.len();
        let mut durations = vec![vec![0i64; n]; n];
        let mut distances = vec![vec![0i64; n]; n];

        for (i, from) in locations.iter().enumerate() {
            for (j, to) in locations.iter().enumerate() {
                if i == j {
                    continue;
                }
                let km = haversine_km((from.lat, from.lon), (to.lat, to.lon));
                distances[i][j] = (km * 1000.0).round() as i64;
                durations[i][j] = self.km_to_seconds(km);
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
            let km = haversine_km(
                (locations[i - 1].lat, locations[i - 1].lon),
                (locations[i].lat, locations[i].lon),
            );
            distances[i] = (km * 1000.0).round() as i64;
            durations[i] = self.km_to_seconds(km);
        }

        Ok((durations, distances))
    }
}
