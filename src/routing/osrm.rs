//! OSRM HTTP adapter: pairwise matrices and route geometry.
//!
//! Talks to a real OSRM server's `/table/v1/{profile}/{coords}` and
//! `/route/v1/{profile}/{coords}` endpoints. Table queries are batched in
//! chunks of [`TABLE_CHUNK_SIZE`] locations and route-segment queries in
//! chunks of [`ROUTE_CHUNK_SIZE`], joined with `rayon` before returning —
//! callers see one blocking call.

use rayon::prelude::*;
use serde::Deserialize;

use crate::error::PlannerError;
use crate::model::Location;
use crate::routing::polyline::Polyline;
use crate::routing::RoutingBackend;

/// Traffic coefficient applied to OSRM-reported durations. Distances are
/// never scaled — only durations, since distance is a physical
/// road-network quantity independent of congestion.
pub const TRAFFIC_COEFFICIENT: f64 = 1.5;

/// Max origins/destinations per `/table` request.
pub const TABLE_CHUNK_SIZE: usize = 100;

/// Max waypoints per `/route` request.
pub const ROUTE_CHUNK_SIZE: usize = 25;

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Full route geometry for an ordered set of waypoints.
#[derive(Debug, Clone)]
pub struct RouteGeometry {
    pub encoded_polyline: String,
    pub distance_meters: i64,
    pub duration_seconds: i64,
    pub legs: Vec<LegGeometry>,
}

#[derive(Debug, Clone)]
pub struct LegGeometry {
    pub encoded_polyline: String,
    pub distance_meters: i64,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct OsrmBackend {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmBackend {
    pub fn new(config: OsrmConfig) -> Result<Self, PlannerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Fetch full route geometry for an ordered list of waypoints (used by
    /// callers that want the polyline, not just durations/distances).
    pub fn get_route_geometry(&self, waypoints: &[Location]) -> Result<RouteGeometry, PlannerError> {
        if waypoints.len() < 2 {
            return Err(PlannerError::RoutingError(
                "route geometry requires at least two waypoints".to_string(),
            ));
        }

        let coords = coords_param(waypoints);
        let url = format!(
            "{}/route/v1/{}/{}?overview=full&geometries=polyline&steps=true",
            self.config.base_url, self.config.profile, coords
        );

        let body: OsrmRouteResponse = self
            .client
            .get(&url)
            .send()?
            .error_for_status()?
            .json()?;

        if body.code != "Ok" {
            return Err(PlannerError::RoutingError(format!(
                "OSRM returned status {}",
                body.code
            )));
        }

        let route = body.routes.into_iter().next().ok_or_else(|| {
            PlannerError::RoutingError("OSRM returned no route".to_string())
        })?;

        let legs = route
            .legs
            .into_iter()
            .map(|leg| {
                let leg_polyline = if leg.steps.is_empty() {
                    String::new()
                } else {
                    combine_step_geometries(&leg.steps)
                };

                LegGeometry {
                    encoded_polyline: leg_polyline,
                    distance_meters: leg.distance.round() as i64,
                    duration_seconds: leg.duration.round() as i64,
                }
            })
            .collect();

        Ok(RouteGeometry {
            encoded_polyline: route.geometry,
            distance_meters: route.distance.round() as i64,
            duration_seconds: route.duration.round() as i64,
            legs,
        })
    }

    /// Query a sub-matrix: `sources` rows against the full `all_locations`
    /// column set, using OSRM's explicit `sources=`/`destinations=` index
    /// parameters so the response shape never depends on array-splicing.
    fn fetch_table_chunk(
        &self,
        all_locations: &[Location],
        source_start: usize,
        source_end: usize,
    ) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>), PlannerError> {
        if all_locations.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let coords = coords_param(all_locations);
        let sources = (source_start..source_end)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let destinations = (0..all_locations.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");

        let url = format!(
            "{}/table/v1/{}/{}?annotations=duration,distance&sources={}&destinations={}",
            self.config.base_url, self.config.profile, coords, sources, destinations
        );

        let body: OsrmTableResponse = self
            .client
            .get(&url)
            .send()?
            .error_for_status()?
            .json()?;

        Ok((
            body.durations.unwrap_or_default(),
            body.distances.unwrap_or_default(),
        ))
    }
}

/// Split the origin set into `chunk_size`-row blocks, querying each block
/// against the full destination set concurrently, and stitch the results
/// back into one square matrix — the batched concurrent fetch the reference
/// planner performs, expressed with `rayon`.
fn fetch_full_matrix(
    backend: &OsrmBackend,
    locations: &[Location],
    chunk_size: usize,
) -> Result<(Vec<Vec<i64>>, Vec<Vec<i64>>), PlannerError> {
    let n = locations.len();
    if n == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let chunk_starts: Vec<usize> = (0..n).step_by(chunk_size).collect();

    let chunk_results: Result<Vec<(usize, Vec<Vec<f64>>, Vec<Vec<f64>>)>, PlannerError> = chunk_starts
        .par_iter()
        .map(|&start| {
            let end = (start + chunk_size).min(n);
            let (durations, distances) = backend.fetch_table_chunk(locations, start, end)?;
            Ok((start, durations, distances))
        })
        .collect();

    let mut durations = vec![vec![0i64; n]; n];
    let mut distances = vec![vec![0i64; n]; n];

    for (start, chunk_durations, chunk_distances) in chunk_results? {
        for (r, row) in chunk_durations.iter().enumerate() {
            for (c, &raw_duration) in row.iter().enumerate() {
                durations[start + r][c] = (raw_duration * TRAFFIC_COEFFICIENT).round() as i64;
            }
        }
        for (r, row) in chunk_distances.iter().enumerate() {
            for (c, &raw_distance) in row.iter().enumerate() {
                distances[start + r][c] = raw_distance.round() as i64;
            }
        }
    }

    Ok((durations, distances))
}

impl RoutingBackend for OsrmBackend {
    fn duration_distance_matrix(
        &self,
        locations: &[Location],
    ) -> Result<(Vec<Vec<i64>>, Vec<Vec<i64>>), PlannerError> {
        fetch_full_matrix(self, locations, TABLE_CHUNK_SIZE)
    }

    fn duration_distance_route(
        &self,
        locations: &[Location],
    ) -> Result<(Vec<i64>, Vec<i64>), PlannerError> {
        if locations.len() < 2 {
            return Ok((vec![0; locations.len()], vec![0; locations.len()]));
        }

        // Consecutive chunks of up to ROUTE_CHUNK_SIZE waypoints, each chunk
        // sharing its first waypoint with the previous chunk's last one, so
        // every inter-waypoint leg is covered exactly once.
        let mut chunk_starts = Vec::new();
        let mut start = 0usize;
        while start < locations.len() - 1 {
            chunk_starts.push(start);
            start += ROUTE_CHUNK_SIZE - 1;
        }

        let chunk_results: Result<Vec<(usize, Vec<i64>, Vec<i64>)>, PlannerError> = chunk_starts
            .par_iter()
            .map(|&chunk_start| -> Result<(usize, Vec<i64>, Vec<i64>), PlannerError> {
                let chunk_end = (chunk_start + ROUTE_CHUNK_SIZE).min(locations.len());
                let window = &locations[chunk_start..chunk_end];
                let geometry = self.get_route_geometry(window)?;
                let mut durations = vec![0i64];
                let mut distances = vec![0i64];
                for leg in &geometry.legs {
                    durations.push((leg.duration_seconds as f64 * TRAFFIC_COEFFICIENT).round() as i64);
                    distances.push(leg.distance_meters);
                }
                Ok((chunk_start, durations, distances))
            })
            .collect();

        let mut durations = vec![0i64; locations.len()];
        let mut distances = vec![0i64; locations.len()];
        for (chunk_start, chunk_durations, chunk_distances) in chunk_results? {
            for (offset, (&d, &m)) in chunk_durations.iter().zip(chunk_distances.iter()).enumerate() {
                if offset == 0 && chunk_start != 0 {
                    // Shared boundary waypoint already has its leg recorded
                    // by the previous chunk.
                    continue;
                }
                durations[chunk_start + offset] = d;
                distances[chunk_start + offset] = m;
            }
        }

        Ok((durations, distances))
    }
}

fn coords_param(locations: &[Location]) -> String {
    locations
        .iter()
        .map(|loc| format!("{:.6},{:.6}", loc.lon, loc.lat))
        .collect::<Vec<_>>()
        .join(";")
}

/// Combine step geometries into a single polyline for the leg.
fn combine_step_geometries(steps: &[OsrmRouteStep]) -> String {
    let mut all_points: Vec<(f64, f64)> = Vec::new();

    for step in steps {
        let decoded = decode_polyline(&step.geometry);
        if all_points.is_empty() {
            all_points.extend(decoded.into_points());
        } else {
            all_points.extend(decoded.into_points().into_iter().skip(1));
        }
    }

    encode_polyline(&Polyline::new(all_points))
}

/// Decode a Google Polyline Algorithm encoded string into coordinates.
fn decode_polyline(encoded: &str) -> Polyline {
    let mut points = Vec::new();
    let mut lat = 0i64;
    let mut lng = 0i64;
    let mut index = 0;
    let chars: Vec<char> = encoded.chars().collect();

    while index < chars.len() {
        let mut shift = 0;
        let mut result = 0i64;
        loop {
            if index >= chars.len() {
                break;
            }
            let b = (chars[index] as i64) - 63;
            index += 1;
            result |= (b & 0x1f) << shift;
            shift += 5;
            if b < 0x20 {
                break;
            }
        }
        lat += if (result & 1) != 0 { !(result >> 1) } else { result >> 1 };

        shift = 0;
        result = 0;
        loop {
            if index >= chars.len() {
                break;
            }
            let b = (chars[index] as i64) - 63;
            index += 1;
            result |= (b & 0x1f) << shift;
            shift += 5;
            if b < 0x20 {
                break;
            }
        }
        lng += if (result & 1) != 0 { !(result >> 1) } else { result >> 1 };

        points.push((lat as f64 / 1e5, lng as f64 / 1e5));
    }

    Polyline::new(points)
}

/// Encode coordinates into a Google Polyline Algorithm string.
fn encode_polyline(points: &Polyline) -> String {
    let mut encoded = String::new();
    let mut prev_lat = 0i64;
    let mut prev_lng = 0i64;

    for &(lat, lng) in points.points() {
        let lat_e5 = (lat * 1e5).round() as i64;
        let lng_e5 = (lng * 1e5).round() as i64;

        encode_value(lat_e5 - prev_lat, &mut encoded);
        encode_value(lng_e5 - prev_lng, &mut encoded);

        prev_lat = lat_e5;
        prev_lng = lng_e5;
    }

    encoded
}

fn encode_value(mut value: i64, output: &mut String) {
    if value < 0 {
        value = !value;
        value <<= 1;
        value |= 1;
    } else {
        value <<= 1;
    }

    while value >= 0x20 {
        let chunk = ((value & 0x1f) | 0x20) as u8 + 63;
        output.push(chunk as char);
        value >>= 5;
    }

    output.push((value as u8 + 63) as char);
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    durations: Option<Vec<Vec<f64>>>,
    distances: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: String,
    distance: f64,
    duration: f64,
    legs: Vec<OsrmRouteLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteLeg {
    distance: f64,
    duration: f64,
    #[serde(default)]
    steps: Vec<OsrmRouteStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteStep {
    geometry: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polyline_roundtrip() {
        let points = Polyline::new(vec![(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)]);
        let encoded = encode_polyline(&points);
        let decoded = decode_polyline(&encoded);

        for (a, b) in points.points().iter().zip(decoded.points()) {
            assert!((a.0 - b.0).abs() < 1e-4);
            assert!((a.1 - b.1).abs() < 1e-4);
        }
    }

    #[test]
    fn test_coords_param_order_is_lon_lat() {
        let locations = vec![Location::new(36.1, -115.1)];
        assert_eq!(coords_param(&locations), "-115.100000,36.100000");
    }
}
