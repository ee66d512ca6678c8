//! Crate-wide error taxonomy.

use thiserror::Error;

/// Errors surfaced by the planning pipeline.
///
/// Variants map 1:1 onto the HTTP status codes a thin API layer built on top
/// of this crate would return: `NoSolution` -> 404, `RoutingError` -> 500,
/// `ValidationError` -> 406, `ParseError` -> 400. `PlanUnfeasible` is never
/// returned to a caller of [`crate::service::PlanningService`]; it is caught
/// and logged internally by the route solver's per-route timetable pass.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The route solver found no feasible assignment for the given instance.
    #[error("no feasible solution for the given instance")]
    NoSolution,

    /// The timetable LP rejected a single route. Recovered internally;
    /// exposed as a variant so the LP module has a typed failure to return.
    #[error("route timetable is infeasible: {0}")]
    PlanUnfeasible(String),

    /// The routing backend failed (network error, non-2xx response, or a
    /// malformed payload).
    #[error("routing backend failure: {0}")]
    RoutingError(String),

    /// An input violated a data-model invariant.
    #[error("validation failed: {0}")]
    ValidationError(String),

    /// A request body could not be parsed.
    #[error("failed to parse request body: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl From<reqwest::Error> for PlannerError {
    fn from(err: reqwest::Error) -> Self {
        PlannerError::RoutingError(err.to_string())
    }
}
