//! Same-day delivery planner core.
//!
//! A same-day courier fleet planner: given delivery orders (pickup + drop,
//! time windows, size) and couriers (location, capacity, in-progress work),
//! builds an indexed VRP instance, searches for a feasible low-penalty route
//! assignment, fits a penalty-optimal per-stop timetable via linear
//! programming, and assembles the result into user-facing [`model::Plan`]s.
//!
//! [`service::PlanningService`] is the top-level entry point; everything
//! else is a component in its pipeline (see each module's docs).

pub mod assembler;
pub mod config;
pub mod error;
pub mod instance;
pub mod model;
pub mod routing;
pub mod service;
pub mod solver;
pub mod timetable;

pub use error::PlannerError;

/// Installs a `tracing-subscriber` `EnvFilter`-based global subscriber.
///
/// Intended for binaries and tests — this crate never installs a global
/// subscriber on its own, since a library imposing one on its callers is
/// rarely what they want.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
