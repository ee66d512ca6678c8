//! Test fixtures for the delivery planner.
//!
//! Provides realistic test data including:
//! - Real Las Vegas / Henderson locations (from OpenStreetMap)
//! - A deterministic, network-free `RoutingBackend` for solver/assembler tests

pub mod las_vegas_locations;
pub mod mock_backend;

pub use las_vegas_locations::*;
