//! Explicit, non-ambient planner configuration.
//!
//! This struct is threaded down every call in the pipeline as `&PlannerConfig`
//! — no thread-local, no global cell. [`crate::service::PlanningService`]
//! owns the single "request override vs. process default" merge step.

use serde::{Deserialize, Serialize};

use crate::model::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlannerType {
    OrTools,
    InsertionHeuristic,
    OrToolsInsertion,
    Halns,
}

impl Default for PlannerType {
    fn default() -> Self {
        PlannerType::OrTools
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PenaltyNodeType {
    Pickup,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PenaltyDirection {
    Earliness,
    Lateness,
}

/// One stackable time-window penalty. Several specs with the same
/// `node_type` may coexist (e.g. the three tiered drop-lateness specs in
/// [`PlannerConfig::default`]) — each expands to its own time-window
/// constraint in [`crate::instance::InstanceBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltySpec {
    pub node_type: PenaltyNodeType,
    pub direction: PenaltyDirection,
    pub is_hard: bool,
    pub weight: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub pickup_waiting_time: i64,
    pub drop_waiting_time: i64,
    pub pickup_asap_tolerance: i64,
    pub drop_asap_tolerance: i64,
    pub default_first_point_arrival_time: i64,
    pub default_first_point_arrival_distance: i64,
    pub default_courier_capacity: i64,
    pub planner_type: PlannerType,
    pub use_previous_solution: bool,
    pub use_courier_capacity: bool,
    pub fixed_time_buffer: i64,
    pub return_to_hub: bool,
    pub hub_location: Option<Location>,
    pub allow_wait_on_drop: bool,
    pub penalties: Vec<PenaltySpec>,
    /// Hard wall-clock budget for the route solver's improvement loop.
    pub time_limit_s: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        use PenaltyDirection::*;
        use PenaltyNodeType::*;

        Self {
            pickup_waiting_time: 0,
            drop_waiting_time: 240,
            pickup_asap_tolerance: 1200,
            drop_asap_tolerance: 1200,
            default_first_point_arrival_time: 1200,
            default_first_point_arrival_distance: 10000,
            default_courier_capacity: 10,
            planner_type: PlannerType::default(),
            use_previous_solution: true,
            use_courier_capacity: false,
            fixed_time_buffer: 600,
            return_to_hub: false,
            hub_location: None,
            allow_wait_on_drop: true,
            time_limit_s: 120,
            penalties: vec![
                PenaltySpec {
                    node_type: Pickup,
                    direction: Earliness,
                    is_hard: true,
                    weight: 0,
                    offset: 0,
                },
                PenaltySpec {
                    node_type: Pickup,
                    direction: Lateness,
                    is_hard: false,
                    weight: 1,
                    offset: 0,
                },
                PenaltySpec {
                    node_type: Drop,
                    direction: Earliness,
                    is_hard: false,
                    weight: 10,
                    offset: 0,
                },
                PenaltySpec {
                    node_type: Drop,
                    direction: Lateness,
                    is_hard: false,
                    weight: 25,
                    offset: 0,
                },
                PenaltySpec {
                    node_type: Drop,
                    direction: Lateness,
                    is_hard: false,
                    weight: 50,
                    offset: 1200,
                },
                PenaltySpec {
                    node_type: Drop,
                    direction: Lateness,
                    is_hard: false,
                    weight: 100,
                    offset: 2400,
                },
            ],
        }
    }
}

impl PlannerConfig {
    /// Merge a request-scoped override on top of a process default: any
    /// field the caller actually cares to override comes in as a full
    /// struct, since there is no ambient config to fall back into field by
    /// field. This is the one explicit "resolve config" step the service
    /// performs, in place of the thread-local lookup this is deliberately
    /// not reproducing.
    pub fn merge_override(default: &PlannerConfig, override_cfg: Option<PlannerConfig>) -> PlannerConfig {
        override_cfg.unwrap_or_else(|| default.clone())
    }

    /// Service time charged at a node, by event type.
    pub fn service_time(&self, event_type: crate::model::DeliveryEventType) -> i64 {
        match event_type {
            crate::model::DeliveryEventType::Pickup => self.pickup_waiting_time,
            crate::model::DeliveryEventType::Drop => self.drop_waiting_time,
        }
    }

    /// `asap` tolerance to use for the given node type.
    pub fn asap_tolerance(&self, node_type: PenaltyNodeType) -> i64 {
        match node_type {
            PenaltyNodeType::Pickup => self.pickup_asap_tolerance,
            PenaltyNodeType::Drop => self.drop_asap_tolerance,
        }
    }
}
