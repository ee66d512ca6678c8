//! PlanningService: the top-level façade wiring
//! Config → InstanceBuilder → RouteSolver → TimetableLP → PlanAssembler.
//!
//! This is the one place the "resolve request override vs. process default"
//! config merge happens (§9, Request-scoped configuration), and the one
//! place an unexpected failure is logged to the failure-log sink before
//! being returned to the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::assembler::PlanAssembler;
use crate::config::{PlannerConfig, PlannerType};
use crate::error::PlannerError;
use crate::instance::{InstanceBuilder, VrpSolution};
use crate::model::{Courier, Delivery, Location, Plan, TimeBlock};
use crate::routing::{RouteTrace, RoutingBackend, TimedStop};
use crate::solver::RouteSolver;
use crate::timetable::TimetableLp;

/// The top-level planning façade. Holds a process-default [`PlannerConfig`]
/// and the shared [`RoutingBackend`]; every call may override the config
/// for that one request, mirroring the `config?` field on each HTTP body
/// in §6 without any thread-local or global config cell.
pub struct PlanningService {
    default_config: PlannerConfig,
    backend: Box<dyn RoutingBackend + Send + Sync>,
    failure_log_dir: PathBuf,
}

impl PlanningService {
    pub fn new(default_config: PlannerConfig, backend: Box<dyn RoutingBackend + Send + Sync>) -> Self {
        Self {
            default_config,
            backend,
            failure_log_dir: PathBuf::from("logs"),
        }
    }

    /// Override the directory the failure-log sink writes into (default
    /// `"logs"`, relative to the process's working directory).
    pub fn with_failure_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.failure_log_dir = dir.into();
        self
    }

    /// One-shot or continuous-replanning solve: `create_plans(deliveries,
    /// &[], num_vehicles, None)` is the `/logistics` contract;
    /// `create_plans(deliveries, couriers, min_number_of_plans,
    /// current_plans)` is `/continuous` (§6).
    pub fn create_plans(
        &self,
        deliveries: &[Delivery],
        couriers: &[Courier],
        min_number_of_plans: usize,
        previous_plans: Option<&[Plan]>,
    ) -> Result<Vec<Plan>, PlannerError> {
        self.create_plans_with_config(deliveries, couriers, min_number_of_plans, previous_plans, None)
    }

    /// Same as [`Self::create_plans`], but with an explicit per-request
    /// config override, matching the `config?` body field in §6.
    pub fn create_plans_with_config(
        &self,
        deliveries: &[Delivery],
        couriers: &[Courier],
        min_number_of_plans: usize,
        previous_plans: Option<&[Plan]>,
        config_override: Option<PlannerConfig>,
    ) -> Result<Vec<Plan>, PlannerError> {
        let span = tracing::info_span!(
            "planning_service::create_plans",
            deliveries = deliveries.len(),
            couriers = couriers.len(),
            min_number_of_plans
        );
        let _enter = span.enter();

        let config = PlannerConfig::merge_override(&self.default_config, config_override);

        let result = self.solve(deliveries, couriers, min_number_of_plans, previous_plans, &config);

        if let Err(err) = &result {
            self.log_failure(deliveries, couriers, min_number_of_plans, err);
        }

        result
    }

    fn solve(
        &self,
        deliveries: &[Delivery],
        couriers: &[Courier],
        min_number_of_plans: usize,
        previous_plans: Option<&[Plan]>,
        config: &PlannerConfig,
    ) -> Result<Vec<Plan>, PlannerError> {
        if config.planner_type == PlannerType::Halns {
            return Err(PlannerError::RoutingError(
                "HALNS planner_type has no native implementation in this crate".to_string(),
            ));
        }

        let now = now_unix();
        let (instance, mapping) = InstanceBuilder::build(
            deliveries,
            couriers,
            min_number_of_plans,
            previous_plans,
            config,
            self.backend.as_ref(),
            now,
        )?;

        let solution = RouteSolver::solve(&instance, config)?;
        Ok(PlanAssembler::assemble(&instance, &mapping, &solution, config))
    }

    /// `/timetable/optimize`: refine one already-assigned plan's timetable
    /// without re-running route assignment. Forces
    /// `use_previous_solution = true` internally (§6).
    pub fn optimize_timetable(
        &self,
        deliveries: &[Delivery],
        courier: &Courier,
        plan: &Plan,
        config_override: Option<PlannerConfig>,
    ) -> Result<(Vec<TimeBlock>, Vec<Option<i64>>), PlannerError> {
        let span = tracing::info_span!("planning_service::optimize_timetable", delivery_count = deliveries.len());
        let _enter = span.enter();

        let mut config = PlannerConfig::merge_override(&self.default_config, config_override);
        config.use_previous_solution = true;

        let now = now_unix();
        let couriers = std::slice::from_ref(courier);
        let previous_plans = std::slice::from_ref(plan);

        let (instance, mapping) = InstanceBuilder::build(
            deliveries,
            couriers,
            1,
            Some(previous_plans),
            &config,
            self.backend.as_ref(),
            now,
        )?;

        let route_nodes = instance
            .previous_plans
            .as_ref()
            .and_then(|routes| routes.first())
            .cloned()
            .unwrap_or_default();

        let refined = TimetableLp::solve_route(&instance, &config, 0, &route_nodes)?;

        let solution = VrpSolution {
            plans: vec![route_nodes],
            etas: vec![refined.etas],
            etds: vec![refined.etds],
        };

        let mut plans = PlanAssembler::assemble(&instance, &mapping, &solution, &config);
        let assembled = plans.pop().unwrap_or_else(|| Plan {
            delivery_events: Vec::new(),
            delivery_order_ids: Vec::new(),
            duration_s: 0,
            distance_m: 0,
            mode: crate::model::Mode::Car,
            assigned_courier_id: None,
            delivery_plan_id: None,
        });

        let time_blocks: Vec<TimeBlock> = assembled.delivery_events.iter().map(|e| e.event_time).collect();
        let fixed_times: Vec<Option<i64>> = assembled.delivery_events.iter().map(|e| e.fixed_time).collect();

        Ok((time_blocks, fixed_times))
    }

    /// `/routing`: timestamp an ordered list of locations, starting from
    /// `starting_time` (or "now" when absent). A thin pass-through to
    /// [`RoutingBackend::duration_distance_route`] (§6).
    pub fn route_along(
        &self,
        locations: &[Location],
        starting_time: Option<i64>,
    ) -> Result<RouteTrace, PlannerError> {
        let (durations, distances) = self.backend.duration_distance_route(locations)?;

        let mut time = starting_time.unwrap_or_else(now_unix);
        let mut stops = Vec::with_capacity(locations.len());
        for (i, &location) in locations.iter().enumerate() {
            time += durations.get(i).copied().unwrap_or(0);
            stops.push(TimedStop {
                location,
                arrival_time: time,
                leg_distance_m: distances.get(i).copied().unwrap_or(0),
            });
        }

        Ok(RouteTrace { stops })
    }

    /// Best-effort failure-log sink (§6): writes
    /// `logs/failed_instance_<UTC-timestamp>.json` on an unexpected error.
    /// A failure to write the log is only logged, never allowed to mask or
    /// replace the original error returned to the caller.
    fn log_failure(
        &self,
        deliveries: &[Delivery],
        couriers: &[Courier],
        min_number_of_plans: usize,
        err: &PlannerError,
    ) {
        #[derive(Serialize)]
        struct FailedInstance<'a> {
            deliveries: &'a [Delivery],
            couriers: &'a [Courier],
            min_number_of_plans: usize,
            exception: String,
        }

        let record = FailedInstance {
            deliveries,
            couriers,
            min_number_of_plans,
            exception: err.to_string(),
        };

        if let Err(write_err) = write_failure_log(&self.failure_log_dir, &record) {
            tracing::error!(error = %write_err, "failed to write failure-log sink");
        }
    }
}

fn write_failure_log(dir: &Path, record: &impl Serialize) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let path = dir.join(format!("failed_instance_{timestamp}.json"));
    let json = serde_json::to_vec_pretty(record)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    fs::write(path, json)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
