//! TimetableLP: per-route timetable refinement.
//!
//! Once [`crate::solver::RouteSolver`] has fixed the *order* of stops on a
//! route, this module finds the penalty-optimal ETAs/ETDs for that fixed
//! order — a small LP, solved independently per route. Hard windows become
//! hard constraints; soft windows become a slack variable penalized in the
//! objective, mirroring the piecewise-linear tardiness penalties in
//! [`crate::config::PenaltySpec`].

use good_lp::{constraint, variable, Expression, Solution, SolverModel, Variable};

use crate::config::PlannerConfig;
use crate::error::PlannerError;
use crate::instance::{VrpInstance, WindowBound, EDGE_FORBIDDEN};
use crate::model::DeliveryEventType;

pub struct TimetableResult {
    pub etas: Vec<i64>,
    pub etds: Vec<i64>,
    pub total_penalty: f64,
}

pub struct TimetableLp;

impl TimetableLp {
    /// Solve the timetable LP for a single route (a fixed node order).
    /// Returns [`PlannerError::PlanUnfeasible`] if the fixed order cannot
    /// satisfy the route's hard time windows.
    pub fn solve_route(
        instance: &VrpInstance,
        config: &PlannerConfig,
        route_idx: usize,
        nodes: &[usize],
    ) -> Result<TimetableResult, PlannerError> {
        if nodes.is_empty() {
            return Ok(TimetableResult {
                etas: Vec::new(),
                etds: Vec::new(),
                total_penalty: 0.0,
            });
        }

        let span = tracing::debug_span!("timetable_lp::solve_route", route_idx, stops = nodes.len());
        let _enter = span.enter();

        let (start_lower, _) = instance.start_time_windows[route_idx];
        let rebase = start_lower as f64;

        let mut problem_vars = good_lp::variables!();
        let mut eta_vars: Vec<Variable> = Vec::with_capacity(nodes.len());
        let mut etd_vars: Vec<Variable> = Vec::with_capacity(nodes.len());
        for _ in nodes {
            eta_vars.push(problem_vars.add(variable().min(0.0)));
            etd_vars.push(problem_vars.add(variable().min(0.0)));
        }

        let mut slack_vars: Vec<(Variable, i64)> = Vec::new();
        let mut objective = Expression::from(0.0);

        let mut constraints = Vec::new();

        // Transition from the route's start depot into the first stop, and
        // between consecutive stops.
        let mut prev_node = instance.starts[route_idx];
        let mut prev_etd_expr: Expression = Expression::from(start_lower as f64 - rebase);

        for (i, &node) in nodes.iter().enumerate() {
            let travel = instance.duration_matrix[prev_node][node];
            if travel >= EDGE_FORBIDDEN {
                return Err(PlannerError::PlanUnfeasible(format!(
                    "no route from node {prev_node} to node {node}"
                )));
            }

            constraints.push(constraint!(eta_vars[i] >= prev_etd_expr.clone() + travel as f64));
            constraints.push(constraint!(eta_vars[i] <= prev_etd_expr.clone() + travel as f64));

            let event_type = node_event_type(instance, node);
            let service = match event_type {
                DeliveryEventType::Pickup => instance.pickup_service_time,
                DeliveryEventType::Drop => instance.drop_service_time,
            } as f64;

            if config.allow_wait_on_drop && event_type == DeliveryEventType::Drop {
                constraints.push(constraint!(etd_vars[i] >= eta_vars[i] + service));
            } else {
                constraints.push(constraint!(etd_vars[i] == eta_vars[i] + service));
            }

            if let Some(bounds) = instance.time_windows_by_node.get(&node) {
                for bound in bounds {
                    match *bound {
                        WindowBound::HardLower(l) => {
                            constraints.push(constraint!(etd_vars[i] >= l as f64 - rebase));
                        }
                        WindowBound::HardUpper(u) => {
                            constraints.push(constraint!(eta_vars[i] <= u as f64 - rebase));
                        }
                        WindowBound::SoftLower { bound, weight } => {
                            let slack = problem_vars.add(variable().min(0.0));
                            constraints.push(constraint!(etd_vars[i] + slack >= bound as f64 - rebase));
                            objective = objective + weight as f64 * slack;
                            slack_vars.push((slack, weight));
                        }
                        WindowBound::SoftUpper { bound, weight } => {
                            let slack = problem_vars.add(variable().min(0.0));
                            constraints.push(constraint!(eta_vars[i] - slack <= bound as f64 - rebase));
                            objective = objective + weight as f64 * slack;
                            slack_vars.push((slack, weight));
                        }
                    }
                }
            }

            prev_node = node;
            prev_etd_expr = Expression::from(etd_vars[i]);
        }

        let mut model = problem_vars
            .minimise(objective)
            .using(good_lp::solvers::microlp::microlp);
        for c in constraints {
            model = model.with(c);
        }

        let solution = model.solve().map_err(|err| {
            PlannerError::PlanUnfeasible(format!("route {route_idx} timetable: {err}"))
        })?;

        let etas: Vec<i64> = eta_vars
            .iter()
            .map(|v| (solution.value(*v) + rebase).round() as i64)
            .collect();
        let etds: Vec<i64> = etd_vars
            .iter()
            .map(|v| (solution.value(*v) + rebase).round() as i64)
            .collect();
        let total_penalty: f64 = slack_vars
            .iter()
            .map(|(v, weight)| *weight as f64 * solution.value(*v))
            .sum();

        tracing::debug!(route_idx, total_penalty, "timetable solved");

        Ok(TimetableResult { etas, etds, total_penalty })
    }
}

fn node_event_type(instance: &VrpInstance, node: usize) -> DeliveryEventType {
    if instance.pickup_nodes.contains(&node) {
        DeliveryEventType::Pickup
    } else {
        DeliveryEventType::Drop
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::PlannerConfig;

    fn tiny_instance() -> VrpInstance {
        // start(0) -> pickup(2) -> drop(3) -> end(1), single plan.
        let n = 4;
        let mut duration_matrix = vec![vec![EDGE_FORBIDDEN; n]; n];
        let mut distance_matrix = vec![vec![0i64; n]; n];
        duration_matrix[0][0] = 0;
        duration_matrix[0][2] = 300;
        duration_matrix[2][3] = 600;
        duration_matrix[3][1] = 0;
        duration_matrix[1][1] = 0;
        for row in distance_matrix.iter_mut() {
            for v in row.iter_mut() {
                *v = 0;
            }
        }

        VrpInstance {
            duration_matrix,
            distance_matrix,
            num_plans: 1,
            starts: vec![0],
            ends: vec![1],
            pickup_nodes: vec![2],
            drop_nodes: vec![3],
            deliveries_not_started: vec![(2, 3)],
            deliveries_in_progress: vec![],
            start_time_windows: vec![(1_000, 1_000)],
            time_windows_by_node: HashMap::new(),
            pickup_service_time: 60,
            drop_service_time: 120,
            courier_capacities: None,
            start_utilizations: None,
            node_demands: None,
            previous_plans: None,
            time_limit_s: 5,
        }
    }

    #[test]
    fn solves_unconstrained_route() {
        let instance = tiny_instance();
        let config = PlannerConfig::default();
        let result = TimetableLp::solve_route(&instance, &config, 0, &[2, 3]).unwrap();

        assert_eq!(result.etas[0], 1_300); // 1000 + 300 travel
        assert_eq!(result.etds[0], 1_360); // + 60s pickup service
        assert_eq!(result.etas[1], 1_960); // + 600 travel
        assert_eq!(result.etds[1], 2_080); // + 120s drop service
        assert_eq!(result.total_penalty, 0.0);
    }

    #[test]
    fn penalizes_late_arrival_past_soft_upper() {
        let mut instance = tiny_instance();
        instance
            .time_windows_by_node
            .insert(3, vec![WindowBound::SoftUpper { bound: 1_900, weight: 50 }]);
        let config = PlannerConfig::default();

        let result = TimetableLp::solve_route(&instance, &config, 0, &[2, 3]).unwrap();
        assert_eq!(result.etas[1], 1_960);
        assert!((result.total_penalty - 50.0 * 60.0).abs() < 1e-6);
    }

    #[test]
    fn infeasible_hard_window_returns_plan_unfeasible() {
        let mut instance = tiny_instance();
        instance
            .time_windows_by_node
            .insert(3, vec![WindowBound::HardUpper(1_500)]);
        let config = PlannerConfig::default();

        let err = TimetableLp::solve_route(&instance, &config, 0, &[2, 3]).unwrap_err();
        assert!(matches!(err, PlannerError::PlanUnfeasible(_)));
    }
}
