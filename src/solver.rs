//! RouteSolver: searches for a feasible, low-cost route assignment.
//!
//! Implemented as a constraint-respecting local-search metaheuristic
//! (greedy feasible-insertion construction, then 2-opt / relocate / fairness
//! rebalancing improvement passes) rather than a CP-SAT style solver — the
//! observable contract (§4.2: pickup-before-drop, vehicle pinning, capacity,
//! count fairness, time windows, `NoSolution` on failure) is what matters,
//! not the search technique used to satisfy it.

use std::time::{Duration, Instant};

use crate::config::PlannerConfig;
use crate::error::PlannerError;
use crate::instance::{VrpInstance, VrpSolution, WindowBound};
use crate::model::DeliveryEventType;
use crate::timetable::TimetableLp;

/// Soft fairness slack added on top of the even split, per the reference
/// planner's count-dimension setup. Preserve as-is (§9, Design Notes).
const FAIRNESS_SLACK: i64 = 6;
/// Penalty weight per stop over the fairness bound (five minutes, in
/// seconds, mirroring the reference planner's `5 * 60`).
const FAIRNESS_WEIGHT: i64 = 300;

#[derive(Debug, Clone)]
struct RouteState {
    nodes: Vec<usize>,
}

impl RouteState {
    fn new() -> Self {
        Self { nodes: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy)]
enum Job {
    /// Pickup+drop pair that must ride one vehicle, pickup before drop.
    Pair { pickup: usize, drop: usize },
    /// Drop already pinned to a specific vehicle (pickup already happened).
    Pinned { courier_idx: usize, drop: usize },
}

pub struct RouteSolver;

impl RouteSolver {
    /// Search for a feasible route assignment, then refine each route's
    /// timetable via LP. Returns [`PlannerError::NoSolution`] if no feasible
    /// assignment exists at all.
    pub fn solve(instance: &VrpInstance, config: &PlannerConfig) -> Result<VrpSolution, PlannerError> {
        let span = tracing::info_span!(
            "route_solver::solve",
            num_plans = instance.num_plans,
            num_drops = instance.drop_nodes.len()
        );
        let _enter = span.enter();

        let deadline = Instant::now() + Duration::from_secs(instance.time_limit_s.max(0) as u64);
        let max_improving_moves = 100 + 15 * instance.drop_nodes.len() as i64;

        let mut routes = initial_routes(instance);

        let mut jobs: Vec<Job> = Vec::new();
        for &(courier_idx, drop) in &instance.deliveries_in_progress {
            jobs.push(Job::Pinned { courier_idx, drop });
        }
        for &(pickup, drop) in &instance.deliveries_not_started {
            jobs.push(Job::Pair { pickup, drop });
        }

        for job in &jobs {
            if already_placed(&routes, job) {
                continue;
            }
            if !insert_job(instance, &mut routes, *job) {
                tracing::warn!(?job, "no feasible insertion found for job");
                return Err(PlannerError::NoSolution);
            }
        }

        local_search(instance, &mut routes, deadline, max_improving_moves);

        extract_solution(instance, config, &routes)
    }
}

fn initial_routes(instance: &VrpInstance) -> Vec<RouteState> {
    match &instance.previous_plans {
        Some(previous) => previous
            .iter()
            .map(|nodes| RouteState { nodes: nodes.clone() })
            .collect(),
        None => (0..instance.num_plans).map(|_| RouteState::new()).collect(),
    }
}

fn already_placed(routes: &[RouteState], job: &Job) -> bool {
    let drop = match job {
        Job::Pair { drop, .. } => *drop,
        Job::Pinned { drop, .. } => *drop,
    };
    routes.iter().any(|r| r.nodes.contains(&drop))
}

/// Find the cheapest feasible insertion for a job across all eligible
/// routes and apply it. Returns false if no feasible insertion exists.
fn insert_job(instance: &VrpInstance, routes: &mut [RouteState], job: Job) -> bool {
    let mut best: Option<(usize, Vec<usize>, f64)> = None;

    let candidate_routes: Vec<usize> = match job {
        Job::Pinned { courier_idx, .. } => vec![courier_idx],
        Job::Pair { .. } => (0..routes.len()).collect(),
    };

    for route_idx in candidate_routes {
        let base = &routes[route_idx].nodes;
        match job {
            Job::Pinned { drop, .. } => {
                for pos in 0..=base.len() {
                    let mut candidate = base.clone();
                    candidate.insert(pos, drop);
                    if let Some(cost) = evaluate_route(instance, route_idx, &candidate) {
                        if best.as_ref().map(|(_, _, c)| cost < *c).unwrap_or(true) {
                            best = Some((route_idx, candidate, cost));
                        }
                    }
                }
            }
            Job::Pair { pickup, drop } => {
                for pickup_pos in 0..=base.len() {
                    let mut with_pickup = base.clone();
                    with_pickup.insert(pickup_pos, pickup);
                    for drop_pos in pickup_pos + 1..=with_pickup.len() {
                        let mut candidate = with_pickup.clone();
                        candidate.insert(drop_pos, drop);
                        if let Some(cost) = evaluate_route(instance, route_idx, &candidate) {
                            if best.as_ref().map(|(_, _, c)| cost < *c).unwrap_or(true) {
                                best = Some((route_idx, candidate, cost));
                            }
                        }
                    }
                }
            }
        }
    }

    match best {
        Some((route_idx, nodes, _)) => {
            routes[route_idx].nodes = nodes;
            true
        }
        None => false,
    }
}

/// Evaluate a candidate route: feasibility (precedence, capacity, hard
/// windows) plus an approximate cost (distance + soft-window penalty +
/// fairness penalty) used to drive the search. Returns `None` if infeasible.
fn evaluate_route(instance: &VrpInstance, route_idx: usize, nodes: &[usize]) -> Option<f64> {
    if !respects_precedence(instance, nodes) {
        return None;
    }
    if !respects_capacity(instance, route_idx, nodes) {
        return None;
    }

    let schedule = compute_schedule(instance, route_idx, nodes)?;
    let distance: i64 = route_distance(instance, nodes);
    let fairness_penalty = fairness_penalty(instance, nodes.len());

    Some(distance as f64 + schedule.soft_penalty + fairness_penalty as f64)
}

fn respects_precedence(instance: &VrpInstance, nodes: &[usize]) -> bool {
    for &(pickup, drop) in &instance.deliveries_not_started {
        let pickup_pos = nodes.iter().position(|&n| n == pickup);
        let drop_pos = nodes.iter().position(|&n| n == drop);
        match (pickup_pos, drop_pos) {
            (Some(p), Some(d)) => {
                if p >= d {
                    return false;
                }
            }
            (None, Some(_)) => return false,
            _ => {}
        }
    }
    true
}

fn respects_capacity(instance: &VrpInstance, route_idx: usize, nodes: &[usize]) -> bool {
    let (Some(demands), Some(capacities), Some(utilizations)) = (
        &instance.node_demands,
        &instance.courier_capacities,
        &instance.start_utilizations,
    ) else {
        return true;
    };

    let capacity = capacities[route_idx];
    let mut load = utilizations[route_idx];
    for &node in nodes {
        load += demands[node];
        if load > capacity || load < 0 {
            return false;
        }
    }
    true
}

struct Schedule {
    etas: Vec<i64>,
    etds: Vec<i64>,
    soft_penalty: f64,
}

fn compute_schedule(instance: &VrpInstance, route_idx: usize, nodes: &[usize]) -> Option<Schedule> {
    let (mut time, _) = instance.start_time_windows[route_idx];
    let mut prev_node = instance.starts[route_idx];

    let mut etas = Vec::with_capacity(nodes.len());
    let mut etds = Vec::with_capacity(nodes.len());
    let mut soft_penalty = 0.0;

    for &node in nodes {
        let travel = instance.duration_matrix[prev_node][node];
        if travel >= crate::instance::EDGE_FORBIDDEN {
            return None;
        }
        let mut eta = time + travel;

        if let Some(bounds) = instance.time_windows_by_node.get(&node) {
            for bound in bounds {
                match *bound {
                    WindowBound::HardLower(l) => {
                        if eta < l {
                            eta = l;
                        }
                    }
                    WindowBound::HardUpper(u) => {
                        if eta > u {
                            return None;
                        }
                    }
                    _ => {}
                }
            }
        }

        let event_type = node_event_type(instance, node);
        let service = match event_type {
            DeliveryEventType::Pickup => instance.pickup_service_time,
            DeliveryEventType::Drop => instance.drop_service_time,
        };
        let etd = eta + service;

        if let Some(bounds) = instance.time_windows_by_node.get(&node) {
            for bound in bounds {
                match *bound {
                    WindowBound::SoftLower { bound, weight } => {
                        if etd < bound {
                            soft_penalty += (weight * (bound - etd)) as f64;
                        }
                    }
                    WindowBound::SoftUpper { bound, weight } => {
                        if eta > bound {
                            soft_penalty += (weight * (eta - bound)) as f64;
                        }
                    }
                    _ => {}
                }
            }
        }

        etas.push(eta);
        etds.push(etd);
        time = etd;
        prev_node = node;
    }

    Some(Schedule { etas, etds, soft_penalty })
}

fn node_event_type(instance: &VrpInstance, node: usize) -> DeliveryEventType {
    if instance.pickup_nodes.contains(&node) {
        DeliveryEventType::Pickup
    } else {
        debug_assert!(instance.drop_nodes.contains(&node));
        DeliveryEventType::Drop
    }
}

fn route_distance(instance: &VrpInstance, nodes: &[usize]) -> i64 {
    if nodes.is_empty() {
        return 0;
    }
    let mut total = 0i64;
    let mut prev = None;
    for &node in nodes {
        if let Some(p) = prev {
            total += instance.distance_matrix[p][node];
        }
        prev = Some(node);
    }
    total
}

fn fairness_bound(instance: &VrpInstance) -> i64 {
    let drops = instance.drop_nodes.len() as i64;
    let plans = instance.num_plans.max(1) as i64;
    (2 * drops + plans - 1) / plans + FAIRNESS_SLACK
}

fn fairness_penalty(instance: &VrpInstance, stop_count: usize) -> i64 {
    let bound = fairness_bound(instance);
    let over = stop_count as i64 - bound;
    if over > 0 {
        over * FAIRNESS_WEIGHT
    } else {
        0
    }
}

fn local_search(
    instance: &VrpInstance,
    routes: &mut [RouteState],
    deadline: Instant,
    max_improving_moves: i64,
) {
    let mut improving_moves = 0;
    loop {
        if Instant::now() >= deadline || improving_moves >= max_improving_moves {
            break;
        }

        let mut improved = false;

        for route_idx in 0..routes.len() {
            if two_opt_improve(instance, route_idx, &mut routes[route_idx]) {
                improved = true;
                improving_moves += 1;
            }
        }

        if relocate_improve(instance, routes) {
            improved = true;
            improving_moves += 1;
        }

        if !improved {
            break;
        }
    }
}

fn two_opt_improve(instance: &VrpInstance, route_idx: usize, route: &mut RouteState) -> bool {
    let n = route.nodes.len();
    if n < 3 {
        return false;
    }

    let current_cost = match evaluate_route(instance, route_idx, &route.nodes) {
        Some(c) => c,
        None => return false,
    };

    for i in 0..n - 1 {
        for j in i + 2..n {
            let mut candidate = route.nodes.clone();
            candidate[i + 1..=j].reverse();

            if let Some(cost) = evaluate_route(instance, route_idx, &candidate) {
                if cost < current_cost {
                    route.nodes = candidate;
                    return true;
                }
            }
        }
    }

    false
}

/// Relocate a single node (or fairness-driven block) between routes, or
/// within a route, when it reduces total cost.
fn relocate_improve(instance: &VrpInstance, routes: &mut [RouteState]) -> bool {
    let total_cost: f64 = routes
        .iter()
        .enumerate()
        .filter_map(|(i, r)| evaluate_route(instance, i, &r.nodes))
        .sum();

    for from_idx in 0..routes.len() {
        let from_len = routes[from_idx].nodes.len();
        for pos in 0..from_len {
            let node = routes[from_idx].nodes[pos];

            // Don't relocate a drop pinned to this specific vehicle.
            if instance
                .deliveries_in_progress
                .iter()
                .any(|&(c, d)| d == node && c == from_idx)
            {
                continue;
            }

            for to_idx in 0..routes.len() {
                if instance
                    .deliveries_in_progress
                    .iter()
                    .any(|&(c, d)| d == node && c != to_idx)
                {
                    continue;
                }

                let to_len = routes[to_idx].nodes.len();
                let insert_range = if from_idx == to_idx { to_len } else { to_len + 1 };

                for insert_pos in 0..insert_range {
                    if from_idx == to_idx && (insert_pos == pos || insert_pos == pos + 1) {
                        continue;
                    }

                    let mut from_candidate = routes[from_idx].nodes.clone();
                    from_candidate.remove(pos);

                    let mut to_candidate = if from_idx == to_idx {
                        from_candidate.clone()
                    } else {
                        routes[to_idx].nodes.clone()
                    };
                    let actual_pos = if from_idx == to_idx && insert_pos > pos {
                        insert_pos - 1
                    } else {
                        insert_pos
                    };
                    to_candidate.insert(actual_pos, node);

                    let from_nodes = if from_idx == to_idx { &to_candidate } else { &from_candidate };
                    let from_cost = match evaluate_route(instance, from_idx, from_nodes) {
                        Some(c) => c,
                        None => continue,
                    };

                    if from_idx == to_idx {
                        let other_cost: f64 = routes
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| *i != from_idx)
                            .filter_map(|(i, r)| evaluate_route(instance, i, &r.nodes))
                            .sum();
                        if from_cost + other_cost < total_cost {
                            routes[from_idx].nodes = to_candidate;
                            return true;
                        }
                        continue;
                    }

                    let to_cost = match evaluate_route(instance, to_idx, &to_candidate) {
                        Some(c) => c,
                        None => continue,
                    };
                    let other_cost: f64 = routes
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != from_idx && *i != to_idx)
                        .filter_map(|(i, r)| evaluate_route(instance, i, &r.nodes))
                        .sum();

                    if from_cost + to_cost + other_cost < total_cost {
                        routes[from_idx].nodes = from_candidate;
                        routes[to_idx].nodes = to_candidate;
                        return true;
                    }
                }
            }
        }
    }

    false
}

fn extract_solution(
    instance: &VrpInstance,
    config: &PlannerConfig,
    routes: &[RouteState],
) -> Result<VrpSolution, PlannerError> {
    let mut plans = Vec::with_capacity(routes.len());
    let mut etas = Vec::with_capacity(routes.len());
    let mut etds = Vec::with_capacity(routes.len());

    for (route_idx, route) in routes.iter().enumerate() {
        let schedule = compute_schedule(instance, route_idx, &route.nodes)
            .ok_or(PlannerError::NoSolution)?;

        let (refined_etas, refined_etds) =
            match TimetableLp::solve_route(instance, config, route_idx, &route.nodes) {
                Ok(result) => (result.etas, result.etds),
                Err(err) => {
                    tracing::warn!(
                        route_idx,
                        delivery_count = route.nodes.len(),
                        error = %err,
                        "timetable LP failed for route; keeping CP-derived times"
                    );
                    (schedule.etas, schedule.etds)
                }
            };

        plans.push(route.nodes.clone());
        etas.push(refined_etas);
        etds.push(refined_etds);
    }

    Ok(VrpSolution { plans, etas, etds })
}
