//! Projects raw domain input into an indexed node/matrix model
//! (`VrpInstance` + `VrpMapping`) that the route solver can search over.
//!
//! Node indexing convention (stable, contract with [`crate::assembler`]):
//! indices `0..num_plans` are vehicle start depots, `num_plans..2*num_plans`
//! are vehicle end depots, the rest are pickup nodes (one per delivery with
//! an `origin`) followed by drop nodes (one per delivery). Locations, pickup
//! nodes, drop nodes, and depots are all projected into this single integer
//! index space; the mapping tables in [`VrpMapping`] are the only "identity"
//! bridge back to the domain — node indices are opaque within the solver.

use std::collections::HashMap;

use crate::config::{PenaltyDirection, PenaltyNodeType, PlannerConfig};
use crate::error::PlannerError;
use crate::model::{Courier, Delivery, Location, Mode, Plan};
use crate::routing::RoutingBackend;

/// Sentinel cost for an arc that must never be taken.
pub const EDGE_FORBIDDEN: i64 = 1_000_000_000;

/// One time-window bound attached to a node. Several may stack on the same
/// node (the default tiered drop-lateness penalties are three parallel
/// soft-upper bounds on one node).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowBound {
    HardLower(i64),
    HardUpper(i64),
    SoftLower { bound: i64, weight: i64 },
    SoftUpper { bound: i64, weight: i64 },
}

/// The built VRP instance: integer node indices, augmented matrices,
/// time-window constraints, capacity demands, pickup/drop pairs, and
/// precomputed warm-start routes.
#[derive(Debug, Clone)]
pub struct VrpInstance {
    pub duration_matrix: Vec<Vec<i64>>,
    pub distance_matrix: Vec<Vec<i64>>,
    pub num_plans: usize,
    pub starts: Vec<usize>,
    pub ends: Vec<usize>,
    pub pickup_nodes: Vec<usize>,
    pub drop_nodes: Vec<usize>,
    /// `(pickup_node, drop_node)` pairs that must ride the same vehicle,
    /// pickup before drop.
    pub deliveries_not_started: Vec<(usize, usize)>,
    /// `(courier_idx, drop_node)` pairs pinning a drop to a specific
    /// vehicle (the pickup already happened).
    pub deliveries_in_progress: Vec<(usize, usize)>,
    /// Hard pinned start window per plan slot.
    pub start_time_windows: Vec<(i64, i64)>,
    pub time_windows_by_node: HashMap<usize, Vec<WindowBound>>,
    pub pickup_service_time: i64,
    pub drop_service_time: i64,
    pub courier_capacities: Option<Vec<i64>>,
    pub start_utilizations: Option<Vec<i64>>,
    pub node_demands: Option<Vec<i64>>,
    /// Warm-start routes as node-index lists, one per plan slot.
    pub previous_plans: Option<Vec<Vec<usize>>>,
    pub time_limit_s: i64,
}

impl VrpInstance {
    pub fn num_nodes(&self) -> usize {
        self.duration_matrix.len()
    }
}

/// Bi-directional dictionaries bridging node indices back to domain ids.
#[derive(Debug, Clone, Default)]
pub struct VrpMapping {
    /// plan index -> courier id, only populated for slots backed by a real
    /// courier (synthetic/unassigned slots have no entry).
    pub plan_courier: HashMap<usize, String>,
    pub delivery_pickup_node: HashMap<String, usize>,
    pub pickup_node_delivery: HashMap<usize, String>,
    pub delivery_drop_node: HashMap<String, usize>,
    pub drop_node_delivery: HashMap<usize, String>,
    /// Carried `delivery_plan_id` per plan slot, from `previous_plans`.
    pub delivery_plan_ids: Vec<Option<String>>,
    /// Real-node location lookup, so the assembler can compute co-location
    /// merges and fixed times without needing the original delivery list
    /// back in hand.
    pub node_location: HashMap<usize, Location>,
}

/// Output of the route solver: one node sequence per plan, with absolute
/// ETA/ETD per visited node.
#[derive(Debug, Clone)]
pub struct VrpSolution {
    pub plans: Vec<Vec<usize>>,
    pub etas: Vec<Vec<i64>>,
    pub etds: Vec<Vec<i64>>,
}

pub struct InstanceBuilder;

impl InstanceBuilder {
    /// Build `(VrpInstance, VrpMapping)` from raw domain input.
    ///
    /// `deliveries` and `couriers` are sorted by id internally to make node
    /// index assignment deterministic, matching §5's ordering requirement.
    pub fn build(
        deliveries: &[Delivery],
        couriers: &[Courier],
        min_plans_required: usize,
        previous_plans: Option<&[Plan]>,
        config: &PlannerConfig,
        backend: &dyn RoutingBackend,
        now: i64,
    ) -> Result<(VrpInstance, VrpMapping), PlannerError> {
        let span = tracing::info_span!(
            "instance_builder::build",
            deliveries = deliveries.len(),
            couriers = couriers.len(),
            min_plans_required
        );
        let _enter = span.enter();

        validate_deliveries(deliveries, couriers)?;

        let mut deliveries: Vec<&Delivery> = deliveries.iter().collect();
        deliveries.sort_by(|a, b| a.id.cmp(&b.id));
        let mut couriers: Vec<&Courier> = couriers.iter().collect();
        couriers.sort_by(|a, b| a.id.cmp(&b.id));

        let num_plans = couriers.len().max(min_plans_required);

        let pickups: Vec<&Delivery> = deliveries.iter().filter(|d| d.has_pickup()).copied().collect();
        let drops: Vec<&Delivery> = deliveries.clone();

        let pickup_locations: Vec<Location> = pickups.iter().map(|d| d.origin.unwrap()).collect();
        let drop_locations: Vec<Location> = drops.iter().map(|d| d.destination).collect();
        let courier_locations: Vec<Location> = couriers.iter().map(|c| c.start_location).collect();

        let mut query_locations = Vec::new();
        query_locations.extend(pickup_locations.iter().copied());
        query_locations.extend(drop_locations.iter().copied());
        query_locations.extend(courier_locations.iter().copied());
        if config.return_to_hub {
            if let Some(hub) = config.hub_location {
                query_locations.push(hub);
            }
        }

        let (raw_durations, raw_distances) = if query_locations.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            backend.duration_distance_matrix(&query_locations)?
        };

        let num_pickups = pickups.len();
        let num_drops = drops.len();
        let num_real_nodes = num_pickups + num_drops;
        let total_nodes = 2 * num_plans + num_real_nodes;

        // node index -> position in query_locations, for real nodes only.
        // pickups first, then drops.
        let real_node_query_idx = |real_idx: usize| real_idx;
        let hub_query_idx = if config.return_to_hub {
            Some(query_locations.len() - 1)
        } else {
            None
        };

        let mut duration_matrix = vec![vec![EDGE_FORBIDDEN; total_nodes]; total_nodes];
        let mut distance_matrix = vec![vec![0i64; total_nodes]; total_nodes];

        let starts: Vec<usize> = (0..num_plans).collect();
        let ends: Vec<usize> = (num_plans..2 * num_plans).collect();
        let pickup_nodes: Vec<usize> = (2 * num_plans..2 * num_plans + num_pickups).collect();
        let drop_nodes: Vec<usize> = (2 * num_plans + num_pickups..total_nodes).collect();

        // Real-node <-> real-node costs, copied straight from the queried
        // sub-block (pickups then drops, exactly the node order above).
        for (ri, &rn) in pickup_nodes.iter().chain(drop_nodes.iter()).enumerate() {
            for (rj, &cn) in pickup_nodes.iter().chain(drop_nodes.iter()).enumerate() {
                if ri == rj {
                    duration_matrix[rn][cn] = 0;
                    distance_matrix[rn][cn] = 0;
                    continue;
                }
                let qi = real_node_query_idx(ri);
                let qj = real_node_query_idx(rj);
                duration_matrix[rn][cn] = raw_durations[qi][qj];
                distance_matrix[rn][cn] = raw_distances[qi][qj];
            }
        }

        // Start depots -> real nodes.
        let courier_query_offset = num_pickups + num_drops;
        for (i, &start_node) in starts.iter().enumerate() {
            for (ri, &rn) in pickup_nodes.iter().chain(drop_nodes.iter()).enumerate() {
                let qi = real_node_query_idx(ri);
                if i < couriers.len() {
                    let courier_qi = courier_query_offset + i;
                    duration_matrix[start_node][rn] = raw_durations[courier_qi][qi];
                    distance_matrix[start_node][rn] = raw_distances[courier_qi][qi];
                } else {
                    duration_matrix[start_node][rn] = config.default_first_point_arrival_time;
                    distance_matrix[start_node][rn] = config.default_first_point_arrival_distance;
                }
            }
            // Arcs into any start depot are forbidden (already defaulted),
            // including from other start/end depots. Arc start->itself is 0.
            duration_matrix[start_node][start_node] = 0;
        }

        // Real nodes -> end depots.
        for &end_node in &ends {
            for (ri, &rn) in pickup_nodes.iter().chain(drop_nodes.iter()).enumerate() {
                if config.return_to_hub {
                    if let Some(hub_qi) = hub_query_idx {
                        let qi = real_node_query_idx(ri);
                        duration_matrix[rn][end_node] = raw_durations[qi][hub_qi];
                        distance_matrix[rn][end_node] = raw_distances[qi][hub_qi];
                        continue;
                    }
                }
                duration_matrix[rn][end_node] = 0;
                distance_matrix[rn][end_node] = 0;
            }
        }

        // Every arc into a start depot, and every arc out of an end depot,
        // stays EDGE_FORBIDDEN (the matrix was initialized to that).
        for &end_node in &ends {
            duration_matrix[end_node][end_node] = 0;
        }

        // Node mapping.
        let mut mapping = VrpMapping::default();
        for (i, delivery) in pickups.iter().enumerate() {
            let node = pickup_nodes[i];
            mapping.delivery_pickup_node.insert(delivery.id.clone(), node);
            mapping.pickup_node_delivery.insert(node, delivery.id.clone());
            mapping.node_location.insert(node, delivery.origin.unwrap());
        }
        for (i, delivery) in drops.iter().enumerate() {
            let node = drop_nodes[i];
            mapping.delivery_drop_node.insert(delivery.id.clone(), node);
            mapping.drop_node_delivery.insert(node, delivery.id.clone());
            mapping.node_location.insert(node, delivery.destination);
        }
        for (i, courier) in couriers.iter().enumerate() {
            mapping.plan_courier.insert(i, courier.id.clone());
        }
        mapping.delivery_plan_ids = vec![None; num_plans];

        // Time windows.
        let mut start_time_windows = Vec::with_capacity(num_plans);
        for i in 0..num_plans {
            let t = if i < couriers.len() { couriers[i].start_time } else { now };
            start_time_windows.push((t, t));
        }

        let mut time_windows_by_node: HashMap<usize, Vec<WindowBound>> = HashMap::new();
        for delivery in &drops {
            let drop_node = mapping.delivery_drop_node[&delivery.id];
            for spec in &config.penalties {
                if spec.node_type == PenaltyNodeType::Pickup {
                    if !delivery.has_pickup() {
                        continue;
                    }
                    let node = mapping.delivery_pickup_node[&delivery.id];
                    if let Some(bound) = window_bound(spec, delivery.pickup_time.unwrap(), config) {
                        time_windows_by_node.entry(node).or_default().push(bound);
                    }
                } else {
                    if let Some(bound) = window_bound(spec, delivery.delivery_time, config) {
                        time_windows_by_node.entry(drop_node).or_default().push(bound);
                    }
                }
            }
        }

        // Deliveries classification.
        let mut deliveries_not_started = Vec::new();
        let mut deliveries_in_progress = Vec::new();
        let courier_index: HashMap<&str, usize> =
            couriers.iter().enumerate().map(|(i, c)| (c.id.as_str(), i)).collect();

        for delivery in &drops {
            let drop_node = mapping.delivery_drop_node[&delivery.id];
            if let Some(courier_id) = &delivery.assigned_courier_id {
                let courier_idx = courier_index[courier_id.as_str()];
                deliveries_in_progress.push((courier_idx, drop_node));
            } else {
                let pickup_node = mapping.delivery_pickup_node[&delivery.id];
                deliveries_not_started.push((pickup_node, drop_node));
            }
        }

        // Warm-start routes.
        let previous_plans_nodes = if config.use_previous_solution {
            previous_plans.map(|plans| {
                build_warm_start(plans, couriers.as_slice(), &mapping, num_plans)
            })
        } else {
            None
        };

        // Capacities.
        let (courier_capacities, start_utilizations, node_demands) = if config.use_courier_capacity {
            let mut capacities = Vec::with_capacity(num_plans);
            let mut utilizations = Vec::with_capacity(num_plans);
            for i in 0..num_plans {
                if i < couriers.len() {
                    capacities.push(couriers[i].capacity.unwrap_or(config.default_courier_capacity));
                    utilizations.push(couriers[i].start_utilization.unwrap_or(0));
                } else {
                    capacities.push(config.default_courier_capacity);
                    utilizations.push(0);
                }
            }

            let mut demands = vec![0i64; total_nodes];
            for delivery in &pickups {
                let node = mapping.delivery_pickup_node[&delivery.id];
                demands[node] = delivery.size.unwrap_or(0);
            }
            for delivery in &drops {
                let node = mapping.delivery_drop_node[&delivery.id];
                demands[node] = -delivery.size.unwrap_or(0);
            }

            (Some(capacities), Some(utilizations), Some(demands))
        } else {
            (None, None, None)
        };

        let instance = VrpInstance {
            duration_matrix,
            distance_matrix,
            num_plans,
            starts,
            ends,
            pickup_nodes,
            drop_nodes,
            deliveries_not_started,
            deliveries_in_progress,
            start_time_windows,
            time_windows_by_node,
            pickup_service_time: config.pickup_waiting_time,
            drop_service_time: config.drop_waiting_time,
            courier_capacities,
            start_utilizations,
            node_demands,
            previous_plans: previous_plans_nodes,
            time_limit_s: config.time_limit_s,
        };

        tracing::debug!(
            num_plans = instance.num_plans,
            num_pickups,
            num_drops,
            "vrp instance built"
        );

        Ok((instance, mapping))
    }
}

fn window_bound(
    spec: &crate::config::PenaltySpec,
    time_block: crate::model::TimeBlock,
    config: &PlannerConfig,
) -> Option<WindowBound> {
    match spec.direction {
        PenaltyDirection::Earliness => {
            let lower = time_block.from_time - spec.offset;
            Some(if spec.is_hard {
                WindowBound::HardLower(lower)
            } else {
                WindowBound::SoftLower { bound: lower, weight: spec.weight }
            })
        }
        PenaltyDirection::Lateness => {
            if time_block.anytime {
                return None;
            }
            let upper = if time_block.asap {
                time_block.from_time + config.asap_tolerance(spec.node_type) + spec.offset
            } else if let Some(to_time) = time_block.to_time {
                to_time + spec.offset
            } else {
                time_block.from_time + spec.offset
            };
            Some(if spec.is_hard {
                WindowBound::HardUpper(upper)
            } else {
                WindowBound::SoftUpper { bound: upper, weight: spec.weight }
            })
        }
    }
}

fn build_warm_start(
    previous_plans: &[Plan],
    couriers: &[&Courier],
    mapping: &VrpMapping,
    num_plans: usize,
) -> Vec<Vec<usize>> {
    let mut by_courier: HashMap<&str, &Plan> = HashMap::new();
    let mut orphans: Vec<&Plan> = Vec::new();
    for plan in previous_plans {
        match &plan.assigned_courier_id {
            Some(courier_id) => {
                by_courier.insert(courier_id.as_str(), plan);
            }
            None => orphans.push(plan),
        }
    }
    orphans.sort_by_key(|p| std::cmp::Reverse(p.delivery_order_ids.len()));

    let mut routes = vec![Vec::new(); num_plans];
    let mut orphan_iter = orphans.into_iter();
    for (i, courier) in couriers.iter().enumerate() {
        let plan = by_courier.get(courier.id.as_str()).copied().or_else(|| orphan_iter.next());
        if let Some(plan) = plan {
            routes[i] = plan_to_nodes(plan, mapping);
        }
    }

    routes
}

fn plan_to_nodes(plan: &Plan, mapping: &VrpMapping) -> Vec<usize> {
    let mut nodes = Vec::new();
    for event in &plan.delivery_events {
        for id in &event.delivery_order_ids {
            let node = match event.event_type {
                crate::model::DeliveryEventType::Pickup => mapping.delivery_pickup_node.get(id),
                crate::model::DeliveryEventType::Drop => mapping.delivery_drop_node.get(id),
            };
            if let Some(&node) = node {
                nodes.push(node);
            }
        }
    }
    nodes
}

fn validate_deliveries(deliveries: &[Delivery], couriers: &[Courier]) -> Result<(), PlannerError> {
    let known_couriers: std::collections::HashSet<&str> =
        couriers.iter().map(|c| c.id.as_str()).collect();

    for delivery in deliveries {
        let has_origin = delivery.origin.is_some();
        let has_pickup_time = delivery.pickup_time.is_some();
        if has_origin != has_pickup_time {
            return Err(PlannerError::ValidationError(format!(
                "delivery {}: origin and pickup_time must be both present or both absent",
                delivery.id
            )));
        }
        if !has_origin && delivery.assigned_courier_id.is_none() {
            return Err(PlannerError::ValidationError(format!(
                "delivery {}: has no origin and no assigned_courier_id",
                delivery.id
            )));
        }
        if let Some(courier_id) = &delivery.assigned_courier_id {
            if !known_couriers.contains(courier_id.as_str()) {
                return Err(PlannerError::ValidationError(format!(
                    "delivery {}: assigned_courier_id {} does not match any known courier",
                    delivery.id, courier_id
                )));
            }
        }
    }

    Ok(())
}
