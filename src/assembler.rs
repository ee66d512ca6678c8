//! PlanAssembler: turns a solved [`VrpSolution`] into domain-facing [`Plan`]s.
//!
//! Three passes run in order over each route's raw node list (order matters,
//! §9 Design Notes): co-location merge (consecutive same-type stops within
//! 25 m collapse into one event), the deferred-pickup sweep (retroactively
//! folds a later-picked-up order into an earlier, nearby pickup event), then
//! fixed-time back-solve (latest safe departure per event).

use std::collections::HashMap;

use crate::config::PlannerConfig;
use crate::instance::{VrpInstance, VrpMapping, VrpSolution};
use crate::model::{DeliveryEvent, DeliveryEventType, Mode, Plan, TimeBlock};

pub struct PlanAssembler;

impl PlanAssembler {
    /// Assemble one [`Plan`] per route in `solution`, in route order.
    pub fn assemble(
        instance: &VrpInstance,
        mapping: &VrpMapping,
        solution: &VrpSolution,
        config: &PlannerConfig,
    ) -> Vec<Plan> {
        let span = tracing::info_span!(
            "plan_assembler::assemble",
            num_plans = solution.plans.len()
        );
        let _enter = span.enter();

        (0..solution.plans.len())
            .map(|route_idx| assemble_route(instance, mapping, solution, config, route_idx))
            .collect()
    }
}

fn node_event_type(instance: &VrpInstance, node: usize) -> DeliveryEventType {
    if instance.pickup_nodes.contains(&node) {
        DeliveryEventType::Pickup
    } else {
        DeliveryEventType::Drop
    }
}

fn assemble_route(
    instance: &VrpInstance,
    mapping: &VrpMapping,
    solution: &VrpSolution,
    config: &PlannerConfig,
    route_idx: usize,
) -> Plan {
    let nodes = &solution.plans[route_idx];
    let etas = &solution.etas[route_idx];
    let etds = &solution.etds[route_idx];

    let mut events: Vec<DeliveryEvent> = Vec::new();
    // Parallel to `events`: the raw node each event was created from, used
    // for fixed-time travel lookups after the sweep has rearranged ids.
    let mut event_nodes: Vec<usize> = Vec::new();

    for (i, &node) in nodes.iter().enumerate() {
        let event_type = node_event_type(instance, node);
        let delivery_id = match event_type {
            DeliveryEventType::Pickup => mapping.pickup_node_delivery.get(&node),
            DeliveryEventType::Drop => mapping.drop_node_delivery.get(&node),
        };
        let Some(delivery_id) = delivery_id else {
            continue;
        };
        let location = match mapping.node_location.get(&node) {
            Some(loc) => *loc,
            None => continue,
        };

        let eta = etas[i];
        let etd = etds[i];

        let merges_into_previous = event_type == DeliveryEventType::Pickup
            && events
                .last()
                .map(|prev| prev.event_type == event_type && prev.location.is_colocated_with(&location))
                .unwrap_or(false);

        if merges_into_previous {
            let prev = events.last_mut().unwrap();
            prev.delivery_order_ids.push(delivery_id.clone());
            prev.event_time.from_time = prev.event_time.from_time.min(eta);
            let prev_to = prev.event_time.to_time.unwrap_or(prev.event_time.from_time);
            prev.event_time.to_time = Some(prev_to.max(etd));
        } else {
            if i > 0 {
                if let Some(prev) = events.last_mut() {
                    let travel = instance.duration_matrix[nodes[i - 1]][node];
                    let candidate = eta - travel;
                    let prev_to = prev.event_time.to_time.unwrap_or(prev.event_time.from_time);
                    prev.event_time.to_time = Some(prev_to.max(candidate));
                }
            }

            events.push(DeliveryEvent {
                event_type,
                location,
                delivery_order_ids: vec![delivery_id.clone()],
                event_time: TimeBlock::new(eta).with_to_time(etd),
                fixed_time: None,
            });
            event_nodes.push(node);
        }
    }

    deferred_pickup_sweep(&mut events);
    prune_empty(&mut events, &mut event_nodes);
    compute_fixed_times(instance, config, route_idx, &mut events, &event_nodes);

    let assigned_courier_id = mapping.plan_courier.get(&route_idx).cloned();
    if assigned_courier_id.is_none() {
        for event in &mut events {
            event.fixed_time = None;
        }
    }

    let mut delivery_order_ids: Vec<String> = Vec::new();
    for event in &events {
        for id in &event.delivery_order_ids {
            if !delivery_order_ids.contains(id) {
                delivery_order_ids.push(id.clone());
            }
        }
    }

    let distance_m = route_distance(instance, route_idx, nodes);
    let duration_s = match (etas.last(), etds.first()) {
        (Some(last_eta), Some(first_etd)) => last_eta - first_etd,
        _ => 0,
    };

    Plan {
        delivery_events: events,
        delivery_order_ids,
        duration_s,
        distance_m,
        mode: Mode::Car,
        assigned_courier_id,
        delivery_plan_id: mapping.delivery_plan_ids.get(route_idx).cloned().flatten(),
    }
}

/// Retroactively fold an order picked up at a stop that is close to an
/// earlier pickup event into that earlier event. Drops never participate.
fn deferred_pickup_sweep(events: &mut [DeliveryEvent]) {
    // order id -> index of the event currently holding it.
    let mut trunk: HashMap<String, usize> = HashMap::new();

    for idx in 0..events.len() {
        let event_type = events[idx].event_type;
        let event_location = events[idx].location;

        if event_type == DeliveryEventType::Pickup {
            let candidates: Vec<String> = trunk
                .iter()
                .filter(|(_, &origin)| origin != idx)
                .filter(|(_, &origin)| events[origin].location.is_colocated_with(&event_location))
                .map(|(id, _)| id.clone())
                .collect();

            for id in candidates {
                let origin = trunk[&id];
                events[origin].delivery_order_ids.retain(|x| x != &id);
                if !events[idx].delivery_order_ids.contains(&id) {
                    events[idx].delivery_order_ids.push(id.clone());
                }
                trunk.insert(id, idx);
            }

            for id in events[idx].delivery_order_ids.clone() {
                trunk.entry(id).or_insert(idx);
            }
        } else {
            for id in &events[idx].delivery_order_ids {
                trunk.remove(id);
            }
        }
    }
}

fn prune_empty(events: &mut Vec<DeliveryEvent>, event_nodes: &mut Vec<usize>) {
    let mut idx = 0;
    while idx < events.len() {
        if events[idx].delivery_order_ids.is_empty() {
            events.remove(idx);
            event_nodes.remove(idx);
        } else {
            idx += 1;
        }
    }
}

fn compute_fixed_times(
    instance: &VrpInstance,
    config: &PlannerConfig,
    route_idx: usize,
    events: &mut [DeliveryEvent],
    event_nodes: &[usize],
) {
    let mut prev_node = instance.starts[route_idx];
    for (event, &node) in events.iter_mut().zip(event_nodes.iter()) {
        let anchor = match event.event_type {
            DeliveryEventType::Pickup => event.event_time.to_time.unwrap_or(event.event_time.from_time),
            DeliveryEventType::Drop => event.event_time.from_time,
        };
        let service = config.service_time(event.event_type);
        let travel = instance.duration_matrix[prev_node][node];
        event.fixed_time = Some(anchor - service - travel - config.fixed_time_buffer);
        prev_node = node;
    }
}

fn route_distance(instance: &VrpInstance, route_idx: usize, nodes: &[usize]) -> i64 {
    if nodes.is_empty() {
        return 0;
    }

    let mut total = instance.distance_matrix[instance.starts[route_idx]][nodes[0]];
    for window in nodes.windows(2) {
        total += instance.distance_matrix[window[0]][window[1]];
    }
    total += instance.distance_matrix[*nodes.last().unwrap()][instance.ends[route_idx]];
    total
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::instance::EDGE_FORBIDDEN;
    use crate::model::Location;

    fn instance_with_two_colocated_pickups() -> (VrpInstance, VrpMapping) {
        // start(0) -> pickup A(2) -> pickup B(3) -> drop A(4) -> drop B(5) -> end(1)
        let n = 6;
        let mut duration_matrix = vec![vec![EDGE_FORBIDDEN; n]; n];
        let mut distance_matrix = vec![vec![0i64; n]; n];
        for i in 0..n {
            duration_matrix[i][i] = 0;
        }
        duration_matrix[0][2] = 100;
        duration_matrix[2][3] = 10; // within 25m travel time, irrelevant to colocation itself
        duration_matrix[3][4] = 200;
        duration_matrix[4][5] = 50;
        duration_matrix[5][1] = 0;
        for row in distance_matrix.iter_mut() {
            for cell in row.iter_mut() {
                *cell = 0;
            }
        }

        let instance = VrpInstance {
            duration_matrix,
            distance_matrix,
            num_plans: 1,
            starts: vec![0],
            ends: vec![1],
            pickup_nodes: vec![2, 3],
            drop_nodes: vec![4, 5],
            deliveries_not_started: vec![(2, 4), (3, 5)],
            deliveries_in_progress: vec![],
            start_time_windows: vec![(1_000, 1_000)],
            time_windows_by_node: HashMap::new(),
            pickup_service_time: 0,
            drop_service_time: 0,
            courier_capacities: None,
            start_utilizations: None,
            node_demands: None,
            previous_plans: None,
            time_limit_s: 5,
        };

        let loc_a_pickup = Location::new(36.0, -115.0);
        // 10 metres away, well within the 25 m colocation radius.
        let loc_b_pickup = Location::new(36.00009, -115.0);
        let loc_a_drop = Location::new(36.1, -115.1);
        let loc_b_drop = Location::new(36.2, -115.2);

        let mut mapping = VrpMapping::default();
        mapping.plan_courier.insert(0, "c1".to_string());
        mapping.delivery_pickup_node.insert("A".to_string(), 2);
        mapping.pickup_node_delivery.insert(2, "A".to_string());
        mapping.delivery_pickup_node.insert("B".to_string(), 3);
        mapping.pickup_node_delivery.insert(3, "B".to_string());
        mapping.delivery_drop_node.insert("A".to_string(), 4);
        mapping.drop_node_delivery.insert(4, "A".to_string());
        mapping.delivery_drop_node.insert("B".to_string(), 5);
        mapping.drop_node_delivery.insert(5, "B".to_string());
        mapping.node_location.insert(2, loc_a_pickup);
        mapping.node_location.insert(3, loc_b_pickup);
        mapping.node_location.insert(4, loc_a_drop);
        mapping.node_location.insert(5, loc_b_drop);
        mapping.delivery_plan_ids = vec![None];

        (instance, mapping)
    }

    #[test]
    fn colocated_pickups_merge_into_one_event() {
        let (instance, mapping) = instance_with_two_colocated_pickups();
        let config = PlannerConfig::default();
        let solution = VrpSolution {
            plans: vec![vec![2, 3, 4, 5]],
            etas: vec![vec![1_100, 1_110, 1_310, 1_360]],
            etds: vec![vec![1_100, 1_110, 1_310, 1_360]],
        };

        let plans = PlanAssembler::assemble(&instance, &mapping, &solution, &config);
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];

        let pickup_events: Vec<&DeliveryEvent> = plan
            .delivery_events
            .iter()
            .filter(|e| e.event_type == DeliveryEventType::Pickup)
            .collect();
        assert_eq!(pickup_events.len(), 1, "colocated pickups should merge");
        assert_eq!(pickup_events[0].delivery_order_ids.len(), 2);

        let drop_events: Vec<&DeliveryEvent> = plan
            .delivery_events
            .iter()
            .filter(|e| e.event_type == DeliveryEventType::Drop)
            .collect();
        assert_eq!(drop_events.len(), 2, "drops never merge across distinct nodes");
    }

    #[test]
    fn unassigned_plan_has_null_fixed_times() {
        let (instance, mut mapping) = instance_with_two_colocated_pickups();
        mapping.plan_courier.clear();
        let config = PlannerConfig::default();
        let solution = VrpSolution {
            plans: vec![vec![2, 3, 4, 5]],
            etas: vec![vec![1_100, 1_110, 1_310, 1_360]],
            etds: vec![vec![1_100, 1_110, 1_310, 1_360]],
        };

        let plans = PlanAssembler::assemble(&instance, &mapping, &solution, &config);
        assert!(plans[0].delivery_events.iter().all(|e| e.fixed_time.is_none()));
    }

    #[test]
    fn fixed_time_matches_back_solve_formula() {
        let (instance, mapping) = instance_with_two_colocated_pickups();
        let config = PlannerConfig::default();
        let solution = VrpSolution {
            plans: vec![vec![2, 3, 4, 5]],
            etas: vec![vec![1_100, 1_110, 1_310, 1_360]],
            etds: vec![vec![1_100, 1_110, 1_310, 1_360]],
        };

        let plans = PlanAssembler::assemble(&instance, &mapping, &solution, &config);
        let plan = &plans[0];

        // Merged pickup event anchors on its to_time (1110), with travel 100
        // from the start depot to node 2, zero pickup service time.
        let pickup = plan
            .delivery_events
            .iter()
            .find(|e| e.event_type == DeliveryEventType::Pickup)
            .unwrap();
        let expected = 1_110 - 0 - 100 - config.fixed_time_buffer;
        assert_eq!(pickup.fixed_time, Some(expected));
    }
}
