//! End-to-end planning scenarios, driven through [`PlanningService`].
//!
//! Exercises the concrete scenarios and boundary behaviours from the
//! testable-properties list: precedence under a shared no-courier plan,
//! one-delivery-per-courier assignment, pinned-drop-only deliveries,
//! co-location merge, and warm-start preservation.

mod fixtures;

use fixtures::mock_backend::GridBackend;

use godeliver_planner::config::PlannerConfig;
use godeliver_planner::model::{
    Courier, Delivery, DeliveryEvent, DeliveryEventType, Location, Mode, Plan, TimeBlock,
};
use godeliver_planner::service::PlanningService;

fn service() -> PlanningService {
    PlanningService::new(PlannerConfig::default(), Box::new(GridBackend))
}

fn delivery(id: &str, origin: Location, destination: Location, pickup: TimeBlock, drop: TimeBlock) -> Delivery {
    Delivery {
        id: id.to_string(),
        assigned_courier_id: None,
        origin: Some(origin),
        destination,
        pickup_time: Some(pickup),
        delivery_time: drop,
        size: None,
    }
}

fn courier(id: &str, location: Location, start_time: i64) -> Courier {
    Courier {
        id: id.to_string(),
        start_location: location,
        start_time,
        is_finishing: false,
        capacity: None,
        start_utilization: None,
    }
}

/// Scenario 1: two deliveries, no couriers, `min_plans=1` — one plan
/// carrying both, each with its pickup preceding its drop.
#[test]
fn two_deliveries_no_couriers_share_one_plan_with_precedence() {
    let l1 = Location::new(36.000, -115.000);
    let l2 = Location::new(36.010, -115.000);
    let l3 = Location::new(36.000, -115.020);
    let l4 = Location::new(36.010, -115.020);

    let a = delivery(
        "A",
        l1,
        l2,
        TimeBlock::new(32_400).with_to_time(33_300), // 09:00-09:15
        TimeBlock::new(34_200).with_to_time(36_000),  // 09:30-10:00
    );
    let b = delivery(
        "B",
        l3,
        l4,
        TimeBlock::new(33_600).with_to_time(34_800), // 09:20-09:40
        TimeBlock::new(36_600).with_to_time(38_400),  // 10:10-10:40
    );

    let plans = service().create_plans(&[a, b], &[], 1, None).expect("solver should find a plan");
    assert_eq!(plans.len(), 1);

    let plan = &plans[0];
    assert!(plan.delivery_order_ids.contains(&"A".to_string()));
    assert!(plan.delivery_order_ids.contains(&"B".to_string()));
    assert_precedence(plan, "A");
    assert_precedence(plan, "B");
}

/// Scenario 2: same inputs, but with one courier already parked at each
/// pickup location — each delivery should land on its own courier's plan.
#[test]
fn two_couriers_each_take_one_delivery() {
    let l1 = Location::new(36.000, -115.000);
    let l2 = Location::new(36.010, -115.000);
    let l3 = Location::new(36.000, -115.020);
    let l4 = Location::new(36.010, -115.020);

    let a = delivery(
        "A",
        l1,
        l2,
        TimeBlock::new(32_400).with_to_time(33_300),
        TimeBlock::new(34_200).with_to_time(36_000),
    );
    let b = delivery(
        "B",
        l3,
        l4,
        TimeBlock::new(33_600).with_to_time(34_800),
        TimeBlock::new(36_600).with_to_time(38_400),
    );

    let courier_a = courier("C1", l1, 32_100); // 08:55
    let courier_b = courier("C2", l3, 32_100);

    let plans = service()
        .create_plans(&[a, b], &[courier_a, courier_b], 2, None)
        .expect("solver should find a plan");
    assert_eq!(plans.len(), 2);

    for plan in &plans {
        assert_eq!(plan.delivery_order_ids.len(), 1, "each courier should carry exactly one delivery");
    }

    let carried: Vec<&String> = plans.iter().flat_map(|p| p.delivery_order_ids.iter()).collect();
    assert!(carried.contains(&&"A".to_string()));
    assert!(carried.contains(&&"B".to_string()));
}

/// Scenario 4: a delivery already picked up (`assigned_courier_id` set, no
/// `origin`) emits only a drop event, on that courier's plan.
#[test]
fn in_progress_delivery_emits_drop_only_on_its_courier() {
    let drop_location = Location::new(36.050, -115.050);
    let courier_location = Location::new(36.040, -115.040);

    let delivery = Delivery {
        id: "C-INFLIGHT".to_string(),
        assigned_courier_id: Some("C1".to_string()),
        origin: None,
        destination: drop_location,
        pickup_time: None,
        delivery_time: TimeBlock::new(40_000).with_to_time(42_000),
        size: None,
    };
    let courier = courier("C1", courier_location, 38_000);

    let plans = service()
        .create_plans(&[delivery], &[courier], 1, None)
        .expect("solver should find a plan");
    assert_eq!(plans.len(), 1);

    let plan = &plans[0];
    assert_eq!(plan.assigned_courier_id.as_deref(), Some("C1"));
    assert_eq!(plan.delivery_order_ids, vec!["C-INFLIGHT".to_string()]);
    assert!(
        plan.delivery_events.iter().all(|e| e.event_type != DeliveryEventType::Pickup),
        "an already-picked-up delivery must not emit a pickup event"
    );
    assert_eq!(plan.delivery_events.len(), 1);
    assert_eq!(plan.delivery_events[0].event_type, DeliveryEventType::Drop);
}

/// Scenario 5: two pickups within 25 m merge into a single pickup event.
#[test]
fn colocated_pickups_merge_into_one_event() {
    let pickup_a = Location::new(36.0, -115.0);
    let pickup_b = Location::new(36.00009, -115.0); // ~10m away
    let drop_a = Location::new(36.05, -115.05);
    let drop_b = Location::new(36.06, -115.06);

    let a = delivery(
        "A",
        pickup_a,
        drop_a,
        TimeBlock::new(10_000).with_to_time(20_000).anytime(),
        TimeBlock::new(30_000).with_to_time(90_000),
    );
    let b = delivery(
        "B",
        pickup_b,
        drop_b,
        TimeBlock::new(10_000).with_to_time(20_000).anytime(),
        TimeBlock::new(30_000).with_to_time(90_000),
    );

    let plans = service().create_plans(&[a, b], &[], 1, None).expect("solver should find a plan");
    assert_eq!(plans.len(), 1);

    let pickups: Vec<_> = plans[0]
        .delivery_events
        .iter()
        .filter(|e| e.event_type == DeliveryEventType::Pickup)
        .collect();
    assert_eq!(pickups.len(), 1, "colocated pickups should merge into a single event");
    assert_eq!(pickups[0].delivery_order_ids.len(), 2);
}

/// Scenario 6: warm-starting from a `previous_plans` set preserves that
/// courier's carried orders (barring an improving move away from them).
#[test]
fn warm_start_preserves_previous_courier_assignment() {
    let l1 = Location::new(36.0, -115.0);
    let l2 = Location::new(36.01, -115.0);
    let l3 = Location::new(36.0, -115.02);
    let l4 = Location::new(36.01, -115.02);

    let x = delivery(
        "X",
        l1,
        l2,
        TimeBlock::new(10_000).with_to_time(20_000).anytime(),
        TimeBlock::new(30_000).with_to_time(90_000),
    );
    let y = delivery(
        "Y",
        l3,
        l4,
        TimeBlock::new(10_000).with_to_time(20_000).anytime(),
        TimeBlock::new(30_000).with_to_time(90_000),
    );
    let courier = courier("C1", l1, 5_000);

    let event = |event_type, location, id: &str, time| DeliveryEvent {
        event_type,
        location,
        delivery_order_ids: vec![id.to_string()],
        event_time: TimeBlock::new(time),
        fixed_time: None,
    };
    let previous_plan = Plan {
        delivery_events: vec![
            event(DeliveryEventType::Pickup, l1, "X", 10_000),
            event(DeliveryEventType::Pickup, l3, "Y", 10_100),
            event(DeliveryEventType::Drop, l2, "X", 30_000),
            event(DeliveryEventType::Drop, l4, "Y", 30_100),
        ],
        delivery_order_ids: vec!["X".to_string(), "Y".to_string()],
        duration_s: 0,
        distance_m: 0,
        mode: Mode::Car,
        assigned_courier_id: Some("C1".to_string()),
        delivery_plan_id: Some("prev-1".to_string()),
    };

    let plans = service()
        .create_plans(&[x, y], &[courier], 1, Some(&[previous_plan]))
        .expect("solver should find a plan");
    assert_eq!(plans.len(), 1);
    assert!(plans[0].delivery_order_ids.contains(&"X".to_string()));
    assert!(plans[0].delivery_order_ids.contains(&"Y".to_string()));
}

/// Boundary: zero deliveries, zero couriers, `min_plans=0` → zero plans.
#[test]
fn empty_input_yields_no_plans() {
    let plans = service().create_plans(&[], &[], 0, None).expect("empty input should trivially succeed");
    assert!(plans.is_empty());
}

/// Boundary: a single delivery with no courier produces one plan with a
/// pickup and a drop event.
#[test]
fn single_delivery_no_courier_yields_one_plan_with_two_events() {
    let pickup = Location::new(36.0, -115.0);
    let drop = Location::new(36.02, -115.02);

    let a = delivery(
        "ONLY",
        pickup,
        drop,
        TimeBlock::new(1_000).with_to_time(5_000).anytime(),
        TimeBlock::new(10_000).with_to_time(50_000),
    );

    let plans = service().create_plans(&[a], &[], 1, None).expect("solver should find a plan");
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].delivery_events.len(), 2);
    assert_eq!(plans[0].delivery_events[0].event_type, DeliveryEventType::Pickup);
    assert_eq!(plans[0].delivery_events[1].event_type, DeliveryEventType::Drop);
}

fn assert_precedence(plan: &Plan, delivery_id: &str) {
    let pickup_idx = plan
        .delivery_events
        .iter()
        .position(|e| e.event_type == DeliveryEventType::Pickup && e.delivery_order_ids.contains(&delivery_id.to_string()));
    let drop_idx = plan
        .delivery_events
        .iter()
        .position(|e| e.event_type == DeliveryEventType::Drop && e.delivery_order_ids.contains(&delivery_id.to_string()));

    match (pickup_idx, drop_idx) {
        (Some(p), Some(d)) => assert!(p < d, "{delivery_id}: pickup must precede drop"),
        _ => panic!("{delivery_id}: expected both a pickup and a drop event"),
    }
}
