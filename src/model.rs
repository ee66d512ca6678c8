//! Domain value types: the courier-routing data model.
//!
//! Everything here is an immutable value type once constructed (§3 of the
//! planning spec this crate implements). Construction-time validation of
//! cross-field invariants lives in [`crate::instance`], not here, so that
//! these types stay plain data and `serde`-roundtrippable.

use serde::{Deserialize, Serialize};

/// A point on the map, decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to another location, in metres.
    pub fn distance_from(&self, other: &Location) -> f64 {
        crate::routing::haversine::haversine_metres(
            (self.lat, self.lon),
            (other.lat, other.lon),
        )
    }

    /// Whether two locations are close enough to be treated as "the same
    /// stop" for co-location merge purposes (25 m, per spec).
    pub fn is_colocated_with(&self, other: &Location) -> bool {
        self.distance_from(other) <= COLOCATION_RADIUS_M
    }
}

/// Co-location radius used by the assembler's consecutive-stop merge and
/// deferred-pickup sweep.
pub const COLOCATION_RADIUS_M: f64 = 25.0;

/// Transport mode carried on a [`Plan`]. Only `Car` participates in routing
/// cost computation; the rest are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Car,
    Bike,
    ElectricBike,
    Transit,
    Walk,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Car
    }
}

/// A time window, with the "soft end" computation rules from §3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub from_time: i64,
    pub to_time: Option<i64>,
    #[serde(default)]
    pub asap: bool,
    #[serde(default)]
    pub anytime: bool,
}

impl TimeBlock {
    pub fn new(from_time: i64) -> Self {
        Self {
            from_time,
            to_time: None,
            asap: false,
            anytime: false,
        }
    }

    pub fn with_to_time(mut self, to_time: i64) -> Self {
        self.to_time = Some(to_time);
        self
    }

    pub fn asap(mut self) -> Self {
        self.asap = true;
        self
    }

    pub fn anytime(mut self) -> Self {
        self.anytime = true;
        self
    }

    /// Effective end of the window: explicit `to_time` if present, else
    /// `from_time + 300` if `asap`, else end-of-day (next local midnight
    /// minus one hour, computed from `from_time`) if `anytime`, else
    /// `from_time` itself.
    ///
    /// Invariant: the result is always `>= from_time`.
    pub fn effective_to_time(&self) -> i64 {
        if let Some(to_time) = self.to_time {
            return to_time;
        }
        if self.asap {
            return self.from_time + 300;
        }
        if self.anytime {
            return next_midnight_minus_one_hour(self.from_time);
        }
        self.from_time
    }
}

/// Next local midnight (i.e. start of the next UTC day) minus one hour,
/// computed from a unix timestamp in seconds.
///
/// The reference planner computes this via `datetime.fromtimestamp`, which
/// is local-time-of-day sensitive; this crate works entirely in UTC seconds
/// and treats a "day" as a UTC day, which is the only timezone-independent
/// interpretation available without a configured local timezone.
fn next_midnight_minus_one_hour(from_time: i64) -> i64 {
    const SECONDS_PER_DAY: i64 = 86_400;
    let day_start = from_time.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY;
    day_start + SECONDS_PER_DAY - 3_600
}

/// A delivery order: a pickup (optional, when already completed) and a drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub assigned_courier_id: Option<String>,
    pub origin: Option<Location>,
    pub destination: Location,
    pub pickup_time: Option<TimeBlock>,
    pub delivery_time: TimeBlock,
    pub size: Option<i64>,
}

impl Delivery {
    /// Whether this delivery still has a pickup to perform (`origin` and
    /// `pickup_time` are both-or-neither per the model invariant; this
    /// crate checks `origin` as the canonical signal once validated).
    pub fn has_pickup(&self) -> bool {
        self.origin.is_some()
    }
}

/// A courier's current time/location and capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Courier {
    pub id: String,
    pub start_location: Location,
    pub start_time: i64,
    #[serde(default)]
    pub is_finishing: bool,
    pub capacity: Option<i64>,
    pub start_utilization: Option<i64>,
}

/// Kind of stop represented by a [`DeliveryEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryEventType {
    Pickup,
    Drop,
}

/// One stop in an assembled plan — possibly carrying several delivery ids
/// when co-location merge grouped several orders at the same location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    #[serde(rename = "type")]
    pub event_type: DeliveryEventType,
    pub location: Location,
    pub delivery_order_ids: Vec<String>,
    pub event_time: TimeBlock,
    pub fixed_time: Option<i64>,
}

/// A single vehicle's assembled route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub delivery_events: Vec<DeliveryEvent>,
    pub delivery_order_ids: Vec<String>,
    pub duration_s: i64,
    pub distance_m: i64,
    pub mode: Mode,
    pub assigned_courier_id: Option<String>,
    pub delivery_plan_id: Option<String>,
}
