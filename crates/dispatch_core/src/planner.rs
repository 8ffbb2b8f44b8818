//! Trip planner: converts pending calls and in-car drop-offs into a
//! directional trip for one car.
//!
//! Planning is greedy within the trip abstraction:
//!
//! - Direction comes from in-car drop-offs first, the traffic mode second.
//! - Drop-offs are seeded as stops before any pickup is considered, so a
//!   boarded passenger's destination can never be planned away.
//! - Pickups are selected per mode (lobby-first in UP_PEAK, top-down in
//!   DOWN_PEAK, nearest-origin otherwise) and reserved atomically: a request
//!   is either fully reserved or left untouched.
//!
//! Heavy cars join the fleet only when outstanding demand crosses a share of
//! the non-heavy capacity; the gate is a pluggable [`ActivationPolicy`] so
//! tests can inject their own.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::EngineConfig;
use crate::events::Direction;
use crate::registry::RequestRegistry;
use crate::snapshot::TrafficMode;
use crate::state::CarState;
use crate::trip::Trip;
use crate::zones::Zone;
use crate::{CarId, Floor, PassengerId, Tick};

/// Policy deciding whether a car may take on new trips.
pub trait ActivationPolicy: Send + Sync {
    fn should_activate(&self, car: &CarState, total_waiting: usize, fleet: &[CarState]) -> bool;
}

/// Default policy: heavy cars stay parked until outstanding demand reaches a
/// fraction of the non-heavy fleet's combined capacity.
#[derive(Debug, Clone)]
pub struct HeavyCarPolicy {
    heavy_cars: BTreeSet<CarId>,
    activation_ratio: f64,
}

impl HeavyCarPolicy {
    pub fn new(heavy_cars: BTreeSet<CarId>, activation_ratio: f64) -> Self {
        Self {
            heavy_cars,
            activation_ratio,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.heavy_cars.clone(), config.heavy_activation_ratio)
    }
}

impl ActivationPolicy for HeavyCarPolicy {
    fn should_activate(&self, car: &CarState, total_waiting: usize, fleet: &[CarState]) -> bool {
        if !self.heavy_cars.contains(&car.id) {
            return true;
        }
        let light_capacity: usize = fleet
            .iter()
            .filter(|other| !self.heavy_cars.contains(&other.id))
            .map(|other| other.max_capacity)
            .sum();
        total_waiting as f64 >= self.activation_ratio * light_capacity as f64
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    passenger_id: PassengerId,
    origin: Floor,
    destination: Floor,
    arrive_tick: Tick,
}

/// Build a trip for `car`, or `None` when there is nothing for it to do.
///
/// Reserves every selected request in the registry (assignment + tick) and on
/// the returned trip (pickup count + passenger set + stops). The returned
/// trip always has at least one pending stop.
#[allow(clippy::too_many_arguments)]
pub fn plan_trip(
    car: &CarState,
    fleet: &[CarState],
    registry: &mut RequestRegistry,
    mode: TrafficMode,
    zone: Zone,
    base_floor: Floor,
    activation: &dyn ActivationPolicy,
    config: &EngineConfig,
    now: Tick,
) -> Option<Trip> {
    if !activation.should_activate(car, registry.len(), fleet) {
        return None;
    }

    let direction = infer_direction(car, registry, mode, zone);
    let mut trip = Trip::new(direction, zone);

    // Seed in-car destinations first; boarded passengers override the zone.
    let mut drops: Vec<Floor> = car.passenger_destinations.clone();
    drops.sort_unstable();
    drops.dedup();
    for drop in drops {
        trip.insert_stop(drop);
    }

    let reserved = reserve_requests_for_trip(
        car, fleet, registry, &mut trip, mode, zone, base_floor, config, now,
    );
    if reserved > 0 {
        debug!(
            car = car.id,
            reserved,
            ?direction,
            "reserved pickups for trip"
        );
    }

    trip.has_pending_stops().then_some(trip)
}

/// Direction for a fresh trip: drop-offs win, then the traffic mode, then a
/// balanced pick over in-zone demand (ties go UP; an empty zone sends the
/// car toward its far end).
fn infer_direction(
    car: &CarState,
    registry: &RequestRegistry,
    mode: TrafficMode,
    zone: Zone,
) -> Direction {
    if let Some(&highest_drop) = car.passenger_destinations.iter().max() {
        return if highest_drop > car.current_floor {
            Direction::Up
        } else {
            Direction::Down
        };
    }
    match mode {
        TrafficMode::UpPeak => Direction::Up,
        TrafficMode::DownPeak => Direction::Down,
        TrafficMode::Interfloor => {
            let mut up = 0usize;
            let mut down = 0usize;
            for request in registry.iter() {
                if zone.contains(request.origin) {
                    match request.direction {
                        Direction::Up => up += 1,
                        Direction::Down => down += 1,
                    }
                }
            }
            if up > 0 || down > 0 {
                if up >= down {
                    Direction::Up
                } else {
                    Direction::Down
                }
            } else if car.current_floor <= zone.low {
                Direction::Up
            } else {
                Direction::Down
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn reserve_requests_for_trip(
    car: &CarState,
    fleet: &[CarState],
    registry: &mut RequestRegistry,
    trip: &mut Trip,
    mode: TrafficMode,
    zone: Zone,
    base_floor: Floor,
    config: &EngineConfig,
    now: Tick,
) -> usize {
    let target_load = (car.max_capacity as f64 * config.target_load_factor).ceil() as i64
        - car.onboard() as i64;
    let physical = car.max_capacity as i64
        - car.onboard() as i64
        - trip.total_reserved_boarding() as i64;
    let mut capacity = physical.min(target_load);
    if capacity <= 0 {
        return 0;
    }

    let candidates = eligible_candidates(car, fleet, registry, trip.direction(), config, now);
    let ordered = order_candidates(candidates, mode, trip.direction(), zone, base_floor, car);

    let mut reserved = 0;
    for candidate in ordered {
        if capacity == 0 {
            break;
        }
        registry.assign(candidate.passenger_id, car.id, now);
        trip.reserve(candidate.passenger_id, candidate.origin);
        trip.insert_stop(candidate.origin);
        trip.insert_stop(candidate.destination);
        capacity -= 1;
        reserved += 1;
    }
    reserved
}

/// Requests this car may take: unassigned or already ours after stale
/// reclaim, direction-matched, and within the car's served floors.
fn eligible_candidates(
    car: &CarState,
    fleet: &[CarState],
    registry: &mut RequestRegistry,
    direction: Direction,
    config: &EngineConfig,
    now: Tick,
) -> Vec<Candidate> {
    let ids: Vec<PassengerId> = registry.iter().map(|request| request.passenger_id).collect();
    let mut candidates = Vec::new();
    for passenger_id in ids {
        if let Some(assignee) =
            registry.ensure_assignment_valid(passenger_id, fleet, now, config.reassign_after_ticks)
        {
            if assignee != car.id {
                continue;
            }
        }
        let Some(request) = registry.get(passenger_id) else {
            continue;
        };
        let (origin, destination, arrive_tick) =
            (request.origin, request.destination, request.arrive_tick);
        let request_direction = request.direction;
        let ours = request.assigned_car() == Some(car.id);

        if !car.serves(origin) || !car.serves(destination) {
            if ours {
                registry.clear_assignment(passenger_id);
            }
            continue;
        }
        if request_direction != direction {
            continue;
        }
        candidates.push(Candidate {
            passenger_id,
            origin,
            destination,
            arrive_tick,
        });
    }
    candidates
}

fn order_candidates(
    candidates: Vec<Candidate>,
    mode: TrafficMode,
    direction: Direction,
    zone: Zone,
    base_floor: Floor,
    car: &CarState,
) -> Vec<Candidate> {
    match (mode, direction) {
        (TrafficMode::UpPeak, Direction::Up) => {
            // First the lobby, then the rest of the zone. Lobby pickups
            // belong to the car whose zone covers the lobby floor.
            let (mut lobby, mut rest): (Vec<_>, Vec<_>) = candidates
                .into_iter()
                .filter(|c| zone.contains(c.destination))
                .partition(|c| c.origin == base_floor);
            lobby.retain(|c| zone.contains(c.origin));
            rest.retain(|c| zone.contains(c.origin));
            let by_arrival =
                |a: &Candidate, b: &Candidate| (a.arrive_tick, a.origin).cmp(&(b.arrive_tick, b.origin));
            lobby.sort_by(by_arrival);
            rest.sort_by(by_arrival);
            lobby.extend(rest);
            lobby
        }
        (TrafficMode::DownPeak, Direction::Down) => {
            let mut ordered: Vec<_> = candidates
                .into_iter()
                .filter(|c| zone.contains(c.origin))
                .collect();
            ordered.sort_by(|a, b| {
                b.origin
                    .cmp(&a.origin)
                    .then(a.arrive_tick.cmp(&b.arrive_tick))
            });
            ordered
        }
        // Balanced selection; also used when drop-offs force a trip against
        // the peak direction.
        _ => {
            let mut ordered: Vec<_> = candidates
                .into_iter()
                .filter(|c| zone.contains(c.origin))
                .collect();
            ordered.sort_by_key(|c| ((c.origin - car.current_floor).abs(), c.arrive_tick));
            ordered
        }
    }
}
