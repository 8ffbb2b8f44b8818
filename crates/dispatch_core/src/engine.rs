//! Dispatch engine: event routing, trip execution, and inline insertion.
//!
//! The engine is single-threaded cooperative: one owned state struct consumes
//! events one at a time in tick-delivery order, and every handler runs to
//! completion before the next event begins. Commands reach the simulator only
//! through the [`SimulatorApi`] passed into [`DispatchEngine::process_tick`].
//!
//! Per event the engine:
//!
//! - ingests new calls and removes boarded passengers from the registry,
//! - refreshes the floor snapshot and traffic mode (a mode change atomically
//!   releases unboarded reservations and discards every trip),
//! - plans trips for idle or stopped cars and issues the next floor command,
//! - opportunistically inserts an extra stop when a car passes or approaches
//!   a floor with matching same-direction demand.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::api::{ApiError, SimulatorApi};
use crate::config::EngineConfig;
use crate::events::{Direction, SimulationEvent};
use crate::planner::{plan_trip, ActivationPolicy, HeavyCarPolicy};
use crate::registry::RequestRegistry;
use crate::snapshot::{FloorSnapshot, TrafficMode};
use crate::state::{CarState, SimulationState};
use crate::trip::Trip;
use crate::zones::{compute_zones, idle_stations, Zone};
use crate::{CarId, Floor, PassengerId, Tick};

pub struct DispatchEngine {
    config: EngineConfig,
    activation: Box<dyn ActivationPolicy>,
    registry: RequestRegistry,
    snapshot: FloorSnapshot,
    mode: TrafficMode,
    trips: BTreeMap<CarId, Trip>,
    pending_targets: BTreeMap<CarId, Option<Floor>>,
    dispatch_history: BTreeMap<CarId, Vec<Floor>>,
    zones: BTreeMap<CarId, Zone>,
    idle_stations: BTreeMap<CarId, Floor>,
    car_ids: Vec<CarId>,
    base_floor: Floor,
    top_floor: Floor,
    last_tick: Tick,
}

impl DispatchEngine {
    pub fn new(config: EngineConfig) -> Self {
        let activation = Box::new(HeavyCarPolicy::from_config(&config));
        Self {
            config,
            activation,
            registry: RequestRegistry::new(),
            snapshot: FloorSnapshot::default(),
            mode: TrafficMode::Interfloor,
            trips: BTreeMap::new(),
            pending_targets: BTreeMap::new(),
            dispatch_history: BTreeMap::new(),
            zones: BTreeMap::new(),
            idle_stations: BTreeMap::new(),
            car_ids: Vec::new(),
            base_floor: 0,
            top_floor: 0,
            last_tick: 0,
        }
    }

    /// Swap in a different activation policy (test injection).
    pub fn with_activation_policy(mut self, policy: Box<dyn ActivationPolicy>) -> Self {
        self.activation = policy;
        self
    }

    /// Reset all engine state for a (possibly new) building topology.
    pub fn initialize(&mut self, state: &SimulationState) {
        let (base, top) = state.floor_range().unwrap_or((0, 0));
        self.base_floor = base;
        self.top_floor = top;
        self.car_ids = state.elevators.iter().map(|car| car.id).collect();
        self.car_ids.sort_unstable();

        self.registry = RequestRegistry::new();
        self.trips.clear();
        self.pending_targets = self.car_ids.iter().map(|&id| (id, None)).collect();
        self.dispatch_history = self.car_ids.iter().map(|&id| (id, Vec::new())).collect();
        self.mode = TrafficMode::Interfloor;
        self.snapshot = FloorSnapshot::rebuild(&self.registry, base, top);
        self.zones = compute_zones(&self.car_ids, base, top, self.mode);
        self.idle_stations = idle_stations(&self.car_ids, base, top);
        self.last_tick = state.tick;
        info!(
            cars = self.car_ids.len(),
            base_floor = base,
            top_floor = top,
            "engine initialized"
        );
    }

    /// True when the fleet or floor range differs from the initialized view.
    pub fn topology_changed(&self, state: &SimulationState) -> bool {
        let mut ids: Vec<CarId> = state.elevators.iter().map(|car| car.id).collect();
        ids.sort_unstable();
        ids != self.car_ids
            || state.floor_range().unwrap_or((0, 0)) != (self.base_floor, self.top_floor)
    }

    /// Route one tick's events through the engine in delivery order.
    pub fn process_tick<A: SimulatorApi>(
        &mut self,
        tick: Tick,
        events: &[SimulationEvent],
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        self.last_tick = tick;
        for &event in events {
            self.handle_event(event, state, api)?;
        }
        Ok(())
    }

    fn handle_event<A: SimulatorApi>(
        &mut self,
        event: SimulationEvent,
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        match event {
            SimulationEvent::PassengerCall {
                passenger, floor, ..
            } => self.on_passenger_call(passenger, floor, state, api),
            SimulationEvent::ElevatorIdle { elevator } => {
                self.on_elevator_idle(elevator, state, api)
            }
            SimulationEvent::ElevatorStopped { elevator, floor } => {
                self.on_elevator_stopped(elevator, floor, state, api)
            }
            SimulationEvent::PassengerBoard {
                elevator,
                passenger,
            } => self.on_passenger_board(elevator, passenger, state, api),
            SimulationEvent::PassengerAlight { .. } => self.on_passenger_alight(state, api),
            SimulationEvent::ElevatorPassingFloor {
                elevator,
                floor,
                direction,
            }
            | SimulationEvent::ElevatorApproaching {
                elevator,
                floor,
                direction,
            } => self.on_floor_reachable(elevator, floor, direction, state, api),
        }
    }

    fn on_passenger_call<A: SimulatorApi>(
        &mut self,
        passenger: PassengerId,
        floor: Floor,
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        let Some(info) = state.passenger(passenger) else {
            debug!(passenger, "call for passenger missing from state");
            return Ok(());
        };
        let Some(direction) = Direction::between(floor, info.destination) else {
            debug!(passenger, floor, "ignoring same-floor call");
            return Ok(());
        };
        if self
            .registry
            .record_call(passenger, floor, info.destination, direction, info.arrive_tick)
        {
            debug!(
                passenger,
                origin = floor,
                destination = info.destination,
                "recorded call"
            );
        }
        self.refresh_traffic();
        self.wake_idle_cars(state, api)
    }

    fn on_elevator_idle<A: SimulatorApi>(
        &mut self,
        car_id: CarId,
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        self.pending_targets.insert(car_id, None);
        let Some(car) = state.elevator(car_id) else {
            self.forget_missing_car(car_id);
            return Ok(());
        };
        self.try_dispatch(car, state, api)
    }

    fn on_elevator_stopped<A: SimulatorApi>(
        &mut self,
        car_id: CarId,
        floor: Floor,
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        self.pending_targets.insert(car_id, None);
        if let Some(trip) = self.trips.get_mut(&car_id) {
            trip.mark_stop_completed(floor);
        }
        let Some(car) = state.elevator(car_id) else {
            self.forget_missing_car(car_id);
            return Ok(());
        };
        self.try_dispatch(car, state, api)
    }

    fn on_passenger_board<A: SimulatorApi>(
        &mut self,
        car_id: CarId,
        passenger: PassengerId,
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        let removed = self.registry.remove_on_board(passenger);
        // At most one trip holds the reservation; release it wherever it is.
        // A foreign trip also loses the stops the reservation justified.
        for (&other_id, trip) in self.trips.iter_mut() {
            if trip.release_passenger(passenger) && other_id != car_id {
                if let Some(request) = &removed {
                    remove_unjustified_stops(
                        &self.registry,
                        state.elevator(other_id),
                        trip,
                        &[request.origin, request.destination],
                    );
                }
            }
        }
        if let Some(request) = &removed {
            // A boarded passenger's destination is always kept in the stops.
            if let Some(trip) = self.trips.get_mut(&car_id) {
                trip.insert_stop(request.destination);
            }
        }
        self.refresh_traffic();
        if let Some(car) = state.elevator(car_id) {
            self.try_dispatch(car, state, api)?;
        } else {
            self.forget_missing_car(car_id);
        }
        self.wake_idle_cars(state, api)
    }

    fn on_passenger_alight<A: SimulatorApi>(
        &mut self,
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        self.refresh_traffic();
        self.wake_idle_cars(state, api)
    }

    /// Inline insertion on `passing_floor` / `approaching`: the only path
    /// that may shorten a car's committed travel.
    fn on_floor_reachable<A: SimulatorApi>(
        &mut self,
        car_id: CarId,
        floor: Floor,
        direction: Direction,
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        let Some(car) = state.elevator(car_id) else {
            return Ok(());
        };
        let Some(zone) = self.zones.get(&car_id).copied() else {
            return Ok(());
        };
        if !zone.contains(floor) {
            return Ok(());
        }

        let picked: Vec<(PassengerId, Floor)> = {
            let Some(trip) = self.trips.get(&car_id) else {
                return Ok(());
            };
            if trip.direction() != direction || trip.contains_stop(floor) {
                return Ok(());
            }
            let capacity = car
                .max_capacity
                .saturating_sub(car.onboard())
                .saturating_sub(trip.total_reserved_boarding());
            if capacity == 0 {
                return Ok(());
            }

            let candidate_ids: Vec<PassengerId> = self
                .registry
                .iter()
                .filter(|request| request.origin == floor && request.direction == direction)
                .map(|request| request.passenger_id)
                .collect();

            let mut picked = Vec::new();
            for passenger_id in candidate_ids {
                if picked.len() == capacity {
                    break;
                }
                if trip.is_reserved(passenger_id) {
                    continue;
                }
                if let Some(assignee) = self.registry.ensure_assignment_valid(
                    passenger_id,
                    &state.elevators,
                    self.last_tick,
                    self.config.reassign_after_ticks,
                ) {
                    if assignee != car_id {
                        continue;
                    }
                }
                let Some(request) = self.registry.get(passenger_id) else {
                    continue;
                };
                if !car.serves(request.origin) || !car.serves(request.destination) {
                    continue;
                }
                picked.push((passenger_id, request.destination));
            }
            picked
        };

        // Eligibility checks above may have reclaimed assignments held by
        // other cars; drop any reservation the reclaim orphaned.
        self.prune_stale_reservations(state);
        if picked.is_empty() {
            return Ok(());
        }

        if let Some(trip) = self.trips.get_mut(&car_id) {
            for &(passenger_id, destination) in &picked {
                self.registry.assign(passenger_id, car_id, self.last_tick);
                trip.reserve(passenger_id, floor);
                trip.insert_stop(destination);
            }
            trip.replace_current_stop(floor);
        }
        debug!(
            car = car_id,
            floor,
            boarding = picked.len(),
            "inline stop inserted"
        );
        self.dispatch_next(car, true, api)
    }

    /// Rebuild the snapshot and reclassify; a mode change resets all plans.
    fn refresh_traffic(&mut self) {
        self.snapshot = FloorSnapshot::rebuild(&self.registry, self.base_floor, self.top_floor);
        let mode = self.snapshot.classify();
        if mode != self.mode {
            self.transition_mode(mode);
        }
    }

    /// Atomic mode transition: release every unboarded reservation, discard
    /// all trips and pending targets, and re-zone for the new mode.
    fn transition_mode(&mut self, mode: TrafficMode) {
        info!(from = ?self.mode, to = ?mode, "traffic mode changed; resetting plans");
        self.mode = mode;
        self.registry.clear_all_assignments();
        self.trips.clear();
        for target in self.pending_targets.values_mut() {
            *target = None;
        }
        self.zones = compute_zones(&self.car_ids, self.base_floor, self.top_floor, self.mode);
    }

    /// Offer new work to every stopped, empty car.
    fn wake_idle_cars<A: SimulatorApi>(
        &mut self,
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        for car in &state.elevators {
            if car.run_status.is_stopped() && car.passengers.is_empty() {
                self.try_dispatch(car, state, api)?;
            }
        }
        Ok(())
    }

    fn try_dispatch<A: SimulatorApi>(
        &mut self,
        car: &CarState,
        state: &SimulationState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        self.ensure_trip(car, state);
        self.prune_stale_reservations(state);
        self.dispatch_next(car, false, api)
    }

    /// A reservation survives only while its request is assigned to the same
    /// car; reclaims and reassignments orphan the old trip's copy, along
    /// with any stop the reservation alone justified.
    fn prune_stale_reservations(&mut self, state: &SimulationState) {
        let registry = &self.registry;
        for (&car_id, trip) in self.trips.iter_mut() {
            let stale: Vec<PassengerId> = trip
                .reserved_passenger_ids()
                .filter(|&passenger| {
                    registry.get(passenger).and_then(|r| r.assigned_car()) != Some(car_id)
                })
                .collect();
            if stale.is_empty() {
                continue;
            }
            let mut released_floors = Vec::new();
            for passenger in stale {
                debug!(car = car_id, passenger, "dropping superseded reservation");
                if let Some(request) = registry.get(passenger) {
                    released_floors.push(request.origin);
                    released_floors.push(request.destination);
                }
                trip.release_passenger(passenger);
            }
            remove_unjustified_stops(registry, state.elevator(car_id), trip, &released_floors);
        }
    }

    /// Plan a fresh trip when the car has none (or its last one is spent).
    fn ensure_trip(&mut self, car: &CarState, state: &SimulationState) {
        self.drop_trip_if_exhausted(car.id);
        if self.trips.contains_key(&car.id) {
            return;
        }
        let zone = self
            .zones
            .get(&car.id)
            .copied()
            .unwrap_or(Zone::full(self.base_floor, self.top_floor));
        if let Some(trip) = plan_trip(
            car,
            &state.elevators,
            &mut self.registry,
            self.mode,
            zone,
            self.base_floor,
            self.activation.as_ref(),
            &self.config,
            self.last_tick,
        ) {
            debug!(car = car.id, direction = ?trip.direction(), "planned trip");
            self.trips.insert(car.id, trip);
        }
    }

    fn drop_trip_if_exhausted(&mut self, car_id: CarId) {
        let exhausted = self
            .trips
            .get(&car_id)
            .is_some_and(|trip| !trip.has_pending_stops());
        if !exhausted {
            return;
        }
        if let Some(mut trip) = self.trips.remove(&car_id) {
            for passenger in trip.release_reservations() {
                debug!(car = car_id, passenger, "releasing unserved reservation");
                self.registry.clear_assignment(passenger);
            }
        }
    }

    /// Issue the next floor command for the car's trip, or park when drained.
    fn dispatch_next<A: SimulatorApi>(
        &mut self,
        car: &CarState,
        immediate: bool,
        api: &mut A,
    ) -> Result<(), ApiError> {
        let target = match self.trips.get_mut(&car.id) {
            Some(trip) => trip.pop_next(),
            None => None,
        };
        let Some(target) = target else {
            return self.park_if_drained(car, api);
        };

        let pending = self.pending_targets.get(&car.id).copied().flatten();
        if pending == Some(target) {
            return Ok(());
        }
        // A car committed to a different floor is only redirected through
        // inline insertion; the new target is retried on a later event.
        if !immediate {
            if let Some(pending) = pending {
                if pending != car.current_floor && pending != target {
                    return Ok(());
                }
            }
        }

        if api.go_to_floor(car.id, target, immediate)? {
            self.dispatch_history.entry(car.id).or_default().push(target);
            self.pending_targets.insert(car.id, Some(target));
            debug!(car = car.id, target, immediate, "floor command dispatched");
        } else {
            // Rejected: the target stays committed on the trip for retry.
            debug!(car = car.id, target, "floor command rejected");
        }
        Ok(())
    }

    /// With no work left anywhere, send the car to its idle station.
    fn park_if_drained<A: SimulatorApi>(
        &mut self,
        car: &CarState,
        api: &mut A,
    ) -> Result<(), ApiError> {
        if !self.registry.is_empty() || !car.passengers.is_empty() {
            return Ok(());
        }
        let Some(&station) = self.idle_stations.get(&car.id) else {
            return Ok(());
        };
        if car.current_floor == station {
            return Ok(());
        }
        let pending = self.pending_targets.get(&car.id).copied().flatten();
        if let Some(pending) = pending {
            if pending != car.current_floor {
                return Ok(());
            }
        }
        if api.go_to_floor(car.id, station, false)? {
            self.dispatch_history.entry(car.id).or_default().push(station);
            self.pending_targets.insert(car.id, Some(station));
            debug!(car = car.id, station, "parking at idle station");
        }
        Ok(())
    }

    /// Stale simulator state: drop everything pinned to a car the state no
    /// longer reports; planning for it resumes if it reappears.
    fn forget_missing_car(&mut self, car_id: CarId) {
        debug!(car = car_id, "car missing from simulator state");
        if let Some(mut trip) = self.trips.remove(&car_id) {
            trip.release_reservations();
        }
        self.registry.clear_assignments_for_car(car_id);
        self.pending_targets.insert(car_id, None);
    }

    /// True when neither the engine nor the simulator has outstanding work.
    pub fn is_drained(&self, state: &SimulationState) -> bool {
        if !self.registry.is_empty() || self.registry.has_assignments() {
            return false;
        }
        if self
            .trips
            .values()
            .any(|trip| trip.total_reserved_boarding() > 0)
        {
            return false;
        }
        if state.elevators.iter().any(|car| !car.passengers.is_empty()) {
            return false;
        }
        if state.floors.iter().any(|floor| floor.total_waiting > 0) {
            return false;
        }
        if state.metrics.total_passengers == 0 {
            return false;
        }
        if state.metrics.completed_passengers < state.metrics.total_passengers {
            return false;
        }
        state
            .passengers
            .values()
            .all(|passenger| passenger.status.is_resolved())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> TrafficMode {
        self.mode
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> &FloorSnapshot {
        &self.snapshot
    }

    pub fn trip(&self, car: CarId) -> Option<&Trip> {
        self.trips.get(&car)
    }

    pub fn trips(&self) -> impl Iterator<Item = (CarId, &Trip)> + '_ {
        self.trips.iter().map(|(&id, trip)| (id, trip))
    }

    pub fn zone(&self, car: CarId) -> Option<Zone> {
        self.zones.get(&car).copied()
    }

    pub fn idle_station(&self, car: CarId) -> Option<Floor> {
        self.idle_stations.get(&car).copied()
    }

    pub fn pending_target(&self, car: CarId) -> Option<Floor> {
        self.pending_targets.get(&car).copied().flatten()
    }

    pub fn dispatch_history(&self, car: CarId) -> &[Floor] {
        self.dispatch_history
            .get(&car)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn car_ids(&self) -> &[CarId] {
        &self.car_ids
    }

    pub fn last_tick(&self) -> Tick {
        self.last_tick
    }
}

/// Drop floors from a trip's queued stops when no remaining reservation or
/// onboard drop-off justifies visiting them.
fn remove_unjustified_stops(
    registry: &RequestRegistry,
    car: Option<&CarState>,
    trip: &mut Trip,
    floors: &[Floor],
) {
    let mut justified: BTreeSet<Floor> = BTreeSet::new();
    for passenger in trip.reserved_passenger_ids() {
        if let Some(request) = registry.get(passenger) {
            justified.insert(request.origin);
            justified.insert(request.destination);
        }
    }
    if let Some(car) = car {
        justified.extend(car.passenger_destinations.iter().copied());
    }
    for &floor in floors {
        if !justified.contains(&floor) {
            trip.remove_queued_stop(floor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PassengerStatus, RunStatus};
    use crate::test_helpers::{building, car, passenger, FakeSimulator};

    /// Check the structural invariants that must hold after every handler.
    fn assert_invariants(engine: &DispatchEngine, state: &SimulationState) {
        let mut reserved_anywhere = std::collections::BTreeSet::new();
        for (car_id, trip) in engine.trips() {
            // Reservation views stay in lockstep.
            assert_eq!(trip.reserved_pickup_total(), trip.total_reserved_boarding());
            // Stop sequence is strictly monotonic, current stop included.
            let mut sequence: Vec<Floor> = trip.current_stop().into_iter().collect();
            sequence.extend(trip.stops());
            for pair in sequence.windows(2) {
                match trip.direction() {
                    Direction::Up => assert!(pair[0] < pair[1], "ascending stops: {sequence:?}"),
                    Direction::Down => assert!(pair[0] > pair[1], "descending stops: {sequence:?}"),
                }
            }
            let zone = engine.zone(car_id).expect("zone");
            // Drop-offs the trip still owes may lie beyond the zone.
            let mut owed_drops = std::collections::BTreeSet::new();
            for passenger_id in trip.reserved_passenger_ids() {
                // Each passenger is reserved by at most one car ...
                assert!(reserved_anywhere.insert(passenger_id));
                // ... and that car is the request's assignee.
                let request = engine.registry().get(passenger_id).expect("reserved request");
                assert_eq!(request.assigned_car(), Some(car_id));
                // Pickups never leave the car's zone.
                assert!(
                    zone.contains(request.origin),
                    "car {car_id} reserved a pickup at {} outside zone {zone:?}",
                    request.origin
                );
                owed_drops.insert(request.destination);
            }
            if let Some(car) = state.elevator(car_id) {
                owed_drops.extend(car.passenger_destinations.iter().copied());
            }
            // Every planned stop is in-zone or an owed drop-off.
            for floor in trip.current_stop().into_iter().chain(trip.stops()) {
                assert!(
                    zone.contains(floor) || owed_drops.contains(&floor),
                    "car {car_id} plans a stop at {floor} outside zone {zone:?}"
                );
            }
        }
        // Pending counters match the registry exactly.
        for &car_id in engine.car_ids() {
            let assigned = engine
                .registry()
                .iter()
                .filter(|r| r.assigned_car() == Some(car_id))
                .count();
            assert_eq!(engine.registry().pending_count(car_id), assigned);
        }
    }

    fn engine() -> DispatchEngine {
        DispatchEngine::new(EngineConfig::default().with_heavy_cars(Default::default()))
    }

    #[test]
    fn single_call_dispatches_pickup_then_drop() {
        let mut state = building(vec![car(0, 0)], 0, 9);
        state.passengers.insert(1, passenger(1, 2, 5, 0));
        let mut sim = FakeSimulator::with_state(state.clone());
        let mut engine = engine();
        engine.initialize(&state);

        engine
            .process_tick(
                0,
                &[SimulationEvent::PassengerCall {
                    passenger: 1,
                    floor: 2,
                    direction: Direction::Up,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 0");
        assert_eq!(sim.commands_for(0), vec![2]);
        assert_eq!(engine.pending_target(0), Some(2));
        assert_invariants(&engine, &state);

        // Car arrives at 2 and the passenger boards.
        state.elevators[0].current_floor = 2;
        engine
            .process_tick(
                3,
                &[SimulationEvent::ElevatorStopped {
                    elevator: 0,
                    floor: 2,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 3");
        assert_eq!(sim.commands_for(0), vec![2, 5]);

        state.elevators[0].passengers = vec![1];
        state.elevators[0].passenger_destinations = vec![5];
        let mut boarded = state.clone();
        boarded.passengers.get_mut(&1).expect("p1").status = PassengerStatus::InElevator;
        engine
            .process_tick(
                4,
                &[SimulationEvent::PassengerBoard {
                    elevator: 0,
                    passenger: 1,
                }],
                &boarded,
                &mut sim,
            )
            .expect("tick 4");
        // Already commanded to 5; boarding must not duplicate the command.
        assert_eq!(sim.commands_for(0), vec![2, 5]);
        assert!(engine.registry().is_empty());
        assert_eq!(engine.registry().pending_count(0), 0);
        assert_invariants(&engine, &boarded);
    }

    #[test]
    fn drained_system_parks_each_car_once() {
        let mut state = building(vec![car(0, 4), car(1, 4), car(2, 4)], 0, 9);
        state.metrics.total_passengers = 1;
        state.metrics.completed_passengers = 1;
        let mut sim = FakeSimulator::with_state(state.clone());
        let mut engine = engine();
        engine.initialize(&state);

        let idle_events: Vec<SimulationEvent> = (0..3)
            .map(|id| SimulationEvent::ElevatorIdle { elevator: id })
            .collect();
        engine
            .process_tick(10, &idle_events, &state, &mut sim)
            .expect("idle tick");

        assert_eq!(sim.commands_for(0), vec![0]);
        assert_eq!(sim.commands_for(1), vec![5]);
        assert_eq!(sim.commands_for(2), vec![9]);

        // Once a car reaches its station it receives no further commands.
        state.elevators[1].current_floor = 5;
        engine
            .process_tick(
                12,
                &[
                    SimulationEvent::ElevatorStopped {
                        elevator: 1,
                        floor: 5,
                    },
                    SimulationEvent::ElevatorIdle { elevator: 1 },
                ],
                &state,
                &mut sim,
            )
            .expect("arrival tick");
        assert_eq!(sim.commands_for(1), vec![5]);
    }

    #[test]
    fn inline_insertion_replaces_current_target() {
        let mut state = building(vec![car(0, 2)], 0, 9);
        state.passengers.insert(1, passenger(1, 2, 5, 0));
        let mut sim = FakeSimulator::with_state(state.clone());
        let mut engine = engine();
        engine.initialize(&state);

        engine
            .process_tick(
                0,
                &[SimulationEvent::PassengerCall {
                    passenger: 1,
                    floor: 2,
                    direction: Direction::Up,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 0");
        engine
            .process_tick(
                1,
                &[SimulationEvent::ElevatorStopped {
                    elevator: 0,
                    floor: 2,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 1");
        state.elevators[0].passengers = vec![1];
        state.elevators[0].passenger_destinations = vec![5];
        engine
            .process_tick(
                2,
                &[SimulationEvent::PassengerBoard {
                    elevator: 0,
                    passenger: 1,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 2");
        assert_eq!(engine.pending_target(0), Some(5));

        // A new call at floor 3 while the car climbs toward 5.
        state.elevators[0].run_status = RunStatus::MovingUp;
        state.elevators[0].current_floor = 3;
        state.passengers.insert(2, passenger(2, 3, 7, 3));
        engine
            .process_tick(
                3,
                &[
                    SimulationEvent::PassengerCall {
                        passenger: 2,
                        floor: 3,
                        direction: Direction::Up,
                    },
                    SimulationEvent::ElevatorPassingFloor {
                        elevator: 0,
                        floor: 3,
                        direction: Direction::Up,
                    },
                ],
                &state,
                &mut sim,
            )
            .expect("tick 3");

        let last = sim.commands.last().copied().expect("inline command");
        assert_eq!(last, (0, 3, true));
        let trip = engine.trip(0).expect("active trip");
        assert_eq!(trip.current_stop(), Some(3));
        // The displaced target and the new drop-off are both still planned.
        assert_eq!(trip.stops().collect::<Vec<_>>(), vec![5, 7]);
        assert!(trip.is_reserved(2));
        assert_invariants(&engine, &state);
    }

    #[test]
    fn inline_insertion_is_noop_at_current_stop() {
        let mut state = building(vec![car(0, 0)], 0, 9);
        state.passengers.insert(1, passenger(1, 2, 5, 0));
        let mut sim = FakeSimulator::with_state(state.clone());
        let mut engine = engine();
        engine.initialize(&state);
        engine
            .process_tick(
                0,
                &[SimulationEvent::PassengerCall {
                    passenger: 1,
                    floor: 2,
                    direction: Direction::Up,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 0");
        let issued = sim.commands.len();

        engine
            .process_tick(
                1,
                &[SimulationEvent::ElevatorApproaching {
                    elevator: 0,
                    floor: 2,
                    direction: Direction::Up,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 1");
        assert_eq!(sim.commands.len(), issued);
    }

    #[test]
    fn mode_flip_releases_unboarded_reservations() {
        let mut state = building(vec![car(0, 0)], 0, 9);
        for id in 0..5u64 {
            state
                .passengers
                .insert(id, passenger(id, 0, 3 + id as Floor, 0));
        }
        // The car is mid-run while the lobby calls arrive, so the registry
        // fills before any planning happens.
        state.elevators[0].run_status = RunStatus::MovingUp;
        let mut sim = FakeSimulator::with_state(state.clone());
        let mut engine = engine();
        engine.initialize(&state);

        let calls: Vec<SimulationEvent> = (0..5u64)
            .map(|id| SimulationEvent::PassengerCall {
                passenger: id,
                floor: 0,
                direction: Direction::Up,
            })
            .collect();
        engine.process_tick(0, &calls, &state, &mut sim).expect("up calls");
        assert_eq!(engine.mode(), TrafficMode::UpPeak);
        assert!(engine.trip(0).is_none());

        // The car comes free and reserves all five in one trip.
        state.elevators[0].run_status = RunStatus::Stopped;
        engine
            .process_tick(
                1,
                &[SimulationEvent::ElevatorIdle { elevator: 0 }],
                &state,
                &mut sim,
            )
            .expect("plan tick");
        let trip = engine.trip(0).expect("up-peak trip");
        assert_eq!(trip.total_reserved_boarding(), 5);
        assert_invariants(&engine, &state);

        // Eight top-floor exits swing the classifier to DOWN_PEAK.
        for id in 10..18u64 {
            state.passengers.insert(id, passenger(id, 9, 0, 2));
        }
        let down_calls: Vec<SimulationEvent> = (10..18u64)
            .map(|id| SimulationEvent::PassengerCall {
                passenger: id,
                floor: 9,
                direction: Direction::Down,
            })
            .collect();
        engine
            .process_tick(2, &down_calls, &state, &mut sim)
            .expect("down calls");

        assert_eq!(engine.mode(), TrafficMode::DownPeak);
        // Every up-peak reservation was released in the transition; the
        // replanned trip serves the downward demand instead.
        for id in 0..5u64 {
            assert_eq!(
                engine.registry().get(id).and_then(|r| r.assigned_car()),
                None,
                "passenger {id} still assigned after mode flip"
            );
            assert!(engine.trips().all(|(_, trip)| !trip.is_reserved(id)));
        }
        assert_invariants(&engine, &state);
    }

    #[test]
    fn stale_assignment_is_reclaimed_and_replanned() {
        let mut state = building(vec![car(0, 2), car(1, 6)], 0, 9);
        state.passengers.insert(1, passenger(1, 2, 5, 0));
        let mut sim = FakeSimulator::with_state(state.clone());
        let mut engine = engine();
        engine.initialize(&state);

        engine
            .process_tick(
                0,
                &[SimulationEvent::PassengerCall {
                    passenger: 1,
                    floor: 2,
                    direction: Direction::Up,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 0");
        assert_eq!(
            engine.registry().get(1).and_then(|r| r.assigned_car()),
            Some(0)
        );
        assert!(engine.trip(0).expect("trip").is_reserved(1));

        // Car 0 got swept into other work and never served the call.
        state.elevators[0].run_status = RunStatus::MovingUp;
        state.elevators[0].passengers = vec![7, 8, 9];
        state.elevators[0].passenger_destinations = vec![7, 8, 9];
        engine
            .process_tick(
                4,
                &[SimulationEvent::ElevatorIdle { elevator: 1 }],
                &state,
                &mut sim,
            )
            .expect("tick 4");

        // The assignment is reclaimed, so any car may now take the request.
        // Car 1's zone does not cover floor 2; the request waits unpinned
        // and the busy car's trip loses the orphaned reservation and stops.
        assert_eq!(engine.registry().get(1).and_then(|r| r.assigned_car()), None);
        assert!(engine.trip(1).is_none());
        assert!(!engine.trip(0).expect("trip").is_reserved(1));
        assert_invariants(&engine, &state);

        // The zone owner comes free again and re-takes the reclaimed call.
        state.elevators[0] = car(0, 2);
        engine
            .process_tick(
                5,
                &[SimulationEvent::ElevatorStopped {
                    elevator: 0,
                    floor: 2,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 5");
        assert_eq!(
            engine.registry().get(1).and_then(|r| r.assigned_car()),
            Some(0)
        );
        assert!(engine.trip(0).expect("trip").is_reserved(1));
        assert_invariants(&engine, &state);
    }

    #[test]
    fn rejected_command_is_retried_on_next_event() {
        let mut state = building(vec![car(0, 0)], 0, 9);
        state.passengers.insert(1, passenger(1, 2, 5, 0));
        let mut sim = FakeSimulator::with_state(state.clone());
        sim.reject.insert((0, 2));
        let mut engine = engine();
        engine.initialize(&state);

        engine
            .process_tick(
                0,
                &[SimulationEvent::PassengerCall {
                    passenger: 1,
                    floor: 2,
                    direction: Direction::Up,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 0");
        assert_eq!(engine.pending_target(0), None);
        assert_eq!(engine.trip(0).and_then(|t| t.current_stop()), Some(2));

        sim.reject.clear();
        engine
            .process_tick(
                1,
                &[SimulationEvent::ElevatorIdle { elevator: 0 }],
                &state,
                &mut sim,
            )
            .expect("tick 1");
        assert_eq!(sim.commands_for(0), vec![2, 2]);
        assert_eq!(engine.pending_target(0), Some(2));
    }

    #[test]
    fn missing_car_in_state_clears_its_assignments() {
        let mut state = building(vec![car(0, 0)], 0, 9);
        state.passengers.insert(1, passenger(1, 2, 5, 0));
        let mut sim = FakeSimulator::with_state(state.clone());
        let mut engine = engine();
        engine.initialize(&state);
        engine
            .process_tick(
                0,
                &[SimulationEvent::PassengerCall {
                    passenger: 1,
                    floor: 2,
                    direction: Direction::Up,
                }],
                &state,
                &mut sim,
            )
            .expect("tick 0");
        assert_eq!(engine.registry().pending_count(0), 1);

        // The simulator stops reporting car 0 entirely.
        let empty_fleet = building(Vec::new(), 0, 9);
        engine
            .process_tick(
                1,
                &[SimulationEvent::ElevatorIdle { elevator: 0 }],
                &empty_fleet,
                &mut sim,
            )
            .expect("tick 1");
        assert_eq!(engine.registry().pending_count(0), 0);
        assert!(engine.trip(0).is_none());
        assert_eq!(
            engine.registry().get(1).and_then(|r| r.assigned_car()),
            None
        );
    }

    #[test]
    fn up_peak_burst_keeps_pickups_in_zone() {
        let mut state = building(vec![car(0, 0), car(1, 4), car(2, 8)], 0, 9);
        for id in 0..10u64 {
            let destination = 3 + (id as Floor) % 7;
            state
                .passengers
                .insert(id, passenger(id, 0, destination, 0));
        }
        let mut sim = FakeSimulator::with_state(state.clone());
        let mut engine = engine();
        engine.initialize(&state);

        let calls: Vec<SimulationEvent> = (0..10u64)
            .map(|id| SimulationEvent::PassengerCall {
                passenger: id,
                floor: 0,
                direction: Direction::Up,
            })
            .collect();
        engine.process_tick(0, &calls, &state, &mut sim).expect("burst");

        assert_eq!(engine.mode(), TrafficMode::UpPeak);
        for (car_id, trip) in engine.trips() {
            let zone = engine.zone(car_id).expect("zone");
            assert_eq!(trip.direction(), Direction::Up);
            for passenger_id in trip.reserved_passenger_ids() {
                let request = engine.registry().get(passenger_id).expect("request");
                assert!(
                    zone.contains(request.origin),
                    "car {car_id} reserved a pickup outside its zone"
                );
                assert!(
                    zone.contains(request.destination),
                    "car {car_id} reserved a destination outside its zone"
                );
            }
            // With nobody on board yet, every planned stop lies in the zone.
            for floor in trip.current_stop().into_iter().chain(trip.stops()) {
                assert!(
                    zone.contains(floor),
                    "car {car_id} plans a stop at {floor} outside zone {zone:?}"
                );
            }
        }
        // Only the car whose zone covers the lobby may serve lobby pickups;
        // the rest of the burst waits unassigned for it to come back.
        assert!(engine.trip(0).expect("lobby-zone trip").is_reserved(0));
        assert!(engine.trip(1).is_none());
        assert!(engine.trip(2).is_none());
        assert_eq!(
            engine
                .registry()
                .iter()
                .filter(|r| r.assigned_car().is_none())
                .count(),
            9
        );
        assert_invariants(&engine, &state);
    }

    #[test]
    fn topology_change_is_detected() {
        let state = building(vec![car(0, 0)], 0, 9);
        let mut engine = engine();
        engine.initialize(&state);
        assert!(!engine.topology_changed(&state));

        let grown = building(vec![car(0, 0), car(1, 0)], 0, 9);
        assert!(engine.topology_changed(&grown));
        let shrunk = building(vec![car(0, 0)], 0, 5);
        assert!(engine.topology_changed(&shrunk));
    }

    #[test]
    fn drained_check_requires_completed_metrics() {
        let mut state = building(vec![car(0, 0)], 0, 9);
        let mut engine = engine();
        engine.initialize(&state);

        // No passengers at all: the round has not produced traffic yet.
        assert!(!engine.is_drained(&state));

        state.metrics.total_passengers = 2;
        state.metrics.completed_passengers = 1;
        assert!(!engine.is_drained(&state));

        state.metrics.completed_passengers = 2;
        assert!(engine.is_drained(&state));
    }
}
