//! Shared builders and an in-memory simulator for tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::api::{ApiError, SimulatorApi, StepResponse};
use crate::state::{
    CarState, FloorState, MetricsState, PassengerState, PassengerStatus, RunStatus,
    SimulationState,
};
use crate::{CarId, Floor, PassengerId, Tick};

/// A stopped, empty car with capacity 8 serving every floor.
pub fn car(id: CarId, floor: Floor) -> CarState {
    CarState {
        id,
        current_floor: floor,
        run_status: RunStatus::Stopped,
        passengers: Vec::new(),
        passenger_destinations: Vec::new(),
        max_capacity: 8,
        served_floors: Vec::new(),
        target_floor: None,
        next_target_floor: None,
    }
}

/// A waiting passenger.
pub fn passenger(
    id: PassengerId,
    origin: Floor,
    destination: Floor,
    arrive_tick: Tick,
) -> PassengerState {
    PassengerState {
        id,
        origin,
        destination,
        arrive_tick,
        status: PassengerStatus::Waiting,
    }
}

/// A building state with the given cars and floors `base..=top`.
pub fn building(cars: Vec<CarState>, base: Floor, top: Floor) -> SimulationState {
    SimulationState {
        tick: 0,
        max_tick: 1_000,
        elevators: cars,
        floors: (base..=top)
            .map(|floor| FloorState {
                floor,
                total_waiting: 0,
            })
            .collect(),
        passengers: BTreeMap::new(),
        metrics: MetricsState::default(),
    }
}

/// In-memory simulator: records every floor command and replays a scripted
/// sequence of step responses. Commands succeed unless listed in `reject`.
#[derive(Debug)]
pub struct FakeSimulator {
    pub state: SimulationState,
    pub script: VecDeque<StepResponse>,
    pub commands: Vec<(CarId, Floor, bool)>,
    pub reject: BTreeSet<(CarId, Floor)>,
    pub resets: usize,
    pub traffic_rounds: usize,
}

impl FakeSimulator {
    pub fn with_state(state: SimulationState) -> Self {
        Self {
            state,
            script: VecDeque::new(),
            commands: Vec::new(),
            reject: BTreeSet::new(),
            resets: 0,
            traffic_rounds: 0,
        }
    }

    /// Floors commanded for one car, in dispatch order.
    pub fn commands_for(&self, car: CarId) -> Vec<Floor> {
        self.commands
            .iter()
            .filter(|(id, _, _)| *id == car)
            .map(|(_, floor, _)| *floor)
            .collect()
    }
}

impl SimulatorApi for FakeSimulator {
    fn get_state(&mut self) -> Result<SimulationState, ApiError> {
        Ok(self.state.clone())
    }

    fn step(&mut self, ticks: u32) -> Result<StepResponse, ApiError> {
        self.state.tick += Tick::from(ticks);
        Ok(self.script.pop_front().unwrap_or(StepResponse {
            tick: self.state.tick,
            events: Vec::new(),
        }))
    }

    fn reset(&mut self) -> Result<(), ApiError> {
        self.resets += 1;
        self.state.tick = 0;
        Ok(())
    }

    fn next_traffic_round(&mut self, _full_reset: bool) -> Result<bool, ApiError> {
        self.traffic_rounds += 1;
        Ok(true)
    }

    fn mark_tick_processed(&mut self) -> Result<(), ApiError> {
        Ok(())
    }

    fn select_traffic(&mut self, _index: usize) -> Result<(), ApiError> {
        Ok(())
    }

    fn go_to_floor(&mut self, car: CarId, floor: Floor, immediate: bool) -> Result<bool, ApiError> {
        self.commands.push((car, floor, immediate));
        Ok(!self.reject.contains(&(car, floor)))
    }
}
