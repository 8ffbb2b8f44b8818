//! Feed a lobby call burst through the engine and print the planned trips.
//!
//! Run with: cargo run -p dispatch_core --example burst_plan

use std::collections::BTreeMap;

use dispatch_core::api::{ApiError, SimulatorApi, StepResponse};
use dispatch_core::config::EngineConfig;
use dispatch_core::engine::DispatchEngine;
use dispatch_core::events::{Direction, SimulationEvent};
use dispatch_core::state::{
    CarState, FloorState, MetricsState, PassengerState, PassengerStatus, RunStatus,
    SimulationState,
};
use dispatch_core::{CarId, Floor, PassengerId};

/// Accepts every command and prints it.
struct PrintingSimulator;

impl SimulatorApi for PrintingSimulator {
    fn get_state(&mut self) -> Result<SimulationState, ApiError> {
        Err(ApiError::Api("offline demo".into()))
    }
    fn step(&mut self, _ticks: u32) -> Result<StepResponse, ApiError> {
        Err(ApiError::Api("offline demo".into()))
    }
    fn reset(&mut self) -> Result<(), ApiError> {
        Ok(())
    }
    fn next_traffic_round(&mut self, _full_reset: bool) -> Result<bool, ApiError> {
        Ok(true)
    }
    fn mark_tick_processed(&mut self) -> Result<(), ApiError> {
        Ok(())
    }
    fn select_traffic(&mut self, _index: usize) -> Result<(), ApiError> {
        Ok(())
    }
    fn go_to_floor(&mut self, car: CarId, floor: Floor, immediate: bool) -> Result<bool, ApiError> {
        println!("  command: car {car} -> floor {floor} (immediate: {immediate})");
        Ok(true)
    }
}

fn main() {
    const FLOORS: Floor = 9;
    const CARS: CarId = 3;

    let mut passengers: BTreeMap<PassengerId, PassengerState> = BTreeMap::new();
    for id in 0..10u64 {
        passengers.insert(
            id,
            PassengerState {
                id,
                origin: 0,
                destination: 3 + (id as Floor) % 7,
                arrive_tick: 0,
                status: PassengerStatus::Waiting,
            },
        );
    }

    let state = SimulationState {
        tick: 0,
        max_tick: 1_000,
        elevators: (0..CARS)
            .map(|id| CarState {
                id,
                current_floor: 0,
                run_status: RunStatus::Stopped,
                passengers: Vec::new(),
                passenger_destinations: Vec::new(),
                max_capacity: 8,
                served_floors: Vec::new(),
                target_floor: None,
                next_target_floor: None,
            })
            .collect(),
        floors: (0..=FLOORS)
            .map(|floor| FloorState {
                floor,
                total_waiting: 0,
            })
            .collect(),
        passengers,
        metrics: MetricsState::default(),
    };

    let events: Vec<SimulationEvent> = state
        .passengers
        .keys()
        .map(|&passenger| SimulationEvent::PassengerCall {
            passenger,
            floor: 0,
            direction: Direction::Up,
        })
        .collect();

    let mut engine = DispatchEngine::new(EngineConfig::default());
    engine.initialize(&state);

    println!("--- Lobby burst: {} calls, {CARS} cars ---", events.len());
    let mut sim = PrintingSimulator;
    engine
        .process_tick(1, &events, &state, &mut sim)
        .expect("burst tick");

    println!("\nClassified mode: {:?}", engine.mode());
    for (car, trip) in engine.trips() {
        let zone = engine.zone(car).expect("zone");
        println!(
            "car {car}: zone [{}, {}], direction {:?}, stops {:?}, reserved {}",
            zone.low,
            zone.high,
            trip.direction(),
            trip.stops().collect::<Vec<_>>(),
            trip.total_reserved_boarding(),
        );
    }
    let unassigned = engine
        .registry()
        .iter()
        .filter(|request| request.assigned_car().is_none())
        .count();
    println!("unassigned calls waiting for a free car: {unassigned}");
}
