//! Read-only simulator state: cars, floors, passengers, and run metrics.
//!
//! Fetched from the simulator after each step and consumed by the engine
//! without mutation. Physical elevator state (position, load, run status)
//! is owned by the simulator; the engine only plans against it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::Direction;
use crate::{CarId, Floor, PassengerId, Tick};

/// Physical run status of a car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Stopped,
    MovingUp,
    MovingDown,
}

impl RunStatus {
    pub fn is_stopped(self) -> bool {
        self == RunStatus::Stopped
    }
}

/// One elevator car as reported by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarState {
    pub id: CarId,
    pub current_floor: Floor,
    pub run_status: RunStatus,
    /// Passengers currently on board.
    #[serde(default)]
    pub passengers: Vec<PassengerId>,
    /// Destination floors of the passengers on board (one entry per passenger).
    #[serde(default)]
    pub passenger_destinations: Vec<Floor>,
    pub max_capacity: usize,
    /// Floors this car can stop at; empty means every floor is served.
    #[serde(default)]
    pub served_floors: Vec<Floor>,
    /// Floor the car is currently moving toward, if any.
    #[serde(default)]
    pub target_floor: Option<Floor>,
    /// Floor queued after the current target, if any.
    #[serde(default)]
    pub next_target_floor: Option<Floor>,
}

impl CarState {
    /// Whitelist check: a non-empty `served_floors` restricts where this car
    /// may stop for pickups.
    pub fn serves(&self, floor: Floor) -> bool {
        self.served_floors.is_empty() || self.served_floors.contains(&floor)
    }

    pub fn onboard(&self) -> usize {
        self.passengers.len()
    }
}

/// Waiting-passenger totals for one floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorState {
    pub floor: Floor,
    #[serde(default)]
    pub total_waiting: usize,
}

/// Lifecycle stage of a passenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerStatus {
    Waiting,
    InElevator,
    Completed,
    Cancelled,
}

impl PassengerStatus {
    /// True once the passenger no longer needs service.
    pub fn is_resolved(self) -> bool {
        matches!(self, PassengerStatus::Completed | PassengerStatus::Cancelled)
    }
}

/// One passenger as reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerState {
    pub id: PassengerId,
    pub origin: Floor,
    pub destination: Floor,
    pub arrive_tick: Tick,
    pub status: PassengerStatus,
}

impl PassengerState {
    /// Direction of travel, `None` for a degenerate same-floor request.
    pub fn travel_direction(&self) -> Option<Direction> {
        Direction::between(self.origin, self.destination)
    }
}

/// Aggregate run metrics maintained by the simulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsState {
    #[serde(default)]
    pub total_passengers: usize,
    #[serde(default)]
    pub completed_passengers: usize,
    #[serde(default)]
    pub average_wait_ticks: f64,
    #[serde(default)]
    pub average_system_ticks: f64,
    #[serde(default)]
    pub total_energy: f64,
}

/// Full simulator state snapshot for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub tick: Tick,
    /// Last tick of the current traffic round; 0 means no round is loaded.
    #[serde(default)]
    pub max_tick: Tick,
    pub elevators: Vec<CarState>,
    pub floors: Vec<FloorState>,
    #[serde(default)]
    pub passengers: BTreeMap<PassengerId, PassengerState>,
    #[serde(default)]
    pub metrics: MetricsState,
}

impl SimulationState {
    pub fn elevator(&self, id: CarId) -> Option<&CarState> {
        self.elevators.iter().find(|car| car.id == id)
    }

    pub fn passenger(&self, id: PassengerId) -> Option<&PassengerState> {
        self.passengers.get(&id)
    }

    /// Lowest and highest served floor, `None` for an empty building.
    pub fn floor_range(&self) -> Option<(Floor, Floor)> {
        let low = self.floors.iter().map(|f| f.floor).min()?;
        let high = self.floors.iter().map(|f| f.floor).max()?;
        Some((low, high))
    }
}
