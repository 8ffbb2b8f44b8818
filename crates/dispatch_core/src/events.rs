//! Simulator event stream: the tagged event vocabulary delivered each tick.
//!
//! Every tick the simulator emits an ordered list of events; each event is
//! delivered exactly once and routed to exactly one engine handler. The wire
//! encoding is a `type`-tagged JSON object.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{CarId, Floor, PassengerId};

/// Travel direction of a passenger or a moving car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Direction implied by an origin/destination pair, `None` when equal.
    pub fn between(origin: Floor, destination: Floor) -> Option<Direction> {
        match destination.cmp(&origin) {
            Ordering::Greater => Some(Direction::Up),
            Ordering::Less => Some(Direction::Down),
            Ordering::Equal => None,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// One simulator event. `elevator` / `passenger` / `floor` identify the
/// subject; events within a tick arrive in the simulator's emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulationEvent {
    PassengerCall {
        passenger: PassengerId,
        floor: Floor,
        direction: Direction,
    },
    ElevatorIdle {
        elevator: CarId,
    },
    ElevatorStopped {
        elevator: CarId,
        floor: Floor,
    },
    PassengerBoard {
        elevator: CarId,
        passenger: PassengerId,
    },
    PassengerAlight {
        elevator: CarId,
        passenger: PassengerId,
        floor: Floor,
    },
    ElevatorPassingFloor {
        elevator: CarId,
        floor: Floor,
        direction: Direction,
    },
    ElevatorApproaching {
        elevator: CarId,
        floor: Floor,
        direction: Direction,
    },
}
