//! Simulator API seam: the synchronous surface the engine drives.
//!
//! Everything the engine needs from the simulator goes through
//! [`SimulatorApi`], so tests can substitute an in-memory implementation and
//! the HTTP client stays an implementation detail behind the `client`
//! feature.

use serde::Deserialize;
use thiserror::Error;

use crate::events::SimulationEvent;
use crate::state::SimulationState;
use crate::{CarId, Floor, Tick};

/// Errors surfaced by a simulator transport. The engine never retries
/// transport failures itself; they propagate to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure reaching the simulator.
    #[error("simulator transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The simulator answered, but the payload did not decode.
    #[error("malformed simulator response: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The simulator reported an application-level failure.
    #[error("simulator API error: {0}")]
    Api(String),
}

/// Events emitted by one `step` call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepResponse {
    pub tick: Tick,
    #[serde(default)]
    pub events: Vec<SimulationEvent>,
}

/// Synchronous request/response surface of the tick simulator.
///
/// `go_to_floor` returns `Ok(false)` when the simulator rejects the command
/// (car committed elsewhere, floor not served); the caller re-prepends the
/// target and retries on a later event.
pub trait SimulatorApi {
    fn get_state(&mut self) -> Result<SimulationState, ApiError>;
    fn step(&mut self, ticks: u32) -> Result<StepResponse, ApiError>;
    fn reset(&mut self) -> Result<(), ApiError>;
    /// Advance to the next traffic round; `false` when none is available.
    fn next_traffic_round(&mut self, full_reset: bool) -> Result<bool, ApiError>;
    fn mark_tick_processed(&mut self) -> Result<(), ApiError>;
    fn select_traffic(&mut self, index: usize) -> Result<(), ApiError>;
    /// Command a car to a floor. `immediate` requests replacement of the
    /// car's current target and is used only for inline insertion.
    fn go_to_floor(&mut self, car: CarId, floor: Floor, immediate: bool) -> Result<bool, ApiError>;
}
