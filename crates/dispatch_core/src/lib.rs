//! # Elevator Dispatch Core
//!
//! An event-driven controller for a tick-based elevator simulator.
//!
//! ## Overview
//!
//! This crate provides the dispatch engine, including:
//!
//! - **Request Registry**: Outstanding calls with staleness-triggered reclaim
//! - **Mode Classifier**: UP_PEAK / DOWN_PEAK / INTERFLOOR traffic detection
//! - **Zone Planner**: Per-car service zones and idle parking stations
//! - **Trip Planner**: Directional stop plans with per-passenger reservations
//! - **Dispatch Executor**: Event routing, floor commands, inline stop insertion
//!
//! ## Key Concepts
//!
//! - **Ticks**: All time is the simulator's discrete tick; there are no wall-clock timers
//! - **Single owned state**: The engine runs one thread of control and consumes events
//!   one at a time in delivery order
//! - **Seam traits**: The simulator is reached only through [`api::SimulatorApi`];
//!   heavy-car gating is a pluggable [`planner::ActivationPolicy`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use dispatch_core::config::EngineConfig;
//! use dispatch_core::engine::DispatchEngine;
//!
//! let config = EngineConfig::default().with_reassign_after_ticks(6);
//! let mut engine = DispatchEngine::new(config);
//! // engine.initialize(&state) with a fetched SimulationState, then feed it
//! // each tick's events through engine.process_tick(..).
//! let _ = &mut engine;
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod events;
pub mod planner;
pub mod registry;
pub mod runner;
pub mod snapshot;
pub mod state;
pub mod trip;
pub mod zones;

#[cfg(feature = "client")]
pub mod client;

#[cfg(test)]
pub mod test_helpers;

/// Floor number as reported by the simulator.
pub type Floor = i32;
/// Simulation tick.
pub type Tick = u64;
/// Elevator car identifier.
pub type CarId = u32;
/// Passenger identifier.
pub type PassengerId = u64;
