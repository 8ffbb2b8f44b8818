//! Run loop: drives the engine against one simulator traffic round.
//!
//! Each iteration steps the simulator by one tick, fetches the resulting
//! state, routes the tick's events through the engine, and acknowledges the
//! tick. The loop ends when the round's tick budget is exhausted, when every
//! passenger is served, or when the cooperative stop flag is raised (checked
//! at tick boundaries only; handlers always run to completion).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, SimulatorApi};
use crate::config::EngineConfig;
use crate::engine::DispatchEngine;
use crate::state::MetricsState;
use crate::Tick;

/// Traffic-round refresh attempts before a run is abandoned.
const MAX_TRAFFIC_REFRESH_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(
        "no usable traffic round: the simulator kept reporting max_tick = 0 \
         after {MAX_TRAFFIC_REFRESH_ATTEMPTS} refresh attempts"
    )]
    NoTraffic,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub final_tick: Tick,
    pub ticks_processed: u64,
    /// True when every passenger was served before the tick budget ran out.
    pub drained: bool,
    pub metrics: MetricsState,
}

/// Drives a [`DispatchEngine`] against a [`SimulatorApi`] tick by tick.
pub struct DispatchRunner<A: SimulatorApi> {
    api: A,
    engine: DispatchEngine,
    stop: Arc<AtomicBool>,
}

impl<A: SimulatorApi> DispatchRunner<A> {
    pub fn new(api: A, config: EngineConfig) -> Self {
        Self {
            api,
            engine: DispatchEngine::new(config),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that makes [`DispatchRunner::run`] exit at the next tick
    /// boundary after draining outstanding events.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    /// Run one traffic round to completion.
    pub fn run(&mut self) -> Result<RunSummary, RunError> {
        let mut state = self.api.get_state()?;
        if state.tick > 0 {
            // A mid-flight simulator is reset so the round starts clean.
            self.api.reset()?;
            state = self.api.get_state()?;
        }

        let mut attempts = 0;
        while state.max_tick == 0 {
            if attempts >= MAX_TRAFFIC_REFRESH_ATTEMPTS {
                return Err(RunError::NoTraffic);
            }
            warn!("traffic round reports max_tick = 0; requesting the next round");
            if !self.api.next_traffic_round(true)? {
                return Err(RunError::NoTraffic);
            }
            state = self.api.get_state()?;
            attempts += 1;
        }

        self.engine.initialize(&state);
        self.api.mark_tick_processed()?;

        let tick_delay = Duration::from_secs_f64(self.engine.config().tick_delay_seconds.max(0.0));
        let max_tick = state.max_tick;
        let mut current_tick = state.tick;
        let mut ticks_processed = 0u64;
        let mut drained = false;
        let mut metrics = state.metrics.clone();

        while !self.stop.load(Ordering::Relaxed) && current_tick < max_tick {
            let step = self.api.step(1)?;
            current_tick = step.tick;

            let state = self.api.get_state()?;
            // Round switches can change the building under us.
            if self.engine.topology_changed(&state) {
                info!("topology changed; reinitializing engine state");
                self.engine.initialize(&state);
            }
            self.engine
                .process_tick(current_tick, &step.events, &state, &mut self.api)?;

            let state = self.api.get_state()?;
            metrics = state.metrics.clone();
            drained = self.engine.is_drained(&state);

            if tick_delay > Duration::ZERO {
                thread::sleep(tick_delay);
            }
            self.api.mark_tick_processed()?;
            ticks_processed += 1;

            if drained {
                info!(tick = current_tick, "all passengers served; ending round");
                break;
            }
        }

        Ok(RunSummary {
            final_tick: current_tick,
            ticks_processed,
            drained,
            metrics,
        })
    }
}
