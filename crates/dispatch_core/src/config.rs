//! Engine configuration: dispatch policy knobs with serde support.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{CarId, Tick};

/// Tunable dispatch policy. Defaults match the reference deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pause between processed ticks, in seconds. Gives an observer time to
    /// sample simulator state between commands; 0 disables the pause.
    pub tick_delay_seconds: f64,
    /// Ticks after which an unserved assignment may be reclaimed from a busy
    /// car and offered to another.
    pub reassign_after_ticks: Tick,
    /// Fraction of car capacity the planner aims to fill per trip.
    pub target_load_factor: f64,
    /// Cars with elevated energy cost, activated only under sufficient load.
    pub heavy_cars: BTreeSet<CarId>,
    /// Outstanding-demand threshold for heavy cars, as a fraction of the
    /// non-heavy fleet's combined capacity.
    pub heavy_activation_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_delay_seconds: 0.2,
            reassign_after_ticks: 4,
            target_load_factor: 0.8,
            heavy_cars: BTreeSet::from([3]),
            heavy_activation_ratio: 0.7,
        }
    }
}

impl EngineConfig {
    pub fn with_tick_delay(mut self, seconds: f64) -> Self {
        self.tick_delay_seconds = seconds.max(0.0);
        self
    }

    pub fn with_reassign_after_ticks(mut self, ticks: Tick) -> Self {
        self.reassign_after_ticks = ticks;
        self
    }

    pub fn with_target_load_factor(mut self, factor: f64) -> Self {
        self.target_load_factor = factor;
        self
    }

    pub fn with_heavy_cars(mut self, cars: BTreeSet<CarId>) -> Self {
        self.heavy_cars = cars;
        self
    }

    pub fn with_heavy_activation_ratio(mut self, ratio: f64) -> Self {
        self.heavy_activation_ratio = ratio;
        self
    }
}
