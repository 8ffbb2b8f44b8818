//! Floor demand snapshot and traffic mode classification.
//!
//! The snapshot aggregates per-floor up/down demand from the registry; it is
//! rebuilt on every call, board, and alight event and never persisted across
//! refreshes. The classifier reduces the snapshot to one of three traffic
//! modes that drive zoning and trip direction.

use std::collections::BTreeMap;

use crate::events::Direction;
use crate::registry::RequestRegistry;
use crate::Floor;

/// Share of total demand that must point one way before a peak mode applies.
const PEAK_DEMAND_SHARE: f64 = 0.6;
/// Share of upward demand that must originate at the lobby for UP_PEAK.
const LOBBY_ORIGIN_SHARE: f64 = 0.5;
/// Share of downward demand one of the two top floors must carry for DOWN_PEAK.
const TOP_ORIGIN_SHARE: f64 = 0.4;

/// Building-wide traffic shape, selected on each snapshot refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficMode {
    UpPeak,
    DownPeak,
    Interfloor,
}

/// Aggregated demand at one floor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FloorDemand {
    pub up_count: usize,
    pub down_count: usize,
    /// Destination multiset for upward callers at this floor.
    pub up_destinations: BTreeMap<Floor, usize>,
    /// Destination multiset for downward callers at this floor.
    pub down_destinations: BTreeMap<Floor, usize>,
}

/// Per-floor demand over the whole floor range. Floors without requests are
/// represented with zero demand.
#[derive(Debug, Clone, Default)]
pub struct FloorSnapshot {
    demand: BTreeMap<Floor, FloorDemand>,
    base_floor: Floor,
    top_floor: Floor,
    up_total: usize,
    down_total: usize,
}

impl FloorSnapshot {
    pub fn rebuild(registry: &RequestRegistry, base_floor: Floor, top_floor: Floor) -> Self {
        let mut demand: BTreeMap<Floor, FloorDemand> = (base_floor..=top_floor)
            .map(|floor| (floor, FloorDemand::default()))
            .collect();
        let mut up_total = 0;
        let mut down_total = 0;
        for request in registry.iter() {
            let slot = demand.entry(request.origin).or_default();
            match request.direction {
                Direction::Up => {
                    slot.up_count += 1;
                    *slot.up_destinations.entry(request.destination).or_insert(0) += 1;
                    up_total += 1;
                }
                Direction::Down => {
                    slot.down_count += 1;
                    *slot
                        .down_destinations
                        .entry(request.destination)
                        .or_insert(0) += 1;
                    down_total += 1;
                }
            }
        }
        Self {
            demand,
            base_floor,
            top_floor,
            up_total,
            down_total,
        }
    }

    pub fn demand_at(&self, floor: Floor) -> Option<&FloorDemand> {
        self.demand.get(&floor)
    }

    pub fn up_total(&self) -> usize {
        self.up_total
    }

    pub fn down_total(&self) -> usize {
        self.down_total
    }

    pub fn total(&self) -> usize {
        self.up_total + self.down_total
    }

    /// Classify the current demand shape.
    ///
    /// UP_PEAK: upward demand dominates and at least half of it starts at the
    /// lobby. DOWN_PEAK: downward demand dominates and one of the two top
    /// floors carries a large share of it. Anything else is INTERFLOOR.
    pub fn classify(&self) -> TrafficMode {
        let total = self.total();
        if total == 0 {
            return TrafficMode::Interfloor;
        }
        let up = self.up_total as f64;
        let down = self.down_total as f64;
        let whole = total as f64;

        if up / whole >= PEAK_DEMAND_SHARE && self.up_total > 0 {
            let lobby_up = self
                .demand
                .get(&self.base_floor)
                .map(|d| d.up_count)
                .unwrap_or(0) as f64;
            if lobby_up / up >= LOBBY_ORIGIN_SHARE {
                return TrafficMode::UpPeak;
            }
        }

        if down / whole >= PEAK_DEMAND_SHARE && self.down_total > 0 {
            let top_down = self
                .demand
                .range(self.top_floor - 1..=self.top_floor)
                .map(|(_, d)| d.down_count)
                .max()
                .unwrap_or(0) as f64;
            if top_down / down >= TOP_ORIGIN_SHARE {
                return TrafficMode::DownPeak;
            }
        }

        TrafficMode::Interfloor
    }
}
