//! Zone partition and idle parking stations.
//!
//! Zones restrict where a car may pick up in the current traffic mode; idle
//! stations spread empty cars across the building so no region starts cold.

use std::collections::BTreeMap;

use crate::snapshot::TrafficMode;
use crate::{CarId, Floor};

/// Closed floor interval a car is restricted to for pickups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub low: Floor,
    pub high: Floor,
}

impl Zone {
    pub fn full(base: Floor, top: Floor) -> Self {
        Self {
            low: base,
            high: top,
        }
    }

    pub fn contains(&self, floor: Floor) -> bool {
        (self.low..=self.high).contains(&floor)
    }
}

/// Partition `[base, top]` into per-car service zones for the given mode.
///
/// Cars are ordered by id. UP_PEAK and INTERFLOOR zones ascend from the
/// base; DOWN_PEAK zones descend from the top so low-order cars cover the
/// exodus floors. When the range is shorter than the fleet, trailing zones
/// clamp to `[base, top]` and may overlap.
pub fn compute_zones(
    car_ids: &[CarId],
    base: Floor,
    top: Floor,
    mode: TrafficMode,
) -> BTreeMap<CarId, Zone> {
    let mut ordered: Vec<CarId> = car_ids.to_vec();
    ordered.sort_unstable();
    let count = ordered.len() as Floor;
    if count == 0 {
        return BTreeMap::new();
    }
    let span = top - base + 1;
    let chunk = ((span + count - 1) / count).max(1);

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, car)| {
            let index = index as Floor;
            let zone = match mode {
                TrafficMode::UpPeak | TrafficMode::Interfloor => {
                    let low = (base + index * chunk).min(top);
                    let high = (base + (index + 1) * chunk - 1).min(top);
                    Zone { low, high }
                }
                TrafficMode::DownPeak => {
                    let high = (top - index * chunk).max(base);
                    let low = (high - chunk + 1).max(base);
                    Zone { low, high }
                }
            };
            (car, zone)
        })
        .collect()
}

/// Idle parking stations spread evenly across the floor range by car order.
/// A single car parks at the base floor.
pub fn idle_stations(car_ids: &[CarId], base: Floor, top: Floor) -> BTreeMap<CarId, Floor> {
    let mut ordered: Vec<CarId> = car_ids.to_vec();
    ordered.sort_unstable();
    let count = ordered.len();

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, car)| {
            let station = if count <= 1 {
                base
            } else {
                let fraction = index as f64 / (count - 1) as f64;
                let raw = base as f64 + fraction * (top - base) as f64;
                (raw.round() as Floor).clamp(base, top)
            };
            (car, station)
        })
        .collect()
}
