//! Request registry: every outstanding call and its car assignment.
//!
//! The registry and the per-car pending counters are two linked structures.
//! All assignment mutations funnel through [`RequestRegistry::assign`] and
//! [`RequestRegistry::clear_assignment`], which move the counters in
//! lockstep with the request map; nothing else touches either side.
//! Iteration order is deterministic (keyed by passenger id) so planning
//! decisions are reproducible across runs.

use std::collections::BTreeMap;

use tracing::debug;

use crate::events::Direction;
use crate::state::CarState;
use crate::{CarId, Floor, PassengerId, Tick};

/// A waiting passenger's call, alive from `passenger_call` until boarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub passenger_id: PassengerId,
    pub origin: Floor,
    pub destination: Floor,
    pub direction: Direction,
    pub arrive_tick: Tick,
    assigned_car: Option<CarId>,
    assigned_tick: Option<Tick>,
}

impl PendingRequest {
    pub fn assigned_car(&self) -> Option<CarId> {
        self.assigned_car
    }

    pub fn assigned_tick(&self) -> Option<Tick> {
        self.assigned_tick
    }

    /// Selection key for nearest-origin ordering relative to a car position.
    pub fn priority_key(&self, reference_floor: Floor) -> (Floor, Floor) {
        ((self.origin - reference_floor).abs(), self.origin)
    }
}

#[derive(Debug, Default)]
pub struct RequestRegistry {
    requests: BTreeMap<PassengerId, PendingRequest>,
    pending_count: BTreeMap<CarId, usize>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call. Idempotent on `passenger_id`; the first call wins.
    /// Returns `true` when the request was newly recorded.
    pub fn record_call(
        &mut self,
        passenger_id: PassengerId,
        origin: Floor,
        destination: Floor,
        direction: Direction,
        arrive_tick: Tick,
    ) -> bool {
        if self.requests.contains_key(&passenger_id) {
            return false;
        }
        self.requests.insert(
            passenger_id,
            PendingRequest {
                passenger_id,
                origin,
                destination,
                direction,
                arrive_tick,
                assigned_car: None,
                assigned_tick: None,
            },
        );
        true
    }

    /// Remove a request on boarding. Clears the assignment bookkeeping and
    /// returns the removed request for the trip to reconcile.
    pub fn remove_on_board(&mut self, passenger_id: PassengerId) -> Option<PendingRequest> {
        let mut request = self.requests.remove(&passenger_id)?;
        if let Some(car) = request.assigned_car.take() {
            self.adjust_pending(car, -1);
        }
        request.assigned_tick = None;
        Some(request)
    }

    /// Assign a request to a car, mirroring the pending counters.
    pub fn assign(&mut self, passenger_id: PassengerId, car: CarId, now: Tick) {
        let Some(request) = self.requests.get_mut(&passenger_id) else {
            return;
        };
        let previous = request.assigned_car;
        request.assigned_car = Some(car);
        request.assigned_tick = Some(now);
        if previous != Some(car) {
            if let Some(previous) = previous {
                self.adjust_pending(previous, -1);
            }
            self.adjust_pending(car, 1);
        }
    }

    /// Clear a request's assignment, mirroring the pending counters.
    pub fn clear_assignment(&mut self, passenger_id: PassengerId) {
        let Some(request) = self.requests.get_mut(&passenger_id) else {
            return;
        };
        let previous = request.assigned_car.take();
        request.assigned_tick = None;
        if let Some(previous) = previous {
            self.adjust_pending(previous, -1);
        }
    }

    /// Clear every assignment held by one car (stale simulator state path).
    pub fn clear_assignments_for_car(&mut self, car: CarId) {
        let held: Vec<PassengerId> = self
            .requests
            .values()
            .filter(|request| request.assigned_car == Some(car))
            .map(|request| request.passenger_id)
            .collect();
        for passenger_id in held {
            self.clear_assignment(passenger_id);
        }
    }

    /// Clear every assignment (mode-transition reset path).
    pub fn clear_all_assignments(&mut self) {
        let assigned: Vec<PassengerId> = self
            .requests
            .values()
            .filter(|request| request.assigned_car.is_some())
            .map(|request| request.passenger_id)
            .collect();
        for passenger_id in assigned {
            self.clear_assignment(passenger_id);
        }
    }

    /// Return the currently valid assignee, or `None` after a stale reclaim.
    ///
    /// An assignment is reclaimed when it is at least `reassign_after` ticks
    /// old and the assignee is missing, carries more effective load than the
    /// one request, is not stopped, or already has passengers on board.
    pub fn ensure_assignment_valid(
        &mut self,
        passenger_id: PassengerId,
        cars: &[CarState],
        now: Tick,
        reassign_after: Tick,
    ) -> Option<CarId> {
        let (assigned, assigned_tick) = {
            let request = self.requests.get(&passenger_id)?;
            (request.assigned_car?, request.assigned_tick)
        };
        let waited = now.saturating_sub(assigned_tick.unwrap_or(now));
        let busy = match cars.iter().find(|car| car.id == assigned) {
            None => true,
            Some(car) => {
                let effective_load = self.pending_count(assigned) + car.onboard();
                effective_load > 1 || !car.run_status.is_stopped() || !car.passengers.is_empty()
            }
        };
        if busy && waited >= reassign_after {
            debug!(
                passenger = passenger_id,
                car = assigned,
                waited,
                "reclaiming stale assignment"
            );
            self.clear_assignment(passenger_id);
            None
        } else {
            Some(assigned)
        }
    }

    pub fn pending_count(&self, car: CarId) -> usize {
        self.pending_count.get(&car).copied().unwrap_or(0)
    }

    /// True when any car still holds a pending assignment.
    pub fn has_assignments(&self) -> bool {
        self.pending_count.values().any(|&count| count > 0)
    }

    pub fn get(&self, passenger_id: PassengerId) -> Option<&PendingRequest> {
        self.requests.get(&passenger_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest> {
        self.requests.values()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn adjust_pending(&mut self, car: CarId, delta: i64) {
        let entry = self.pending_count.entry(car).or_insert(0);
        let next = *entry as i64 + delta;
        debug_assert!(next >= 0, "pending count for car {car} diverged");
        *entry = next.max(0) as usize;
    }
}
