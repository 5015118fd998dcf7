// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Registry
//!
//! The tower's single shared table:
//!
//! - [`FleetRegistry`] - sector ownership, the `active` and `waiting` pools,
//!   per-drone records and pending reliefs.
//! - [`Registration`], [`Substitution`], [`Release`] - outcomes of the
//!   read-modify-write operations the tower performs on it.
//!
//! Every operation is synchronous and expects the caller to hold the one lock
//! guarding the registry, which makes each of them atomic with respect to the
//! tower's other duties. Time is passed in explicitly.
//!
//! # Invariants
//!
//! - A sector is owned by at most one drone and a drone owns at most one sector.
//! - `active` and `waiting` are disjoint; every drone in either has a record.
//! - Drone ids come from a monotonically increasing counter and are never reused.

use serde::Serialize;
use skywatch_core::domain::config::ReliefRetryPolicy;
use skywatch_core::domain::{
    DroneId, DroneState, Sector, SectorAssignment, SectorId, StatusMessage, TimeScale,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum FleetError {
    #[error("drone {0} is not registered")]
    UnknownDrone(DroneId),
}

/// Tower-side view of one registered drone.
#[derive(Debug, Clone)]
pub struct DroneRecord {
    pub drone_id: DroneId,
    pub drone_uuid: Uuid,
    /// Most recently observed status, if any
    pub status: Option<StatusMessage>,
    pub initialized_at: Instant,
}

impl DroneRecord {
    pub fn last_state(&self) -> Option<DroneState> {
        self.status.as_ref().map(|s| s.state)
    }
}

/// Result of a handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub drone_id: DroneId,
    /// Assigned sector, absent when every sector is owned
    pub sector: Option<(SectorId, SectorAssignment)>,
    /// True when a repeated handshake was answered with the original registration
    pub replayed: bool,
}

/// A sector rebound to a new drone.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub sector: SectorId,
    /// Previous owner, absent when the sector had been released
    pub relieved: Option<DroneId>,
    pub successor: DroneId,
    pub assignment: SectorAssignment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReliefOutcome {
    Substituted(Substitution),
    /// No Ready drone available; the sector stays with its owner and is retried later
    Deferred { sector: SectorId },
    /// The requesting drone owns no sector
    NotAssigned,
}

/// A drone dropped by the liveness monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub drone_id: DroneId,
    pub sector: Option<SectorId>,
}

/// Point-in-time copy of the registry for reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetSnapshot {
    pub assignments: Vec<(SectorId, DroneId)>,
    pub active: Vec<DroneId>,
    pub waiting: Vec<DroneId>,
    pub pending_reliefs: Vec<SectorId>,
    pub epoch_started: bool,
}

#[derive(Debug, Clone)]
struct PendingRelief {
    relieved: Option<DroneId>,
    failed_attempts: u32,
    next_attempt: Instant,
}

pub struct FleetRegistry {
    sectors: Vec<Sector>,
    next_drone_id: u64,
    drone_sectors: HashMap<DroneId, SectorId>,
    active: BTreeSet<DroneId>,
    waiting: BTreeSet<DroneId>,
    records: HashMap<DroneId, DroneRecord>,
    registrations: HashMap<Uuid, DroneId>,
    pending: BTreeMap<SectorId, PendingRelief>,
    /// successor -> relieved drone, until the successor is on station
    handovers: HashMap<DroneId, DroneId>,
    epoch_started: bool,
    relief_retry: ReliefRetryPolicy,
    time_scale: TimeScale,
}

impl FleetRegistry {
    pub fn new(sectors: Vec<Sector>) -> Self {
        Self {
            sectors,
            next_drone_id: 0,
            drone_sectors: HashMap::new(),
            active: BTreeSet::new(),
            waiting: BTreeSet::new(),
            records: HashMap::new(),
            registrations: HashMap::new(),
            pending: BTreeMap::new(),
            handovers: HashMap::new(),
            epoch_started: false,
            relief_retry: ReliefRetryPolicy::default(),
            time_scale: TimeScale::default(),
        }
    }

    /// Backoff schedule for pending reliefs, in simulated seconds scaled by `time_scale`.
    pub fn with_relief_retry(mut self, policy: ReliefRetryPolicy, time_scale: TimeScale) -> Self {
        self.relief_retry = policy;
        self.time_scale = time_scale;
        self
    }

    /// Register a drone and bind it to the first free sector in id order.
    pub fn register(&mut self, drone_uuid: Uuid, now: Instant, dedupe: bool) -> Registration {
        if dedupe {
            if let Some(&drone_id) = self.registrations.get(&drone_uuid) {
                if self.records.contains_key(&drone_id) {
                    let sector = self
                        .drone_sectors
                        .get(&drone_id)
                        .map(|&sector| (sector, assignment_for(&self.sectors[sector.0])));
                    return Registration {
                        drone_id,
                        sector,
                        replayed: true,
                    };
                }
            }
        }

        self.next_drone_id += 1;
        let drone_id = DroneId(self.next_drone_id);
        self.records.insert(
            drone_id,
            DroneRecord {
                drone_id,
                drone_uuid,
                status: None,
                initialized_at: now,
            },
        );
        self.registrations.insert(drone_uuid, drone_id);
        self.waiting.insert(drone_id);

        let free = self
            .sectors
            .iter()
            .find(|sector| sector.is_unassigned())
            .map(Sector::id);
        let sector = free.map(|sector| {
            self.bind(sector, drone_id);
            self.pending.remove(&sector);
            (sector, assignment_for(&self.sectors[sector.0]))
        });

        Registration {
            drone_id,
            sector,
            replayed: false,
        }
    }

    /// Cache the latest status published by a drone.
    pub fn record_status(&mut self, status: StatusMessage) -> Result<(), FleetError> {
        match self.records.get_mut(&status.drone_id) {
            Some(record) => {
                record.status = Some(status);
                Ok(())
            }
            None => Err(FleetError::UnknownDrone(status.drone_id)),
        }
    }

    /// Drones subject to liveness checks (`active` then `waiting`) with their registration time.
    pub fn tracked(&self) -> Vec<(DroneId, Instant)> {
        self.active
            .iter()
            .chain(self.waiting.iter())
            .filter_map(|id| self.records.get(id).map(|r| (*id, r.initialized_at)))
            .collect()
    }

    /// Forget an unresponsive drone. Its sector becomes free and is queued for relief.
    pub fn release(&mut self, drone_id: DroneId, now: Instant) -> Option<Release> {
        let record = self.records.remove(&drone_id)?;
        self.active.remove(&drone_id);
        self.waiting.remove(&drone_id);
        if self.registrations.get(&record.drone_uuid) == Some(&drone_id) {
            self.registrations.remove(&record.drone_uuid);
        }
        self.handovers
            .retain(|successor, relieved| *successor != drone_id && *relieved != drone_id);
        for pending in self.pending.values_mut() {
            if pending.relieved == Some(drone_id) {
                pending.relieved = None;
            }
        }

        let sector = self.drone_sectors.remove(&drone_id);
        if let Some(sector) = sector {
            self.sectors[sector.0].release();
            self.pending.insert(
                sector,
                PendingRelief {
                    relieved: None,
                    failed_attempts: 0,
                    next_attempt: now,
                },
            );
        }

        Some(Release { drone_id, sector })
    }

    /// Handle a relief request: demote the requester and hand its sector to a Ready drone.
    pub fn request_relief(&mut self, drone_id: DroneId, now: Instant) -> ReliefOutcome {
        let Some(&sector) = self.drone_sectors.get(&drone_id) else {
            return ReliefOutcome::NotAssigned;
        };
        if self.active.remove(&drone_id) {
            self.waiting.insert(drone_id);
        }

        match self.find_ready_successor(sector) {
            Some(successor) => ReliefOutcome::Substituted(self.hand_over(sector, successor)),
            None => {
                self.pending.insert(
                    sector,
                    PendingRelief {
                        relieved: Some(drone_id),
                        failed_attempts: 1,
                        next_attempt: now + self.backoff(1),
                    },
                );
                ReliefOutcome::Deferred { sector }
            }
        }
    }

    /// Retry every pending relief that is due.
    pub fn retry_pending(&mut self, now: Instant) -> Vec<Substitution> {
        let due: Vec<SectorId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.next_attempt <= now)
            .map(|(sector, _)| *sector)
            .collect();

        let mut substitutions = Vec::new();
        for sector in due {
            let relieved = self.pending.get(&sector).and_then(|p| p.relieved);
            match self.find_ready_successor(sector) {
                Some(successor) => substitutions.push(self.hand_over(sector, successor)),
                None => self.postpone(sector, relieved, now),
            }
        }
        substitutions
    }

    /// Undo a substitution whose resume command reached nobody.
    pub fn revert_substitution(&mut self, substitution: &Substitution, now: Instant) {
        let sector = substitution.sector;
        if self.sectors[sector.0].assigned_drone() != Some(substitution.successor) {
            return;
        }
        self.sectors[sector.0].release();
        self.drone_sectors.remove(&substitution.successor);
        self.handovers.remove(&substitution.successor);
        if self.active.remove(&substitution.successor) {
            self.waiting.insert(substitution.successor);
        }

        let relieved = substitution
            .relieved
            .filter(|old| self.records.contains_key(old) && !self.drone_sectors.contains_key(old));
        if let Some(old) = relieved {
            self.sectors[sector.0].assign(old);
            self.drone_sectors.insert(old, sector);
        }
        self.postpone(sector, relieved, now);
    }

    /// Whether every active drone reports `Waiting`.
    pub fn start_ready(&self) -> bool {
        !self.active.is_empty()
            && self
                .active
                .iter()
                .all(|id| self.state_of(*id) == Some(DroneState::Waiting))
    }

    pub fn epoch_started(&self) -> bool {
        self.epoch_started
    }

    pub fn mark_epoch_started(&mut self) {
        self.epoch_started = true;
    }

    /// Active drones still holding for `START`.
    pub fn late_waiters(&self) -> Vec<DroneId> {
        self.active
            .iter()
            .filter(|id| self.state_of(**id) == Some(DroneState::Waiting))
            .copied()
            .collect()
    }

    /// Handovers whose successor reports `Monitoring`, as `(successor, relieved)`.
    pub fn take_completed_handovers(&mut self) -> Vec<(DroneId, DroneId)> {
        let completed: Vec<(DroneId, DroneId)> = self
            .handovers
            .iter()
            .filter(|(successor, _)| self.state_of(**successor) == Some(DroneState::Monitoring))
            .map(|(successor, relieved)| (*successor, *relieved))
            .collect();
        for (successor, _) in &completed {
            self.handovers.remove(successor);
        }
        completed
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn sector_of(&self, drone_id: DroneId) -> Option<SectorId> {
        self.drone_sectors.get(&drone_id).copied()
    }

    pub fn record(&self, drone_id: DroneId) -> Option<&DroneRecord> {
        self.records.get(&drone_id)
    }

    pub fn is_active(&self, drone_id: DroneId) -> bool {
        self.active.contains(&drone_id)
    }

    pub fn is_waiting(&self, drone_id: DroneId) -> bool {
        self.waiting.contains(&drone_id)
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            assignments: self
                .sectors
                .iter()
                .filter_map(|s| s.assigned_drone().map(|d| (s.id(), d)))
                .collect(),
            active: self.active.iter().copied().collect(),
            waiting: self.waiting.iter().copied().collect(),
            pending_reliefs: self.pending.keys().copied().collect(),
            epoch_started: self.epoch_started,
        }
    }

    fn state_of(&self, drone_id: DroneId) -> Option<DroneState> {
        self.records.get(&drone_id).and_then(DroneRecord::last_state)
    }

    fn bind(&mut self, sector: SectorId, drone_id: DroneId) {
        self.sectors[sector.0].assign(drone_id);
        self.drone_sectors.insert(drone_id, sector);
        self.waiting.remove(&drone_id);
        self.active.insert(drone_id);
    }

    fn hand_over(&mut self, sector: SectorId, successor: DroneId) -> Substitution {
        // A recharged owner resuming its own sector relieves nobody
        let relieved = self.sectors[sector.0]
            .release()
            .filter(|old| *old != successor);
        if let Some(old) = relieved {
            self.drone_sectors.remove(&old);
            self.handovers.insert(successor, old);
        }
        self.bind(sector, successor);
        self.pending.remove(&sector);
        Substitution {
            sector,
            relieved,
            successor,
            assignment: assignment_for(&self.sectors[sector.0]),
        }
    }

    /// First `Ready` drone in `waiting` free to take `sector`: one without a
    /// sector, or the drone still holding `sector` from a deferred relief.
    fn find_ready_successor(&self, sector: SectorId) -> Option<DroneId> {
        self.waiting
            .iter()
            .copied()
            .filter(|id| self.drone_sectors.get(id).is_none_or(|held| *held == sector))
            .find(|id| self.state_of(*id) == Some(DroneState::Ready))
    }

    fn postpone(&mut self, sector: SectorId, relieved: Option<DroneId>, now: Instant) {
        let failed_attempts = self
            .pending
            .get(&sector)
            .map(|p| p.failed_attempts + 1)
            .unwrap_or(1);
        let next_attempt = now + self.backoff(failed_attempts);
        self.pending.insert(
            sector,
            PendingRelief {
                relieved,
                failed_attempts,
                next_attempt,
            },
        );
    }

    fn backoff(&self, failed_attempts: u32) -> Duration {
        self.time_scale
            .to_wall(self.relief_retry.backoff_secs(failed_attempts))
    }
}

fn assignment_for(sector: &Sector) -> SectorAssignment {
    SectorAssignment {
        starting_point: sector.starting_point(),
        timer: sector.timer(),
        tour: sector.tour().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skywatch_core::domain::{GridSpec, Position, SectorGrid};

    fn registry(area: f64) -> FleetRegistry {
        let grid = SectorGrid::build(&GridSpec::new(area), 30.0 / 3.6).unwrap();
        FleetRegistry::new(grid.into_sectors()).with_relief_retry(
            ReliefRetryPolicy {
                initial_backoff_secs: 10.0,
                max_backoff_secs: 40.0,
            },
            TimeScale::REAL_TIME,
        )
    }

    fn status(drone_id: DroneId, state: DroneState) -> StatusMessage {
        StatusMessage {
            drone_id,
            position: Position::default(),
            battery_level: 100.0,
            state,
            timestamp: Utc::now(),
        }
    }

    fn assert_exclusive(registry: &FleetRegistry) {
        let mut owners = BTreeSet::new();
        for sector in registry.sectors() {
            if let Some(owner) = sector.assigned_drone() {
                assert!(owners.insert(owner), "drone {owner} owns two sectors");
                assert_eq!(registry.sector_of(owner), Some(sector.id()));
            }
        }
        for id in &registry.active {
            assert!(!registry.waiting.contains(id));
        }
    }

    #[test]
    fn test_registration_assigns_sectors_in_id_order() {
        let mut reg = registry(400.0);
        let now = Instant::now();
        for expected in 0..4 {
            let registration = reg.register(Uuid::new_v4(), now, false);
            assert_eq!(registration.drone_id, DroneId(expected as u64 + 1));
            let (sector, assignment) = registration.sector.unwrap();
            assert_eq!(sector, SectorId(expected));
            assert_eq!(assignment.starting_point, reg.sectors()[expected].starting_point());
            assert!(reg.is_active(registration.drone_id));
        }
        assert_exclusive(&reg);
    }

    #[test]
    fn test_capacity_overflow_parks_drone() {
        let mut reg = registry(200.0);
        let now = Instant::now();
        reg.register(Uuid::new_v4(), now, false);
        let overflow = reg.register(Uuid::new_v4(), now, false);
        assert_eq!(overflow.drone_id, DroneId(2));
        assert!(overflow.sector.is_none());
        assert!(reg.is_waiting(DroneId(2)));
        assert_exclusive(&reg);
    }

    #[test]
    fn test_duplicate_handshake_without_dedupe_gets_new_id() {
        let mut reg = registry(400.0);
        let uuid = Uuid::new_v4();
        let now = Instant::now();
        let first = reg.register(uuid, now, false);
        let second = reg.register(uuid, now, false);
        assert_ne!(first.drone_id, second.drone_id);
        assert_ne!(first.sector.unwrap().0, second.sector.unwrap().0);
    }

    #[test]
    fn test_duplicate_handshake_with_dedupe_replays() {
        let mut reg = registry(400.0);
        let uuid = Uuid::new_v4();
        let now = Instant::now();
        let first = reg.register(uuid, now, true);
        let second = reg.register(uuid, now, true);
        assert!(second.replayed);
        assert_eq!(second.drone_id, first.drone_id);
        assert_eq!(second.sector, first.sector);
        assert_eq!(reg.snapshot().assignments.len(), 1);
    }

    #[test]
    fn test_record_status_requires_registration() {
        let mut reg = registry(200.0);
        assert_eq!(
            reg.record_status(status(DroneId(9), DroneState::Ready)),
            Err(FleetError::UnknownDrone(DroneId(9)))
        );
    }

    #[test]
    fn test_release_frees_sector_and_drops_drone() {
        let mut reg = registry(400.0);
        let now = Instant::now();
        let drone = reg.register(Uuid::new_v4(), now, false).drone_id;
        let release = reg.release(drone, now).unwrap();
        assert_eq!(release.sector, Some(SectorId(0)));
        assert!(reg.sectors()[0].is_unassigned());
        assert!(!reg.is_active(drone) && !reg.is_waiting(drone));
        assert!(reg.record(drone).is_none());
        assert!(reg.tracked().is_empty());
        assert_eq!(reg.snapshot().pending_reliefs, vec![SectorId(0)]);
        assert!(reg.release(drone, now).is_none());

        // The freed sector goes to the next registration
        let next = reg.register(Uuid::new_v4(), now, false);
        assert_eq!(next.drone_id, DroneId(2));
        assert_eq!(next.sector.unwrap().0, SectorId(0));
        assert!(reg.snapshot().pending_reliefs.is_empty());
    }

    #[test]
    fn test_relief_with_ready_drone_substitutes() {
        let mut reg = registry(200.0);
        let now = Instant::now();
        let owner = reg.register(Uuid::new_v4(), now, false).drone_id;
        let spare = reg.register(Uuid::new_v4(), now, false).drone_id;
        reg.record_status(status(owner, DroneState::Monitoring)).unwrap();
        reg.record_status(status(spare, DroneState::Ready)).unwrap();

        let sub = match reg.request_relief(owner, now) {
            ReliefOutcome::Substituted(sub) => sub,
            other => panic!("expected substitution, got {other:?}"),
        };
        assert_eq!(sub.sector, SectorId(0));
        assert_eq!(sub.relieved, Some(owner));
        assert_eq!(sub.successor, spare);
        assert!(reg.is_active(spare));
        assert!(reg.is_waiting(owner));
        assert_eq!(reg.sector_of(owner), None);
        assert_exclusive(&reg);

        // Repeated request from the relieved drone is a no-op
        assert_eq!(reg.request_relief(owner, now), ReliefOutcome::NotAssigned);
    }

    #[test]
    fn test_relief_skips_drones_that_are_not_ready() {
        let mut reg = registry(200.0);
        let now = Instant::now();
        let owner = reg.register(Uuid::new_v4(), now, false).drone_id;
        let charging = reg.register(Uuid::new_v4(), now, false).drone_id;
        let ready = reg.register(Uuid::new_v4(), now, false).drone_id;
        reg.record_status(status(charging, DroneState::Charging)).unwrap();
        reg.record_status(status(ready, DroneState::Ready)).unwrap();

        match reg.request_relief(owner, now) {
            ReliefOutcome::Substituted(sub) => assert_eq!(sub.successor, ready),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_deferred_relief_keeps_owner_and_retries_with_backoff() {
        let mut reg = registry(200.0);
        let start = Instant::now();
        let owner = reg.register(Uuid::new_v4(), start, false).drone_id;
        reg.record_status(status(owner, DroneState::Monitoring)).unwrap();

        assert_eq!(
            reg.request_relief(owner, start),
            ReliefOutcome::Deferred { sector: SectorId(0) }
        );
        assert_eq!(reg.sectors()[0].assigned_drone(), Some(owner));
        assert!(reg.is_waiting(owner));

        // Not due yet
        assert!(reg.retry_pending(start + Duration::from_secs(5)).is_empty());
        // Due, but still nobody ready: next attempt 20 s later
        assert!(reg.retry_pending(start + Duration::from_secs(10)).is_empty());
        assert!(reg.retry_pending(start + Duration::from_secs(25)).is_empty());

        let spare = reg.register(Uuid::new_v4(), start, false).drone_id;
        reg.record_status(status(spare, DroneState::Ready)).unwrap();
        let subs = reg.retry_pending(start + Duration::from_secs(30));
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].successor, spare);
        assert_eq!(subs[0].relieved, Some(owner));
        assert_eq!(reg.sectors()[0].assigned_drone(), Some(spare));
        assert!(reg.snapshot().pending_reliefs.is_empty());
        assert_exclusive(&reg);
    }

    #[test]
    fn test_released_sector_is_taken_over_by_ready_drone() {
        let mut reg = registry(200.0);
        let now = Instant::now();
        let owner = reg.register(Uuid::new_v4(), now, false).drone_id;
        let spare = reg.register(Uuid::new_v4(), now, false).drone_id;
        reg.record_status(status(spare, DroneState::Ready)).unwrap();

        reg.release(owner, now);
        let subs = reg.retry_pending(now);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].relieved, None);
        assert_eq!(subs[0].successor, spare);
        assert!(reg.take_completed_handovers().is_empty());
    }

    #[test]
    fn test_revert_substitution_restores_owner() {
        let mut reg = registry(200.0);
        let now = Instant::now();
        let owner = reg.register(Uuid::new_v4(), now, false).drone_id;
        let spare = reg.register(Uuid::new_v4(), now, false).drone_id;
        reg.record_status(status(spare, DroneState::Ready)).unwrap();

        let ReliefOutcome::Substituted(sub) = reg.request_relief(owner, now) else {
            panic!("expected substitution");
        };
        reg.revert_substitution(&sub, now);
        assert_eq!(reg.sectors()[0].assigned_drone(), Some(owner));
        assert!(reg.is_waiting(spare));
        assert_eq!(reg.snapshot().pending_reliefs, vec![SectorId(0)]);
        assert_exclusive(&reg);
    }

    #[test]
    fn test_start_fires_only_when_every_active_drone_waits() {
        // Fleet of one
        let mut reg = registry(200.0);
        let now = Instant::now();
        let solo = reg.register(Uuid::new_v4(), now, false).drone_id;
        assert!(!reg.start_ready());
        reg.record_status(status(solo, DroneState::Arriving)).unwrap();
        assert!(!reg.start_ready());
        reg.record_status(status(solo, DroneState::Waiting)).unwrap();
        assert!(reg.start_ready());

        // Fleet of two
        let mut reg = registry(400.0);
        let a = reg.register(Uuid::new_v4(), now, false).drone_id;
        let b = reg.register(Uuid::new_v4(), now, false).drone_id;
        reg.record_status(status(a, DroneState::Waiting)).unwrap();
        assert!(!reg.start_ready());
        reg.record_status(status(b, DroneState::Waiting)).unwrap();
        assert!(reg.start_ready());

        // Fleet of N with one straggler
        let mut reg = registry(800.0);
        let ids: Vec<DroneId> = (0..10)
            .map(|_| reg.register(Uuid::new_v4(), now, false).drone_id)
            .collect();
        for id in &ids[..9] {
            reg.record_status(status(*id, DroneState::Waiting)).unwrap();
        }
        reg.record_status(status(ids[9], DroneState::Arriving)).unwrap();
        assert!(!reg.start_ready());
        assert_eq!(reg.late_waiters().len(), 9);
    }

    #[test]
    fn test_empty_fleet_never_starts() {
        let reg = registry(200.0);
        assert!(!reg.start_ready());
    }

    #[test]
    fn test_handover_completes_when_successor_monitors() {
        let mut reg = registry(200.0);
        let now = Instant::now();
        let owner = reg.register(Uuid::new_v4(), now, false).drone_id;
        let spare = reg.register(Uuid::new_v4(), now, false).drone_id;
        reg.record_status(status(spare, DroneState::Ready)).unwrap();
        reg.request_relief(owner, now);

        reg.record_status(status(spare, DroneState::Arriving)).unwrap();
        assert!(reg.take_completed_handovers().is_empty());
        reg.record_status(status(spare, DroneState::Monitoring)).unwrap();
        assert_eq!(reg.take_completed_handovers(), vec![(spare, owner)]);
        assert!(reg.take_completed_handovers().is_empty());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut reg = registry(200.0);
        let now = Instant::now();
        let first = reg.register(Uuid::new_v4(), now, false).drone_id;
        reg.release(first, now);
        let second = reg.register(Uuid::new_v4(), now, false).drone_id;
        assert!(second > first);
    }

    #[test]
    fn test_sole_drone_resumes_its_own_sector_after_recharge() {
        let mut reg = registry(200.0);
        let start = Instant::now();
        let owner = reg.register(Uuid::new_v4(), start, false).drone_id;
        reg.record_status(status(owner, DroneState::Monitoring)).unwrap();
        assert_eq!(
            reg.request_relief(owner, start),
            ReliefOutcome::Deferred { sector: SectorId(0) }
        );

        // Flying home and charging: nobody can take the sector
        reg.record_status(status(owner, DroneState::Charging)).unwrap();
        assert!(reg.retry_pending(start + Duration::from_secs(10)).is_empty());

        reg.record_status(status(owner, DroneState::Ready)).unwrap();
        let subs = reg.retry_pending(start + Duration::from_secs(3 * 3600));
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].sector, SectorId(0));
        assert_eq!(subs[0].successor, owner);
        assert_eq!(subs[0].relieved, None);
        assert!(reg.is_active(owner));
        assert_eq!(reg.sector_of(owner), Some(SectorId(0)));
        assert!(reg.snapshot().pending_reliefs.is_empty());
        assert_exclusive(&reg);

        reg.record_status(status(owner, DroneState::Monitoring)).unwrap();
        assert!(reg.take_completed_handovers().is_empty());
    }

    #[test]
    fn test_ready_holder_is_not_sent_to_another_sector() {
        let mut reg = registry(400.0);
        let now = Instant::now();
        let first = reg.register(Uuid::new_v4(), now, false).drone_id;
        let second = reg.register(Uuid::new_v4(), now, false).drone_id;
        reg.record_status(status(second, DroneState::Monitoring)).unwrap();
        reg.request_relief(second, now);
        reg.release(first, now);

        // Sector 0 is retried first but belongs to nobody ready
        reg.record_status(status(second, DroneState::Ready)).unwrap();
        let subs = reg.retry_pending(now + Duration::from_secs(3600));
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].sector, SectorId(1));
        assert_eq!(subs[0].successor, second);
        assert_eq!(reg.snapshot().pending_reliefs, vec![SectorId(0)]);
        assert_exclusive(&reg);
    }

    #[test]
    fn test_start_ignores_waiting_pool() {
        let mut reg = registry(200.0);
        let now = Instant::now();
        let owner = reg.register(Uuid::new_v4(), now, false).drone_id;
        let spare = reg.register(Uuid::new_v4(), now, false).drone_id;
        reg.record_status(status(owner, DroneState::Arriving)).unwrap();
        reg.record_status(status(spare, DroneState::Waiting)).unwrap();
        assert!(!reg.start_ready());

        reg.record_status(status(owner, DroneState::Waiting)).unwrap();
        assert!(reg.start_ready());
    }
}
