// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Drone Agent
//!
//! One autonomous drone: the lifecycle state machine, motion, battery and the
//! patrol sequence.
//!
//! After registration an agent runs three duties:
//!
//! - **Status publisher** - writes a consistent snapshot under the status key every tick.
//! - **Battery updater** - drains the battery every tick outside `Ready`/`Charging`.
//! - **Patrol sequence** - arrive, wait for `START`, sweep, return, recharge, repeat.
//!
//! Position and battery each sit behind their own lock. Reaching `Offline`
//! cancels the agent's lifetime token, so every duty exits within one tick.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Drone-side coordination protocol

use crate::client::DroneClient;
use crate::types::{AgentError, AgentSettings};
use chrono::Utc;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use skywatch_core::domain::battery::random_recharge_secs;
use skywatch_core::domain::grid::SWEEP_CYCLE_SECS;
use skywatch_core::domain::messages::{
    self, BroadcastCommand, InitMessage, ReliefNotice, SectorAssignment, StatusMessage, VisitRecord,
};
use skywatch_core::domain::{BatteryModel, BusError, DroneId, DroneState, Position, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sector currently being served.
#[derive(Debug, Clone, PartialEq)]
pub struct Mission {
    pub assignment: SectorAssignment,
    /// Simulated seconds from the tower to the sector entry
    pub travel_time: f64,
    pub critical_battery_level: f64,
    /// First assignment of the run; arrival waits for `START`
    pub initial: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum PatrolEnd {
    SweepsCompleted,
    LowBattery,
    Relieved(DroneId),
}

/// Handle to one drone. Cloning shares the same drone.
#[derive(Clone)]
pub struct DroneAgent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    client: DroneClient,
    settings: AgentSettings,
    id: RwLock<Option<DroneId>>,
    tower_position: RwLock<Position>,
    position: Mutex<Position>,
    battery: Mutex<BatteryModel>,
    state: watch::Sender<DroneState>,
    mission: Mutex<Option<Mission>>,
    relief_requested: AtomicBool,
    lifetime: CancellationToken,
    duties: Mutex<Vec<JoinHandle<()>>>,
}

impl DroneAgent {
    /// A fully charged, `Ready` drone parked at the origin until the tower replies.
    pub fn new(client: DroneClient, settings: AgentSettings) -> Self {
        let battery = BatteryModel::for_profile(&settings.profile);
        let (state, _) = watch::channel(DroneState::Ready);
        Self {
            inner: Arc::new(AgentInner {
                client,
                settings,
                id: RwLock::new(None),
                tower_position: RwLock::new(Position::default()),
                position: Mutex::new(Position::default()),
                battery: Mutex::new(battery),
                state,
                mission: Mutex::new(None),
                relief_requested: AtomicBool::new(false),
                lifetime: CancellationToken::new(),
                duties: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Start from `level` percent instead of a full battery.
    pub fn with_battery_level(self, level: f64) -> Self {
        {
            let mut battery = self.inner.battery.lock();
            *battery = battery.clone().with_level(level);
        }
        self
    }

    pub fn id(&self) -> Option<DroneId> {
        *self.inner.id.read()
    }

    pub fn state(&self) -> DroneState {
        *self.inner.state.borrow()
    }

    /// Watch every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<DroneState> {
        self.inner.state.subscribe()
    }

    pub fn position(&self) -> Position {
        *self.inner.position.lock()
    }

    pub fn tower_position(&self) -> Position {
        *self.inner.tower_position.read()
    }

    pub fn battery_level(&self) -> f64 {
        self.inner.battery.lock().level()
    }

    pub fn mission(&self) -> Option<Mission> {
        self.inner.mission.lock().clone()
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.inner.settings
    }

    /// Scale the battery drain; 0 holds charge, 1 is normal flight.
    pub fn set_consumption_ratio(&self, ratio: f64) {
        self.inner.battery.lock().set_consumption_ratio(ratio);
    }

    /// Apply a registration reply: adopt the id and park at the tower.
    pub fn apply_init(&self, init: &InitMessage) {
        *self.inner.id.write() = Some(init.drone_id);
        *self.inner.tower_position.write() = init.tower_position;
        *self.inner.position.lock() = init.tower_position;
    }

    /// Move along one lifecycle edge.
    ///
    /// Entering `Waiting` stops the battery drain; every other state restores it.
    /// Any move out of `Offline` fails with [`AgentError::Offline`].
    pub fn transition(&self, next: DroneState) -> Result<(), AgentError> {
        let mut rejected = None;
        self.inner.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                debug!(drone_id = ?self.id(), from = %current, to = %next, "State transition");
                *current = next;
                true
            } else {
                rejected = Some(*current);
                false
            }
        });
        match rejected {
            Some(from) if from.is_terminal() => return Err(AgentError::Offline),
            Some(from) => return Err(AgentError::InvalidTransition { from, to: next }),
            None => {}
        }
        let ratio = if next == DroneState::Waiting { 0.0 } else { 1.0 };
        self.set_consumption_ratio(ratio);
        Ok(())
    }

    /// Accept a sector. Only a `Ready` drone accepts one; any other state
    /// rejects the assignment and keeps its state.
    pub fn assign_sector(&self, assignment: SectorAssignment, initial: bool) -> Result<(), AgentError> {
        let state = self.state();
        if state.is_terminal() {
            return Err(AgentError::Offline);
        }
        if state != DroneState::Ready {
            warn!(drone_id = ?self.id(), state = %state, "Rejecting sector assignment");
            return Err(AgentError::InvalidTransition {
                from: state,
                to: DroneState::Arriving,
            });
        }

        let profile = &self.inner.settings.profile;
        let travel_time =
            profile.travel_time(self.position().distance_to(&assignment.starting_point));
        let mission = Mission {
            critical_battery_level: profile.critical_battery_level(travel_time),
            assignment,
            travel_time,
            initial,
        };
        self.transition(DroneState::Arriving)?;
        info!(
            drone_id = ?self.id(),
            entry = %mission.assignment.starting_point,
            timer = mission.assignment.timer,
            initial,
            "Sector assigned"
        );
        *self.inner.mission.lock() = Some(mission);
        Ok(())
    }

    /// Whether the battery can no longer cover another sweep plus the way home.
    pub fn is_battery_low(&self) -> bool {
        let profile = &self.inner.settings.profile;
        let threshold = match self.mission() {
            Some(mission) => {
                mission.critical_battery_level + profile.battery_deviation(mission.travel_time)
            }
            None => profile.low_battery_threshold(0.0),
        };
        self.battery_level() <= threshold
    }

    /// Whether another sweep draining `sweep_drain` percent keeps the critical reserve.
    fn covers_next_sweep(&self, sweep_drain: f64) -> bool {
        let reserve = self
            .mission()
            .map(|m| m.critical_battery_level)
            .unwrap_or(0.0);
        self.battery_level() - sweep_drain > reserve
    }

    /// Fly in a straight line to `destination` in `travel_secs` simulated seconds.
    ///
    /// Position is interpolated every tick. Going `Offline` ends the flight
    /// early; the position snaps to `destination` on every exit.
    pub async fn move_to(&self, destination: Position, travel_secs: f64) -> Result<(), AgentError> {
        let start = self.position();
        let total = self.inner.settings.time_scale.to_wall(travel_secs.max(0.0));
        let tick = self.inner.settings.time_scale.tick();
        let began = Instant::now();

        let outcome = loop {
            if self.state() == DroneState::Offline {
                break Err(AgentError::Offline);
            }
            let elapsed = began.elapsed();
            if elapsed >= total {
                break Ok(());
            }
            let ratio = elapsed.as_secs_f64() / total.as_secs_f64();
            *self.inner.position.lock() = start.lerp(&destination, ratio);

            tokio::select! {
                _ = self.inner.lifetime.cancelled() => break Err(self.stop_reason()),
                _ = tokio::time::sleep(tick.min(total - elapsed)) => {}
            }
        };

        *self.inner.position.lock() = destination;
        outcome
    }

    /// Charge to full over a random duration within the profile's range, then become `Ready`.
    pub async fn recharge(&self) -> Result<(), AgentError> {
        let duration = random_recharge_secs(&self.inner.settings.profile, &mut rand::rng());
        let rate = self.inner.battery.lock().begin_recharge(duration);
        info!(drone_id = ?self.id(), duration_secs = duration, rate, "Recharging");

        let mut ticker = self.ticker();
        let mut last = Instant::now();
        while !self.inner.battery.lock().is_full() {
            tokio::select! {
                _ = self.inner.lifetime.cancelled() => return Err(self.stop_reason()),
                _ = ticker.tick() => {}
            }
            let now = Instant::now();
            let dt = self.inner.settings.time_scale.to_sim(now - last);
            last = now;
            self.inner.battery.lock().recharge(dt);
        }
        self.transition(DroneState::Ready)
    }

    /// Consistent snapshot for the status key. Position is read before battery.
    pub fn status(&self) -> Result<StatusMessage, AgentError> {
        let drone_id = self.id().ok_or(AgentError::NotRegistered)?;
        let position = self.position();
        let battery_level = self.battery_level();
        Ok(StatusMessage {
            drone_id,
            position,
            battery_level,
            state: self.state(),
            timestamp: Utc::now(),
        })
    }

    /// Stop every duty. The agent publishes one last status and `run` returns.
    pub fn terminate(&self) {
        self.inner.lifetime.cancel();
    }

    /// Register with the tower and fly until the battery dies or the agent is terminated.
    ///
    /// Returns the final state.
    pub async fn run(&self) -> Result<DroneState, AgentError> {
        let init = self
            .inner
            .client
            .connect(
                self.inner.settings.handshake_timeout,
                self.inner.settings.handshake_attempts,
            )
            .await?;
        self.apply_init(&init);
        info!(
            drone_id = %init.drone_id,
            drone_uuid = %self.inner.client.drone_uuid(),
            tower = %init.tower_position,
            "Registered with tower"
        );

        self.spawn_duties();
        let outcome = self.fly(init).await;

        self.inner.lifetime.cancel();
        let duties: Vec<JoinHandle<()>> = self.inner.duties.lock().drain(..).collect();
        for duty in duties {
            if let Err(e) = duty.await {
                warn!("Drone duty ended abnormally: {}", e);
            }
        }

        match outcome {
            Err(e) if !e.is_stop() => Err(e),
            _ => Ok(self.state()),
        }
    }

    async fn fly(&self, init: InitMessage) -> Result<(), AgentError> {
        let drone_id = init.drone_id;
        let mut resume = self.inner.client.subscribe_resume(drone_id).await?;

        if let Some(assignment) = init.assignment() {
            self.assign_sector(assignment, true)?;
            self.serve_sector().await?;
        } else {
            info!(drone_id = %drone_id, "No free sector, standing by");
        }

        loop {
            let assignment = self.wait_for_resume(&mut resume).await?;
            match self.assign_sector(assignment, false) {
                Ok(()) => self.serve_sector().await?,
                Err(AgentError::InvalidTransition { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Arrive, patrol, return and recharge for the current mission.
    async fn serve_sector(&self) -> Result<(), AgentError> {
        let mission = self.mission().ok_or(AgentError::NotRegistered)?;
        let drone_id = self.id().ok_or(AgentError::NotRegistered)?;

        self.move_to(mission.assignment.starting_point, mission.travel_time)
            .await?;

        if mission.initial {
            let mut broadcast = self.inner.client.subscribe_broadcast().await?;
            self.transition(DroneState::Waiting)?;
            info!(drone_id = %drone_id, "On station, waiting for START");
            self.wait_for_start(&mut broadcast).await?;
        }
        self.transition(DroneState::Monitoring)?;

        let end = self.patrol(drone_id, &mission).await?;
        match end {
            PatrolEnd::Relieved(by) => info!(drone_id = %drone_id, relieved_by = %by, "Relieved"),
            PatrolEnd::LowBattery => warn!(
                drone_id = %drone_id,
                battery = self.battery_level(),
                "Battery low, leaving sector"
            ),
            PatrolEnd::SweepsCompleted => info!(drone_id = %drone_id, "Patrol budget spent"),
        }

        self.transition(DroneState::Returning)?;
        let tower = self.tower_position();
        let travel = self
            .inner
            .settings
            .profile
            .travel_time(self.position().distance_to(&tower));
        self.move_to(tower, travel).await?;

        self.transition(DroneState::Charging)?;
        self.recharge().await?;
        info!(drone_id = %drone_id, "Charged and ready");
        Ok(())
    }

    async fn patrol(&self, drone_id: DroneId, mission: &Mission) -> Result<PatrolEnd, AgentError> {
        let mut relieved = self.inner.client.subscribe_relieved(drone_id).await?;
        self.inner.relief_requested.store(false, Ordering::SeqCst);

        let relief_timer = self.inner.lifetime.child_token();
        let relief_after = self
            .inner
            .settings
            .time_scale
            .to_wall((mission.assignment.timer - mission.travel_time).max(0.0));
        {
            let agent = self.clone();
            let token = relief_timer.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(relief_after) => agent.request_relief_once(drone_id).await,
                }
            });
        }

        let end = self.sweep(drone_id, mission, &mut relieved).await;
        relief_timer.cancel();

        // The sector must not be left without a relief once this drone leaves
        if matches!(end, Ok(PatrolEnd::SweepsCompleted)) {
            self.request_relief_once(drone_id).await;
        }
        end
    }

    async fn sweep(
        &self,
        drone_id: DroneId,
        mission: &Mission,
        relieved: &mut Subscription,
    ) -> Result<PatrolEnd, AgentError> {
        let sweeps = (mission.assignment.timer / SWEEP_CYCLE_SECS).floor() as u64;
        let tour = &mission.assignment.tour;
        debug!(drone_id = %drone_id, sweeps, waypoints = tour.len(), "Patrol started");

        for sweep in 0..sweeps {
            let charge_at_start = self.battery_level();
            if tour.is_empty() {
                if let Some(by) = self.hover(SWEEP_CYCLE_SECS, relieved).await? {
                    return Ok(PatrolEnd::Relieved(by));
                }
            } else {
                for waypoint in tour {
                    let travel = self
                        .inner
                        .settings
                        .profile
                        .travel_time(self.position().distance_to(waypoint));
                    self.move_to(*waypoint, travel).await?;
                    self.log_visit(drone_id).await;
                    if let Some(by) = relief_arrived(relieved) {
                        return Ok(PatrolEnd::Relieved(by));
                    }
                }
            }

            debug!(drone_id = %drone_id, sweep = sweep + 1, battery = self.battery_level(), "Sweep completed");
            let drained = charge_at_start - self.battery_level();
            if self.is_battery_low() || !self.covers_next_sweep(drained) {
                self.request_relief_once(drone_id).await;
                return Ok(PatrolEnd::LowBattery);
            }
        }
        Ok(PatrolEnd::SweepsCompleted)
    }

    /// Hold position for `duration_secs` simulated seconds unless relieved first.
    async fn hover(
        &self,
        duration_secs: f64,
        relieved: &mut Subscription,
    ) -> Result<Option<DroneId>, AgentError> {
        let until = Instant::now() + self.inner.settings.time_scale.to_wall(duration_secs);
        let mut ticker = self.ticker();
        while Instant::now() < until {
            if let Some(by) = relief_arrived(relieved) {
                return Ok(Some(by));
            }
            tokio::select! {
                _ = self.inner.lifetime.cancelled() => return Err(self.stop_reason()),
                _ = ticker.tick() => {}
            }
        }
        Ok(relief_arrived(relieved))
    }

    async fn request_relief_once(&self, drone_id: DroneId) {
        if self.inner.relief_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.inner.client.request_relief(drone_id).await {
            Ok(_) => info!(drone_id = %drone_id, battery = self.battery_level(), "Relief requested"),
            Err(e) => {
                warn!(drone_id = %drone_id, "Relief request failed: {}", e);
                self.inner.relief_requested.store(false, Ordering::SeqCst);
            }
        }
    }

    async fn log_visit(&self, drone_id: DroneId) {
        if !self.inner.settings.log_visits {
            return;
        }
        let visit = VisitRecord {
            drone_id,
            position: self.position(),
            battery_level: self.battery_level(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.inner.client.log_visit(&visit).await {
            warn!(drone_id = %drone_id, "Visit not logged: {}", e);
        }
    }

    async fn wait_for_start(&self, broadcast: &mut Subscription) -> Result<(), AgentError> {
        loop {
            let payload = self.next_message(broadcast).await?;
            match payload.parse::<BroadcastCommand>() {
                Ok(BroadcastCommand::Start) => return Ok(()),
                Err(e) => warn!("Ignoring broadcast: {}", e),
            }
        }
    }

    async fn wait_for_resume(&self, resume: &mut Subscription) -> Result<SectorAssignment, AgentError> {
        loop {
            let payload = self.next_message(resume).await?;
            match messages::decode::<SectorAssignment>(resume.channel(), &payload) {
                Ok(assignment) => return Ok(assignment),
                Err(e) => warn!("Dropping resume command: {}", e),
            }
        }
    }

    /// Next payload on `subscription`, resubscribing when it closes.
    async fn next_message(&self, subscription: &mut Subscription) -> Result<String, AgentError> {
        loop {
            let received = tokio::select! {
                _ = self.inner.lifetime.cancelled() => return Err(self.stop_reason()),
                received = subscription.recv() => received,
            };
            match received {
                Ok(payload) => return Ok(payload),
                Err(BusError::Lagged(_)) => continue,
                Err(e) => {
                    warn!(channel = subscription.channel(), "Receive failed, resubscribing: {}", e);
                    self.pause().await?;
                    let channel = subscription.channel().to_string();
                    match self.inner.client.resubscribe(&channel).await {
                        Ok(fresh) => *subscription = fresh,
                        Err(e) => warn!(channel = %channel, "Resubscribe failed: {}", e),
                    }
                }
            }
        }
    }

    async fn pause(&self) -> Result<(), AgentError> {
        tokio::select! {
            _ = self.inner.lifetime.cancelled() => Err(self.stop_reason()),
            _ = tokio::time::sleep(self.inner.settings.time_scale.tick()) => Ok(()),
        }
    }

    fn spawn_duties(&self) {
        let handles = vec![
            tokio::spawn(self.clone().publish_status_loop()),
            tokio::spawn(self.clone().battery_loop()),
        ];
        self.inner.duties.lock().extend(handles);
    }

    async fn publish_status_loop(self) {
        let mut ticker = self.ticker();
        loop {
            let stopped = tokio::select! {
                _ = self.inner.lifetime.cancelled() => true,
                _ = ticker.tick() => false,
            };
            self.publish_status().await;
            if stopped {
                break;
            }
        }
        debug!(drone_id = ?self.id(), "Status publisher stopped");
    }

    async fn publish_status(&self) {
        let status = match self.status() {
            Ok(status) => status,
            Err(e) => {
                debug!("No status to publish: {}", e);
                return;
            }
        };
        if let Err(e) = self.inner.client.publish_status(&status).await {
            warn!(drone_id = %status.drone_id, "Status publish failed: {}", e);
        }
    }

    async fn battery_loop(self) {
        let mut ticker = self.ticker();
        let mut last = Instant::now();
        loop {
            tokio::select! {
                _ = self.inner.lifetime.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let now = Instant::now();
            let dt = self.inner.settings.time_scale.to_sim(now - last);
            last = now;

            if !self.state().drains_battery() {
                continue;
            }
            let level = self.inner.battery.lock().consume(dt);
            if level <= 0.0 {
                self.go_offline();
                break;
            }
        }
        debug!(drone_id = ?self.id(), "Battery updater stopped");
    }

    fn go_offline(&self) {
        if self.transition(DroneState::Offline).is_ok() {
            counter!("skywatch_drone_offline_total").increment(1);
            warn!(drone_id = ?self.id(), position = %self.position(), "Battery depleted, drone offline");
        }
        self.inner.lifetime.cancel();
    }

    fn stop_reason(&self) -> AgentError {
        if self.state() == DroneState::Offline {
            AgentError::Offline
        } else {
            AgentError::Terminated
        }
    }

    fn ticker(&self) -> tokio::time::Interval {
        let mut ticker = tokio::time::interval(self.inner.settings.time_scale.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

/// Drain pending relief notices without blocking.
fn relief_arrived(relieved: &mut Subscription) -> Option<DroneId> {
    loop {
        match relieved.try_recv() {
            Ok(payload) => match messages::decode::<ReliefNotice>(relieved.channel(), &payload) {
                Ok(notice) => return Some(notice.relieved_by),
                Err(e) => warn!("Dropping relief notice: {}", e),
            },
            Err(BusError::Lagged(_)) => continue,
            Err(_) => return None,
        }
    }
}
