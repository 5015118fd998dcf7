// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tower Orchestrator
//!
//! Runs the tower's three duties over a [`MessageBus`]:
//!
//! - **Handshake listener** - registers drones and replies with their sector.
//! - **Liveness monitor** - polls status keys, releases silent drones, fires the
//!   synchronized `START`, announces completed handovers and retries pending reliefs.
//! - **Relief listener** - hands a sector to a `Ready` drone when its owner asks for relief.
//!
//! All three share one [`FleetRegistry`] behind a single mutex. Bus failures are
//! logged and retried; nothing here stops the tower except [`TowerOrchestrator::shutdown`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Tower-side coordination protocol

use crate::domain::fleet::{FleetRegistry, FleetSnapshot, ReliefOutcome, Substitution};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use skywatch_core::domain::config::{FleetConfigSpec, ReliefRetryPolicy};
use skywatch_core::domain::messages::{
    self, BroadcastCommand, Handshake, InitMessage, ReliefNotice, ReliefRequest, StatusMessage,
    BROADCAST_CHANNEL, HANDSHAKE_CHANNEL, RELIEF_CHANNEL,
};
use skywatch_core::domain::{BusError, DroneId, MessageBus, Position, Sector, Subscription, TimeScale};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tower runtime settings.
#[derive(Debug, Clone)]
pub struct TowerSettings {
    pub tower_position: Position,
    pub time_scale: TimeScale,
    /// Wall-clock exemption from liveness checks after registration
    pub grace_period: Duration,
    /// Liveness poll interval in simulated seconds
    pub poll_interval_secs: f64,
    pub dedupe_handshakes: bool,
    pub relief_retry: ReliefRetryPolicy,
}

impl Default for TowerSettings {
    fn default() -> Self {
        Self {
            tower_position: Position::default(),
            time_scale: TimeScale::default(),
            grace_period: Duration::from_secs(5),
            poll_interval_secs: 1.0,
            dedupe_handshakes: false,
            relief_retry: ReliefRetryPolicy::default(),
        }
    }
}

impl TowerSettings {
    pub fn from_config(spec: &FleetConfigSpec) -> Self {
        Self {
            tower_position: spec.tower_position(),
            time_scale: spec.simulation.time_scale,
            grace_period: spec.tower.grace_period(),
            poll_interval_secs: spec.tower.poll_interval_secs,
            dedupe_handshakes: spec.tower.dedupe_handshakes,
            relief_retry: spec.tower.relief_retry.clone(),
        }
    }

    fn poll_period(&self) -> Duration {
        self.time_scale
            .to_wall(self.poll_interval_secs)
            .max(Duration::from_millis(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StartSignal {
    Epoch,
    LateJoiners(usize),
}

/// Central coordinator of the fleet. Cloning shares the same tower.
#[derive(Clone)]
pub struct TowerOrchestrator {
    inner: Arc<TowerInner>,
}

struct TowerInner {
    bus: Arc<dyn MessageBus>,
    registry: Mutex<FleetRegistry>,
    settings: TowerSettings,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TowerOrchestrator {
    pub fn new(bus: Arc<dyn MessageBus>, sectors: Vec<Sector>, settings: TowerSettings) -> Self {
        let registry = FleetRegistry::new(sectors)
            .with_relief_retry(settings.relief_retry.clone(), settings.time_scale);
        Self {
            inner: Arc::new(TowerInner {
                bus,
                registry: Mutex::new(registry),
                settings,
                shutdown: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Subscribe to the inbound channels and spawn the tower duties.
    ///
    /// Fails only if the initial subscriptions cannot be established.
    pub async fn start(&self) -> Result<(), BusError> {
        let handshakes = self.inner.bus.subscribe(HANDSHAKE_CHANNEL).await?;
        let reliefs = self.inner.bus.subscribe(RELIEF_CHANNEL).await?;

        let handles = vec![
            tokio::spawn(self.inner.clone().run_handshake_listener(handshakes)),
            tokio::spawn(self.inner.clone().run_liveness_monitor()),
            tokio::spawn(self.inner.clone().run_relief_listener(reliefs)),
        ];
        self.inner.tasks.lock().extend(handles);

        let sectors = self.inner.registry.lock().sectors().len();
        info!(
            sectors,
            tower = %self.inner.settings.tower_position,
            time_scale = self.inner.settings.time_scale.factor(),
            "Tower started"
        );
        Ok(())
    }

    /// Stop every duty and wait for them to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Tower task ended abnormally: {}", e);
            }
        }
        info!("Tower stopped");
    }

    pub fn settings(&self) -> &TowerSettings {
        &self.inner.settings
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        self.inner.registry.lock().snapshot()
    }

    /// Read access to the registry under its lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&FleetRegistry) -> R) -> R {
        f(&self.inner.registry.lock())
    }

    /// Queue a point-to-point command for one drone.
    pub async fn send_command(&self, drone_id: DroneId, command: &str) -> Result<usize, BusError> {
        self.inner
            .bus
            .push(&messages::command_queue(drone_id), command)
            .await
    }

    /// Run a single liveness pass outside the monitor loop.
    pub async fn poll_liveness(&self) {
        self.inner.poll_liveness().await;
    }
}

impl TowerInner {
    async fn run_handshake_listener(self: Arc<Self>, mut subscription: Subscription) {
        while let Some(payload) = self.next_payload(&mut subscription).await {
            self.handle_handshake(&payload).await;
        }
        debug!("Handshake listener stopped");
    }

    async fn run_relief_listener(self: Arc<Self>, mut subscription: Subscription) {
        while let Some(payload) = self.next_payload(&mut subscription).await {
            self.handle_relief_request(&payload).await;
        }
        debug!("Relief listener stopped");
    }

    async fn run_liveness_monitor(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.poll_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.poll_liveness().await,
            }
        }
        debug!("Liveness monitor stopped");
    }

    async fn handle_handshake(&self, payload: &str) {
        let handshake: Handshake = match messages::decode(HANDSHAKE_CHANNEL, payload) {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!("Dropping handshake: {}", e);
                return;
            }
        };

        let registration = self.registry.lock().register(
            handshake.drone_uuid,
            Instant::now(),
            self.settings.dedupe_handshakes,
        );
        counter!("skywatch_tower_registrations_total").increment(1);

        match &registration.sector {
            Some((sector, _)) => info!(
                drone_id = %registration.drone_id,
                sector = %sector,
                replayed = registration.replayed,
                "Registered drone"
            ),
            None => info!(
                drone_id = %registration.drone_id,
                replayed = registration.replayed,
                "Registered drone without sector, every sector is owned"
            ),
        }

        let init = InitMessage::new(
            registration.drone_id,
            self.settings.tower_position,
            registration.sector.map(|(_, assignment)| assignment),
        );
        self.publish_message(&messages::init_channel(&handshake.drone_uuid), &init)
            .await;
    }

    async fn handle_relief_request(&self, payload: &str) {
        let request: ReliefRequest = match messages::decode(RELIEF_CHANNEL, payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping relief request: {}", e);
                return;
            }
        };

        let outcome = self
            .registry
            .lock()
            .request_relief(request.drone_id, Instant::now());
        match outcome {
            ReliefOutcome::Substituted(substitution) => {
                counter!("skywatch_tower_substitutions_total").increment(1);
                info!(
                    drone_id = %request.drone_id,
                    successor = %substitution.successor,
                    sector = %substitution.sector,
                    "Relief dispatched"
                );
                self.dispatch(substitution).await;
            }
            ReliefOutcome::Deferred { sector } => {
                counter!("skywatch_tower_relief_deferred_total").increment(1);
                warn!(
                    drone_id = %request.drone_id,
                    sector = %sector,
                    "No Ready drone available, relief deferred"
                );
            }
            ReliefOutcome::NotAssigned => {
                debug!(drone_id = %request.drone_id, "Relief request from drone without sector");
            }
        }
    }

    async fn poll_liveness(&self) {
        let tracked = self.registry.lock().tracked();
        let now = Instant::now();

        for (drone_id, initialized_at) in tracked {
            let in_grace = now.saturating_duration_since(initialized_at) < self.settings.grace_period;
            let key = messages::status_key(drone_id);
            match self.bus.get(&key).await {
                Ok(Some(payload)) => self.observe_status(drone_id, &key, &payload),
                Ok(None) if in_grace => {}
                Ok(None) => self.handle_unresponsive(drone_id),
                Err(e) => warn!(drone_id = %drone_id, "Status read failed, will retry: {}", e),
            }
        }

        self.synchronize_start().await;
        self.announce_completed_handovers().await;
        self.retry_pending_reliefs().await;

        let snapshot = self.registry.lock().snapshot();
        gauge!("skywatch_tower_active_drones").set(snapshot.active.len() as f64);
        gauge!("skywatch_tower_waiting_drones").set(snapshot.waiting.len() as f64);
    }

    fn observe_status(&self, drone_id: DroneId, key: &str, payload: &str) {
        let status: StatusMessage = match messages::decode(key, payload) {
            Ok(status) => status,
            Err(e) => {
                warn!(drone_id = %drone_id, "Ignoring status: {}", e);
                return;
            }
        };
        if status.drone_id != drone_id {
            warn!(
                drone_id = %drone_id,
                published_as = %status.drone_id,
                "Ignoring status published under another drone's key"
            );
            return;
        }
        if let Err(e) = self.registry.lock().record_status(status) {
            debug!("Status arrived after release: {}", e);
        }
    }

    fn handle_unresponsive(&self, drone_id: DroneId) {
        let released = self.registry.lock().release(drone_id, Instant::now());
        if let Some(release) = released {
            counter!("skywatch_tower_unresponsive_total").increment(1);
            match release.sector {
                Some(sector) => warn!(
                    drone_id = %drone_id,
                    sector = %sector,
                    "Drone unresponsive, sector released"
                ),
                None => warn!(drone_id = %drone_id, "Drone unresponsive, removed from fleet"),
            }
        }
    }

    async fn synchronize_start(&self) {
        let signal = {
            let mut registry = self.registry.lock();
            if !registry.epoch_started() {
                if registry.start_ready() {
                    registry.mark_epoch_started();
                    Some(StartSignal::Epoch)
                } else {
                    None
                }
            } else {
                let late = registry.late_waiters().len();
                (late > 0).then_some(StartSignal::LateJoiners(late))
            }
        };

        let Some(signal) = signal else { return };
        let token = BroadcastCommand::Start.to_string();
        match self.bus.publish(BROADCAST_CHANNEL, &token).await {
            Ok(reached) => {
                counter!("skywatch_tower_start_broadcasts_total").increment(1);
                match signal {
                    StartSignal::Epoch => info!(reached, "Every active drone on station, START broadcast"),
                    StartSignal::LateJoiners(waiting) => {
                        info!(waiting, reached, "START re-broadcast for late joiners")
                    }
                }
            }
            // Waiting drones are picked up by the next poll
            Err(e) => warn!("START broadcast failed: {}", e),
        }
    }

    async fn announce_completed_handovers(&self) {
        let completed = self.registry.lock().take_completed_handovers();
        for (successor, relieved) in completed {
            let notice = ReliefNotice {
                relieved_by: successor,
            };
            info!(drone_id = %relieved, successor = %successor, "Relief on station");
            self.publish_message(&messages::relieved_channel(relieved), &notice)
                .await;
        }
    }

    async fn retry_pending_reliefs(&self) {
        let substitutions = self.registry.lock().retry_pending(Instant::now());
        for substitution in substitutions {
            counter!("skywatch_tower_substitutions_total").increment(1);
            info!(
                sector = %substitution.sector,
                successor = %substitution.successor,
                "Pending relief dispatched"
            );
            self.dispatch(substitution).await;
        }
    }

    /// Send the resume command; undo the rebinding if nobody received it.
    async fn dispatch(&self, substitution: Substitution) {
        let channel = messages::resume_channel(substitution.successor);
        let reached = self
            .publish_message(&channel, &substitution.assignment)
            .await
            .unwrap_or(0);
        if reached == 0 {
            warn!(
                successor = %substitution.successor,
                sector = %substitution.sector,
                "Resume command not delivered, relief rescheduled"
            );
            self.registry
                .lock()
                .revert_substitution(&substitution, Instant::now());
        }
    }

    async fn publish_message<T: Serialize + Sync>(&self, channel: &str, message: &T) -> Option<usize> {
        let payload = match messages::encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel, "Failed to encode message: {}", e);
                return None;
            }
        };
        match self.bus.publish(channel, &payload).await {
            Ok(reached) => Some(reached),
            Err(e) => {
                warn!(channel, "Publish failed: {}", e);
                None
            }
        }
    }

    /// Next payload from `subscription`, or `None` once the tower shuts down.
    async fn next_payload(&self, subscription: &mut Subscription) -> Option<String> {
        loop {
            let received = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                received = subscription.recv() => received,
            };
            match received {
                Ok(payload) => return Some(payload),
                Err(BusError::Lagged(_)) => continue,
                Err(BusError::Closed) => {
                    warn!(channel = subscription.channel(), "Subscription closed, resubscribing");
                    let channel = subscription.channel().to_string();
                    *subscription = self.resubscribe(&channel).await?;
                }
                Err(e) => {
                    warn!(channel = subscription.channel(), "Receive failed: {}", e);
                    if !self.pause(self.settings.time_scale.tick()).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn resubscribe(&self, channel: &str) -> Option<Subscription> {
        loop {
            match self.bus.subscribe(channel).await {
                Ok(subscription) => return Some(subscription),
                Err(e) => {
                    warn!(channel, "Subscribe failed, retrying: {}", e);
                    if !self.pause(self.settings.time_scale.tick()).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Sleep unless the tower shuts down first. Returns false on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
