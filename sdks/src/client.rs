// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::types::AgentError;
use skywatch_core::domain::messages::{
    self, Handshake, InitMessage, ReliefRequest, StatusMessage, VisitRecord, BROADCAST_CHANNEL,
    HANDSHAKE_CHANNEL, RELIEF_CHANNEL, VISIT_LOG,
};
use skywatch_core::domain::{BusError, DroneId, MessageBus, Subscription};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Drone side of the bus protocol.
#[derive(Clone)]
pub struct DroneClient {
    bus: Arc<dyn MessageBus>,
    drone_uuid: Uuid,
    status_ttl: Duration,
}

impl DroneClient {
    /// Create a client with a fresh process-local identity.
    pub fn new(bus: Arc<dyn MessageBus>, status_ttl: Duration) -> Self {
        Self::with_uuid(bus, Uuid::new_v4(), status_ttl)
    }

    pub fn with_uuid(bus: Arc<dyn MessageBus>, drone_uuid: Uuid, status_ttl: Duration) -> Self {
        Self {
            bus,
            drone_uuid,
            status_ttl,
        }
    }

    pub fn drone_uuid(&self) -> Uuid {
        self.drone_uuid
    }

    /// Handshake with the tower and wait for its init reply.
    ///
    /// The handshake is re-published after every `timeout` without a reply,
    /// `attempts` times in total.
    pub async fn connect(&self, timeout: Duration, attempts: u32) -> Result<InitMessage, AgentError> {
        let channel = messages::init_channel(&self.drone_uuid);
        let mut replies = self.bus.subscribe(&channel).await?;
        let handshake = messages::encode(&Handshake {
            drone_uuid: self.drone_uuid,
        })?;

        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            if let Err(e) = self.bus.publish(HANDSHAKE_CHANNEL, &handshake).await {
                warn!(attempt, "Handshake publish failed: {}", e);
            }
            match tokio::time::timeout(timeout, next_init(&mut replies)).await {
                Ok(reply) => return reply,
                Err(_) => warn!(
                    drone_uuid = %self.drone_uuid,
                    attempt,
                    attempts,
                    "No init reply from tower"
                ),
            }
        }
        Err(AgentError::HandshakeTimeout { attempts })
    }

    pub async fn publish_status(&self, status: &StatusMessage) -> Result<(), AgentError> {
        let payload = messages::encode(status)?;
        self.bus
            .set_with_ttl(&messages::status_key(status.drone_id), &payload, self.status_ttl)
            .await?;
        Ok(())
    }

    pub async fn request_relief(&self, drone_id: DroneId) -> Result<usize, AgentError> {
        let payload = messages::encode(&ReliefRequest { drone_id })?;
        Ok(self.bus.publish(RELIEF_CHANNEL, &payload).await?)
    }

    pub async fn log_visit(&self, visit: &VisitRecord) -> Result<u64, AgentError> {
        let payload = messages::encode(visit)?;
        Ok(self.bus.append(VISIT_LOG, &payload).await?)
    }

    pub async fn subscribe_broadcast(&self) -> Result<Subscription, BusError> {
        self.bus.subscribe(BROADCAST_CHANNEL).await
    }

    pub async fn subscribe_resume(&self, drone_id: DroneId) -> Result<Subscription, BusError> {
        self.bus.subscribe(&messages::resume_channel(drone_id)).await
    }

    pub async fn subscribe_relieved(&self, drone_id: DroneId) -> Result<Subscription, BusError> {
        self.bus.subscribe(&messages::relieved_channel(drone_id)).await
    }

    pub async fn resubscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        self.bus.subscribe(channel).await
    }

    /// Pop the next point-to-point command, waiting up to `timeout` (forever if `None`).
    pub async fn next_command(
        &self,
        drone_id: DroneId,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, AgentError> {
        Ok(self
            .bus
            .pop_blocking(&messages::command_queue(drone_id), timeout)
            .await?)
    }
}

async fn next_init(replies: &mut Subscription) -> Result<InitMessage, AgentError> {
    loop {
        match replies.recv().await {
            Ok(payload) => match messages::decode::<InitMessage>(replies.channel(), &payload) {
                Ok(init) => return Ok(init),
                Err(e) => warn!("Dropping init reply: {}", e),
            },
            Err(BusError::Lagged(skipped)) => debug!(skipped, "Init channel lagged"),
            Err(e) => return Err(e.into()),
        }
    }
}
