// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// In-Memory Message Bus
//
// Single-process implementation of the MessageBus contract:
// - pub/sub on tokio broadcast channels (one per channel name)
// - TTL values measured on the tokio clock, so paused-time tests expire them
// - append-only logs and notify-driven blocking queues
//
// Everything is lost when the process exits. A broker-backed adapter can
// replace it without touching the tower or the drones.

use crate::domain::bus::{BusError, LogEntry, MessageBus, Subscription};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

struct StoredValue {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct QueueSlot {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

struct BusState {
    capacity: usize,
    channels: DashMap<String, broadcast::Sender<String>>,
    values: DashMap<String, StoredValue>,
    logs: Mutex<HashMap<String, Vec<LogEntry>>>,
    queues: DashMap<String, Arc<QueueSlot>>,
}

/// Message bus living inside one process. Cloning shares the same state.
#[derive(Clone)]
pub struct InMemoryMessageBus {
    state: Arc<BusState>,
}

impl InMemoryMessageBus {
    /// Create a bus buffering up to `capacity` messages per channel
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(BusState {
                capacity: capacity.max(1),
                channels: DashMap::new(),
                values: DashMap::new(),
                logs: Mutex::new(HashMap::new()),
                queues: DashMap::new(),
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Number of live subscriptions on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.state
            .channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop every expired value. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.state.values.len();
        self.state.values.retain(|_, stored| stored.expires_at > now);
        before.saturating_sub(self.state.values.len())
    }

    fn queue(&self, name: &str) -> Arc<QueueSlot> {
        self.state
            .queues
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, BusError> {
        debug!(channel, "Publishing message");

        // send() fails only when nobody is subscribed; the message is dropped
        let receivers = match self.state.channels.get(channel) {
            Some(sender) => sender.send(payload.to_string()).unwrap_or(0),
            None => 0,
        };

        if receivers == 0 {
            debug!(channel, "No subscribers listening on channel");
        }
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let capacity = self.state.capacity;
        let receiver = self
            .state
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();
        Ok(Subscription::new(channel, receiver))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BusError> {
        self.state.values.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BusError> {
        let now = Instant::now();
        let expired = match self.state.values.get(key) {
            None => return Ok(None),
            Some(stored) if stored.expires_at > now => return Ok(Some(stored.value.clone())),
            Some(_) => true,
        };
        if expired {
            self.state
                .values
                .remove_if(key, |_, stored| stored.expires_at <= now);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<bool, BusError> {
        let now = Instant::now();
        Ok(self
            .state
            .values
            .remove(key)
            .map(|(_, stored)| stored.expires_at > now)
            .unwrap_or(false))
    }

    async fn append(&self, log: &str, payload: &str) -> Result<u64, BusError> {
        let mut logs = self.state.logs.lock();
        let entries = logs.entry(log.to_string()).or_default();
        let sequence = entries.len() as u64;
        entries.push(LogEntry {
            sequence,
            recorded_at: Utc::now(),
            payload: payload.to_string(),
        });
        Ok(sequence)
    }

    async fn range(&self, log: &str, start: u64, end: Option<u64>) -> Result<Vec<LogEntry>, BusError> {
        let logs = self.state.logs.lock();
        let Some(entries) = logs.get(log) else {
            return Ok(Vec::new());
        };
        let len = entries.len() as u64;
        let end = end.unwrap_or(len).min(len);
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(entries[start as usize..end as usize].to_vec())
    }

    async fn push(&self, queue: &str, value: &str) -> Result<usize, BusError> {
        let slot = self.queue(queue);
        let len = {
            let mut items = slot.items.lock();
            items.push_back(value.to_string());
            items.len()
        };
        slot.notify.notify_one();
        Ok(len)
    }

    async fn pop_blocking(&self, queue: &str, timeout: Option<Duration>) -> Result<Option<String>, BusError> {
        let slot = self.queue(queue);
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // Register interest before checking so a concurrent push is not missed
            let notified = slot.notify.notified();
            let popped = slot.items.lock().pop_front();
            if popped.is_some() {
                return Ok(popped);
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        let last_chance = slot.items.lock().pop_front();
                        return Ok(last_chance);
                    }
                }
                None => notified.await,
            }
        }
    }
}
