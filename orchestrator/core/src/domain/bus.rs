// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Message Bus Contract
//!
//! The transport primitives the tower and the drones rely on, independent of
//! any concrete broker:
//!
//! 1. publish/subscribe on named channels (at-most-once fan-out to current subscribers)
//! 2. keyed values with a time-to-live
//! 3. append-only logs readable by range
//! 4. push / blocking-pop queues
//!
//! All failures are reported as [`BusError`] and are treated as transient by callers.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Port implemented by infrastructure adapters

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BusError {
    #[error("Subscription closed")]
    Closed,

    #[error("No message available")]
    Empty,

    #[error("Subscriber lagged by {0} messages")]
    Lagged(u64),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Entry of an append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Zero-based position in the log
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub payload: String,
}

/// Live subscription to one channel.
pub struct Subscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, receiver: broadcast::Receiver<String>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next payload.
    pub async fn recv(&mut self) -> Result<String, BusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => BusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!(channel = %self.channel, "Subscription lagged by {} messages", n);
                BusError::Lagged(n)
            }
        })
    }

    /// Take the next payload if one is already buffered.
    pub fn try_recv(&mut self) -> Result<String, BusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => BusError::Empty,
            broadcast::error::TryRecvError::Closed => BusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!(channel = %self.channel, "Subscription lagged by {} messages", n);
                BusError::Lagged(n)
            }
        })
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Deliver `payload` to every current subscriber of `channel`.
    /// Returns the number of subscribers reached; zero is not an error.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, BusError>;

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError>;

    /// Store `value` under `key`; it disappears once `ttl` elapses without a refresh.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BusError>;

    async fn get(&self, key: &str) -> Result<Option<String>, BusError>;

    /// Remove `key`. Returns whether it was present.
    async fn delete(&self, key: &str) -> Result<bool, BusError>;

    /// Append to the end of `log`. Returns the sequence number of the new entry.
    async fn append(&self, log: &str, payload: &str) -> Result<u64, BusError>;

    /// Entries with `start <= sequence < end`; `None` reads to the end.
    async fn range(&self, log: &str, start: u64, end: Option<u64>) -> Result<Vec<LogEntry>, BusError>;

    /// Push onto the tail of `queue`. Returns the queue length after the push.
    async fn push(&self, queue: &str, value: &str) -> Result<usize, BusError>;

    /// Pop from the head of `queue`, waiting up to `timeout` (forever when `None`).
    async fn pop_blocking(&self, queue: &str, timeout: Option<Duration>) -> Result<Option<String>, BusError>;
}
