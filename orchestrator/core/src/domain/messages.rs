// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Wire Protocol
//!
//! Every channel carries exactly one message type with a fixed schema. Payloads
//! are JSON objects that reject unknown fields, except the broadcast channel
//! which carries a bare command token.
//!
//! | Channel / key | Kind | Payload |
//! |---------------|------|---------|
//! | `drone:handshake` | pub/sub | [`Handshake`] |
//! | `drone:{uuid}:init` | pub/sub | [`InitMessage`] |
//! | `drone:{id}:status` | key with TTL | [`StatusMessage`] |
//! | `drone:broadcast` | pub/sub | [`BroadcastCommand`] |
//! | `drone:relief` | pub/sub | [`ReliefRequest`] |
//! | `drone:{id}:resume` | pub/sub | [`SectorAssignment`] |
//! | `drone:{id}:relieved` | pub/sub | [`ReliefNotice`] |
//! | `drone:{id}:commands` | queue | opaque command string |
//! | `drone:visits` | append log | [`VisitRecord`] |

use crate::domain::drone::{DroneId, DroneState};
use crate::domain::geometry::Position;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const HANDSHAKE_CHANNEL: &str = "drone:handshake";
pub const BROADCAST_CHANNEL: &str = "drone:broadcast";
pub const RELIEF_CHANNEL: &str = "drone:relief";
pub const VISIT_LOG: &str = "drone:visits";

pub fn init_channel(drone_uuid: &Uuid) -> String {
    format!("drone:{drone_uuid}:init")
}

pub fn status_key(drone_id: DroneId) -> String {
    format!("drone:{drone_id}:status")
}

pub fn resume_channel(drone_id: DroneId) -> String {
    format!("drone:{drone_id}:resume")
}

pub fn relieved_channel(drone_id: DroneId) -> String {
    format!("drone:{drone_id}:relieved")
}

pub fn command_queue(drone_id: DroneId) -> String {
    format!("drone:{drone_id}:commands")
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed payload on {channel}: {source}")]
    Malformed {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unknown command token: {0:?}")]
    UnknownCommand(String),
}

/// Decode a JSON payload received on `channel`.
pub fn decode<T: DeserializeOwned>(channel: &str, payload: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(payload).map_err(|source| ProtocolError::Malformed {
        channel: channel.to_string(),
        source,
    })
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// First message of a drone: announces its process-local identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Handshake {
    pub drone_uuid: Uuid,
}

/// Sector parameters a drone needs to patrol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectorAssignment {
    pub starting_point: Position,
    pub timer: f64,
    pub tour: Vec<Position>,
}

/// Tower reply to a handshake. The sector fields are absent when every
/// sector is already owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitMessage {
    pub drone_id: DroneId,
    pub tower_position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_point: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour: Option<Vec<Position>>,
}

impl InitMessage {
    pub fn new(
        drone_id: DroneId,
        tower_position: Position,
        assignment: Option<SectorAssignment>,
    ) -> Self {
        match assignment {
            Some(assignment) => Self {
                drone_id,
                tower_position,
                starting_point: Some(assignment.starting_point),
                timer: Some(assignment.timer),
                tour: Some(assignment.tour),
            },
            None => Self {
                drone_id,
                tower_position,
                starting_point: None,
                timer: None,
                tour: None,
            },
        }
    }

    /// The sector assignment, when all three sector fields are present.
    pub fn assignment(&self) -> Option<SectorAssignment> {
        match (&self.starting_point, self.timer, &self.tour) {
            (Some(starting_point), Some(timer), Some(tour)) => Some(SectorAssignment {
                starting_point: *starting_point,
                timer,
                tour: tour.clone(),
            }),
            _ => None,
        }
    }
}

/// Heartbeat published under the drone's status key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusMessage {
    pub drone_id: DroneId,
    pub position: Position,
    pub battery_level: f64,
    pub state: DroneState,
    pub timestamp: DateTime<Utc>,
}

/// Fleet-wide command token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastCommand {
    Start,
}

impl BroadcastCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastCommand::Start => "START",
        }
    }
}

impl fmt::Display for BroadcastCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BroadcastCommand {
    type Err = ProtocolError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim() {
            "START" => Ok(BroadcastCommand::Start),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// Sent once by a drone nearing the end of its patrol budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReliefRequest {
    pub drone_id: DroneId,
}

/// Tells a relieved drone that its successor is on station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReliefNotice {
    pub relieved_by: DroneId,
}

/// One patrolled waypoint, appended to the visit log for coverage analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisitRecord {
    pub drone_id: DroneId,
    pub position: Position,
    pub battery_level: f64,
    pub timestamp: DateTime<Utc>,
}
