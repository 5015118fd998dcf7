// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Types
//!
//! Errors and runtime settings shared by the drone client and agent.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Drone-side error taxonomy and settings

use skywatch_core::domain::config::FleetConfigSpec;
use skywatch_core::domain::{BusError, DroneState, FlightProfile, ProtocolError, TimeScale};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: DroneState, to: DroneState },

    #[error("no init reply after {attempts} handshake attempts")]
    HandshakeTimeout { attempts: u32 },

    #[error("drone is not registered with the tower")]
    NotRegistered,

    #[error("battery depleted, drone offline")]
    Offline,

    #[error("drone terminated")]
    Terminated,
}

impl AgentError {
    /// Whether the error only reports that the drone stopped running.
    pub fn is_stop(&self) -> bool {
        matches!(self, AgentError::Offline | AgentError::Terminated)
    }
}

/// Drone runtime settings.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub profile: FlightProfile,
    pub time_scale: TimeScale,
    /// Lifetime of each published status (wall clock)
    pub status_ttl: Duration,
    /// Wait for an init reply before handshaking again (wall clock)
    pub handshake_timeout: Duration,
    pub handshake_attempts: u32,
    pub log_visits: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            profile: FlightProfile::default(),
            time_scale: TimeScale::default(),
            status_ttl: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(5),
            handshake_attempts: 5,
            log_visits: true,
        }
    }
}

impl AgentSettings {
    pub fn from_config(spec: &FleetConfigSpec) -> Self {
        Self {
            profile: spec.drone.profile.clone(),
            time_scale: spec.simulation.time_scale,
            status_ttl: spec.tower.status_ttl(),
            handshake_timeout: spec.drone.handshake_timeout(),
            handshake_attempts: spec.drone.handshake_attempts,
            log_visits: spec.drone.log_visits,
        }
    }
}
