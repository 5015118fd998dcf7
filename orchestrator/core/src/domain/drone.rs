// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Drone identity, lifecycle states and flight characteristics.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Shared vocabulary between the tower and drone agents

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer identity allocated by the tower at registration. Never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DroneId(pub u64);

impl fmt::Display for DroneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a drone agent.
///
/// ```text
/// Ready -> Arriving -> Waiting -> Monitoring -> Returning -> Charging -> Ready
///                  \-> Monitoring   (reassignment, no synchronized wait)
/// any non-Offline -> Offline        (battery depleted, terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DroneState {
    Ready,
    Charging,
    Waiting,
    Arriving,
    Monitoring,
    Returning,
    Offline,
}

impl DroneState {
    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: DroneState) -> bool {
        use DroneState::*;
        match (self, next) {
            (Offline, _) => false,
            (_, Offline) => true,
            (Ready, Arriving)
            | (Arriving, Waiting)
            | (Arriving, Monitoring)
            | (Waiting, Monitoring)
            | (Monitoring, Returning)
            | (Returning, Charging)
            | (Charging, Ready) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == DroneState::Offline
    }

    /// States in which the battery updater drains the battery.
    pub fn drains_battery(self) -> bool {
        !matches!(
            self,
            DroneState::Ready | DroneState::Charging | DroneState::Offline
        )
    }
}

impl fmt::Display for DroneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DroneState::Ready => "Ready",
            DroneState::Charging => "Charging",
            DroneState::Waiting => "Waiting",
            DroneState::Arriving => "Arriving",
            DroneState::Monitoring => "Monitoring",
            DroneState::Returning => "Returning",
            DroneState::Offline => "Offline",
        };
        f.write_str(name)
    }
}

/// Physical characteristics shared by every drone in the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightProfile {
    /// Cruise speed in km/h
    #[serde(default = "default_speed_kmh")]
    pub speed_kmh: f64,

    /// Flight time on a full battery, in minutes
    #[serde(default = "default_flight_autonomy_minutes")]
    pub flight_autonomy_minutes: f64,

    /// Lower bound of the randomized recharge duration, in hours
    #[serde(default = "default_recharge_time_min_hours")]
    pub recharge_time_min_hours: f64,

    /// Upper bound of the randomized recharge duration, in hours
    #[serde(default = "default_recharge_time_max_hours")]
    pub recharge_time_max_hours: f64,

    /// Camera footprint radius in meters
    #[serde(default = "default_visibility_range_m")]
    pub visibility_range_m: f64,
}

impl Default for FlightProfile {
    fn default() -> Self {
        Self {
            speed_kmh: default_speed_kmh(),
            flight_autonomy_minutes: default_flight_autonomy_minutes(),
            recharge_time_min_hours: default_recharge_time_min_hours(),
            recharge_time_max_hours: default_recharge_time_max_hours(),
            visibility_range_m: default_visibility_range_m(),
        }
    }
}

impl FlightProfile {
    pub fn speed_mps(&self) -> f64 {
        self.speed_kmh / 3.6
    }

    pub fn flight_autonomy_secs(&self) -> f64 {
        self.flight_autonomy_minutes * 60.0
    }

    /// Battery percentage drained per simulated second of flight.
    pub fn consumption_rate(&self) -> f64 {
        100.0 / self.flight_autonomy_secs()
    }

    /// Simulated seconds needed to cover `distance` meters at cruise speed.
    pub fn travel_time(&self, distance: f64) -> f64 {
        distance / self.speed_mps()
    }

    /// Share of a full battery, in percent, spent flying for `travel_time` seconds.
    pub fn travel_percent(&self, travel_time: f64) -> f64 {
        travel_time / self.flight_autonomy_secs() * 100.0
    }

    /// Battery needed for one outbound plus one return leg.
    pub fn critical_battery_level(&self, travel_time: f64) -> f64 {
        2.0 * self.travel_percent(travel_time)
    }

    /// Margin added on top of the critical level; 14% is roughly one 240 s sweep.
    pub fn battery_deviation(&self, travel_time: f64) -> f64 {
        (100.0 - 2.0 * self.travel_percent(travel_time)) % 14.0
    }

    /// Level at or below which a drone is considered low on battery.
    pub fn low_battery_threshold(&self, travel_time: f64) -> f64 {
        self.critical_battery_level(travel_time) + self.battery_deviation(travel_time)
    }
}

fn default_speed_kmh() -> f64 {
    30.0
}

fn default_flight_autonomy_minutes() -> f64 {
    30.0
}

fn default_recharge_time_min_hours() -> f64 {
    2.0
}

fn default_recharge_time_max_hours() -> f64 {
    3.0
}

fn default_visibility_range_m() -> f64 {
    10.0
}
