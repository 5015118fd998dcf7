// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Linear battery drain and recharge model.
//!
//! Time is always expressed in simulated seconds; one tick is one simulated
//! second. The level is kept within `[0, MAX_BATTERY]` by every operation.

use crate::domain::drone::FlightProfile;
use rand::Rng;

pub const MAX_BATTERY: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryModel {
    level: f64,
    consumption_rate: f64,
    consumption_ratio: f64,
    recharge_rate: f64,
}

impl BatteryModel {
    /// Full battery draining `consumption_rate` percent per simulated second.
    pub fn new(consumption_rate: f64) -> Self {
        Self {
            level: MAX_BATTERY,
            consumption_rate,
            consumption_ratio: 1.0,
            recharge_rate: 0.0,
        }
    }

    pub fn for_profile(profile: &FlightProfile) -> Self {
        Self::new(profile.consumption_rate())
    }

    pub fn with_level(mut self, level: f64) -> Self {
        self.level = level.clamp(0.0, MAX_BATTERY);
        self
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn consumption_ratio(&self) -> f64 {
        self.consumption_ratio
    }

    /// Scales the drain; 0 while holding position, 1 in flight.
    pub fn set_consumption_ratio(&mut self, ratio: f64) {
        self.consumption_ratio = ratio.max(0.0);
    }

    /// Drain for `dt` simulated seconds. Returns the new level.
    pub fn consume(&mut self, dt: f64) -> f64 {
        let drained = self.consumption_rate * self.consumption_ratio * dt.max(0.0);
        self.level = (self.level - drained).max(0.0);
        self.level
    }

    pub fn is_depleted(&self) -> bool {
        self.level <= 0.0
    }

    pub fn is_full(&self) -> bool {
        self.level >= MAX_BATTERY
    }

    /// Fix the recharge rate so the battery fills in `duration_secs` simulated seconds.
    pub fn begin_recharge(&mut self, duration_secs: f64) -> f64 {
        let missing = MAX_BATTERY - self.level;
        self.recharge_rate = if duration_secs > 0.0 {
            missing / duration_secs
        } else {
            missing
        };
        self.recharge_rate
    }

    /// Charge for `dt` simulated seconds. Returns the new level.
    pub fn recharge(&mut self, dt: f64) -> f64 {
        self.level = (self.level + self.recharge_rate * dt.max(0.0)).min(MAX_BATTERY);
        self.level
    }
}

/// Random recharge duration, in simulated seconds, within the profile's bounds.
pub fn random_recharge_secs<R: Rng>(profile: &FlightProfile, rng: &mut R) -> f64 {
    let min = profile.recharge_time_min_hours;
    let max = profile.recharge_time_max_hours;
    let hours = if max > min {
        rng.random_range(min..=max)
    } else {
        min
    };
    hours * 3600.0
}
