// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Simulated time.
//!
//! Every simulated duration is divided by the time scale before it is slept
//! in wall time. A scale of 10 runs the fleet ten times faster than real time.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Error, PartialEq)]
#[error("time scale must be a positive finite number, got {0}")]
pub struct InvalidTimeScale(pub f64);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct TimeScale(f64);

impl TimeScale {
    pub const REAL_TIME: TimeScale = TimeScale(1.0);

    pub fn new(factor: f64) -> Result<Self, InvalidTimeScale> {
        if factor.is_finite() && factor > 0.0 {
            Ok(Self(factor))
        } else {
            Err(InvalidTimeScale(factor))
        }
    }

    pub fn factor(&self) -> f64 {
        self.0
    }

    /// Wall-clock duration of `sim_secs` simulated seconds.
    pub fn to_wall(&self, sim_secs: f64) -> Duration {
        Duration::from_secs_f64((sim_secs / self.0).max(0.0))
    }

    /// Simulated seconds elapsed during `wall`.
    pub fn to_sim(&self, wall: Duration) -> f64 {
        wall.as_secs_f64() * self.0
    }

    /// One simulated second in wall time, never shorter than a millisecond.
    pub fn tick(&self) -> Duration {
        self.to_wall(1.0).max(MIN_TICK)
    }
}

impl Default for TimeScale {
    fn default() -> Self {
        Self::REAL_TIME
    }
}

impl TryFrom<f64> for TimeScale {
    type Error = InvalidTimeScale;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TimeScale> for f64 {
    fn from(scale: TimeScale) -> f64 {
        scale.0
    }
}
