// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Planar geometry for the patrol area.
//!
//! All coordinates are meters in the area frame: the origin is the upper-left
//! corner, `x` grows to the right and `y` grows downwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Immutable point (or offset) in the patrol area, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Point `ratio` of the way from `self` to `to`. `ratio` is clamped to `[0, 1]`.
    pub fn lerp(&self, to: &Position, ratio: f64) -> Position {
        let ratio = ratio.clamp(0.0, 1.0);
        Position {
            x: self.x + (to.x - self.x) * ratio,
            y: self.y + (to.y - self.y) * ratio,
        }
    }

    /// Component-wise sign flip, used to mirror tour offsets across quadrants.
    pub fn mirrored(&self, sign_x: f64, sign_y: f64) -> Position {
        Position {
            x: self.x * sign_x,
            y: self.y * sign_y,
        }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}
