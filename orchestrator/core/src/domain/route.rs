// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Route solving capability used to order the waypoints of a sector.

use crate::domain::geometry::Position;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("no waypoints to route")]
    EmptyInput,

    #[error("start index {start} out of range for {len} waypoints")]
    StartOutOfRange { start: usize, len: usize },

    #[error("no route found within {0:?}")]
    BudgetExhausted(Duration),
}

/// Orders waypoints into a short closed tour.
pub trait RouteSolver: Send + Sync {
    /// Returns every waypoint exactly once, beginning at `waypoints[start]`,
    /// followed by `waypoints[start]` again to close the loop.
    fn solve(
        &self,
        waypoints: &[Position],
        start: usize,
        budget: Duration,
    ) -> Result<Vec<Position>, RouteError>;
}

/// Total length of the polyline through `points`.
pub fn path_length(points: &[Position]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].distance_to(&pair[1]))
        .sum()
}
