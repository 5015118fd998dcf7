// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Built-in route solver.
//!
//! Nearest-neighbour construction followed by 2-opt improvement until no
//! improving move remains or the time budget runs out. Deterministic for a
//! given input: ties go to the lowest waypoint index.

use crate::domain::geometry::Position;
use crate::domain::route::{RouteError, RouteSolver};
use std::time::{Duration, Instant};
use tracing::debug;

const IMPROVEMENT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbourSolver;

impl NearestNeighbourSolver {
    pub fn new() -> Self {
        Self
    }
}

impl RouteSolver for NearestNeighbourSolver {
    fn solve(
        &self,
        waypoints: &[Position],
        start: usize,
        budget: Duration,
    ) -> Result<Vec<Position>, RouteError> {
        if waypoints.is_empty() {
            return Err(RouteError::EmptyInput);
        }
        if start >= waypoints.len() {
            return Err(RouteError::StartOutOfRange {
                start,
                len: waypoints.len(),
            });
        }
        if budget.is_zero() {
            return Err(RouteError::BudgetExhausted(budget));
        }

        let deadline = Instant::now() + budget;
        let mut order = nearest_neighbour(waypoints, start);
        let passes = two_opt(waypoints, &mut order, deadline);
        debug!(waypoints = waypoints.len(), passes, "Route solved");

        let mut tour: Vec<Position> = order.iter().map(|&i| waypoints[i]).collect();
        tour.push(waypoints[start]);
        Ok(tour)
    }
}

fn nearest_neighbour(waypoints: &[Position], start: usize) -> Vec<usize> {
    let n = waypoints.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut current = start;
    visited[current] = true;
    order.push(current);

    while order.len() < n {
        let mut best: Option<(usize, f64)> = None;
        for (candidate, seen) in visited.iter().enumerate() {
            if *seen {
                continue;
            }
            let distance = waypoints[current].distance_to(&waypoints[candidate]);
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((candidate, distance));
            }
        }
        let Some((next, _)) = best else { break };
        visited[next] = true;
        order.push(next);
        current = next;
    }
    order
}

/// Improves the closed tour in place, keeping `order[0]` fixed. Returns the passes run.
fn two_opt(waypoints: &[Position], order: &mut [usize], deadline: Instant) -> usize {
    let n = order.len();
    if n < 4 {
        return 0;
    }
    let dist = |a: usize, b: usize| waypoints[a].distance_to(&waypoints[b]);

    let mut passes = 0;
    let mut improved = true;
    while improved {
        improved = false;
        passes += 1;
        for i in 1..n - 1 {
            if Instant::now() >= deadline {
                return passes;
            }
            for j in i + 1..n {
                let a = order[i - 1];
                let b = order[i];
                let c = order[j];
                let d = order[(j + 1) % n];
                let delta = dist(a, c) + dist(b, d) - dist(a, b) - dist(c, d);
                if delta < -IMPROVEMENT_EPSILON {
                    order[i..=j].reverse();
                    improved = true;
                }
            }
        }
    }
    passes
}
