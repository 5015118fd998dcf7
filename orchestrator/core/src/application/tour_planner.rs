// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tour Planner
//!
//! Installs a patrol tour on every sector of a grid with a single route solve.
//!
//! All sectors share the same cell layout, so the tour of the upper-left
//! reference sector is expressed as offsets from its entry point and mirrored
//! into the other quadrants. The entry point of every sector faces the area
//! center, which keeps the mirrored offsets inside each sector.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Startup-time planning, runs before the tower accepts drones

use crate::domain::geometry::Position;
use crate::domain::grid::{Region, SectorGrid};
use crate::domain::route::{RouteError, RouteSolver};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct TourPlanner {
    solver: Arc<dyn RouteSolver>,
    budget: Duration,
}

impl TourPlanner {
    pub fn new(solver: Arc<dyn RouteSolver>, budget: Duration) -> Self {
        Self { solver, budget }
    }

    /// Solve the reference sector and install mirrored tours on every sector.
    ///
    /// Returns the number of sectors that received a tour. On failure every
    /// tour is left empty.
    pub fn plan(&self, grid: &mut SectorGrid) -> Result<usize, RouteError> {
        let reference = match grid
            .sectors()
            .iter()
            .find(|sector| sector.region() == Region::UpperLeft)
        {
            Some(sector) => sector,
            None => return Err(RouteError::EmptyInput),
        };

        let entry = reference.starting_point();
        let solved = self
            .solver
            .solve(&reference.waypoints(), reference.starting_index(), self.budget)
            .inspect_err(|e| warn!(sector = %reference.id(), "Route solver failed: {}", e))?;

        let offsets = reference_offsets(&solved, entry);

        for sector in grid.sectors_mut() {
            let (sign_x, sign_y) = sector.region().mirror_signs();
            let start = sector.starting_point();
            let tour = offsets
                .iter()
                .map(|offset| start + offset.mirrored(sign_x, sign_y))
                .collect();
            sector.set_tour(tour);
        }

        info!(
            sectors = grid.len(),
            waypoints = offsets.len(),
            "Installed patrol tours"
        );
        Ok(grid.len())
    }
}

/// Tour offsets from `entry`, without the closing return to the entry point.
fn reference_offsets(solved: &[Position], entry: Position) -> Vec<Position> {
    let mut points = solved;
    if points.len() > 1 && points.first() == points.last() {
        points = &points[..points.len() - 1];
    }
    points.iter().map(|&point| point - entry).collect()
}
