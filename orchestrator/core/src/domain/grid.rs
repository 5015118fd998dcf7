// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sector Grid
//!
//! Partitions the square patrol area into cells and groups the cells into
//! square sectors, the exclusive unit of work handed to a drone.
//!
//! - [`SectorGrid::build`] - deterministic, row-major sector construction.
//! - [`Sector`] - cells, entry point, call-out timer and current owner.
//! - [`sector_timer`] - seconds a drone may patrol before relief is dispatched.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure function of configuration; no I/O

use crate::domain::drone::DroneId;
use crate::domain::geometry::Position;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of one flight-autonomy-paced patrol window, in seconds.
pub const PATROL_WINDOW_SECS: f64 = 1800.0;

/// Time to sweep every cell of a sector once at cruise speed, in seconds.
pub const SWEEP_CYCLE_SECS: f64 = 240.0;

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("area size must be positive, got {0}")]
    InvalidAreaSize(f64),

    #[error("cell size must be positive, got {0}")]
    InvalidCellSize(f64),

    #[error("a sector needs at least one cell per side")]
    EmptySector,

    #[error("area of {area_size} m cannot be split into whole sectors of {sector_size} m")]
    UnevenPartition { area_size: f64, sector_size: f64 },

    #[error("cruise speed must be positive, got {0}")]
    InvalidSpeed(f64),
}

/// Dimensions of the patrol area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Side of the square area in meters
    #[serde(default = "default_area_size")]
    pub area_size: f64,

    /// Side of a square cell in meters
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,

    /// Cells per sector side
    #[serde(default = "default_sector_cells")]
    pub sector_cells: usize,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            area_size: default_area_size(),
            cell_size: default_cell_size(),
            sector_cells: default_sector_cells(),
        }
    }
}

impl GridSpec {
    pub fn new(area_size: f64) -> Self {
        Self {
            area_size,
            ..Self::default()
        }
    }

    pub fn sector_size(&self) -> f64 {
        self.cell_size * self.sector_cells as f64
    }

    /// Geometric center of the area.
    pub fn center(&self) -> Position {
        Position::new(self.area_size / 2.0, self.area_size / 2.0)
    }

    /// Checks the dimensions and returns the number of sectors per side.
    pub fn validate(&self) -> Result<usize, GridError> {
        if !(self.area_size > 0.0) {
            return Err(GridError::InvalidAreaSize(self.area_size));
        }
        if !(self.cell_size > 0.0) {
            return Err(GridError::InvalidCellSize(self.cell_size));
        }
        if self.sector_cells == 0 {
            return Err(GridError::EmptySector);
        }
        let sector_size = self.sector_size();
        let per_side = (self.area_size / sector_size).round();
        if per_side < 1.0 || (per_side * sector_size - self.area_size).abs() > 1e-6 {
            return Err(GridError::UnevenPartition {
                area_size: self.area_size,
                sector_size,
            });
        }
        Ok(per_side as usize)
    }
}

/// Stable sector identifier, assigned in row-major scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorId(pub usize);

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quadrant symmetry class of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    UpperLeft,
    UpperRight,
    LowerLeft,
    LowerRight,
}

impl Region {
    /// Numeric region id (0 upper-left, 1 upper-right, 2 lower-left, 3 lower-right).
    pub fn index(self) -> usize {
        match self {
            Region::UpperLeft => 0,
            Region::UpperRight => 1,
            Region::LowerLeft => 2,
            Region::LowerRight => 3,
        }
    }

    /// Sign flips that map an upper-left offset into this quadrant.
    pub fn mirror_signs(self) -> (f64, f64) {
        match self {
            Region::UpperLeft => (1.0, 1.0),
            Region::UpperRight => (-1.0, 1.0),
            Region::LowerLeft => (1.0, -1.0),
            Region::LowerRight => (-1.0, -1.0),
        }
    }

    fn of(origin: &Position, half: f64) -> Self {
        match (origin.y < half, origin.x < half) {
            (true, true) => Region::UpperLeft,
            (true, false) => Region::UpperRight,
            (false, true) => Region::LowerLeft,
            (false, false) => Region::LowerRight,
        }
    }

    /// Local (row, column) of the cell closest to the area center.
    fn entry_cell(self, cells: usize) -> (usize, usize) {
        let last = cells - 1;
        match self {
            Region::UpperLeft => (last, last),
            Region::UpperRight => (last, 0),
            Region::LowerLeft => (0, last),
            Region::LowerRight => (0, 0),
        }
    }
}

/// A fixed square region of the area. Only its center is of interest to patrols.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

impl Cell {
    pub fn new(left: f64, right: f64, top: f64, bottom: f64) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    pub fn center(&self) -> Position {
        Position::new((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }
}

/// Exclusively owned patrol unit.
///
/// # Invariants
///
/// - At most one drone holds a sector at any time.
/// - Geometry (`cells`, `starting_point`, `timer`) never changes after the grid is built.
#[derive(Debug, Clone)]
pub struct Sector {
    id: SectorId,
    region: Region,
    origin: Position,
    cells: Vec<Cell>,
    starting_index: usize,
    starting_point: Position,
    tour: Vec<Position>,
    timer: f64,
    assigned_drone: Option<DroneId>,
}

impl Sector {
    pub fn id(&self) -> SectorId {
        self.id
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Upper-left corner of the sector.
    pub fn origin(&self) -> Position {
        self.origin
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cell centers in raw row-major order.
    pub fn waypoints(&self) -> Vec<Position> {
        self.cells.iter().map(Cell::center).collect()
    }

    /// Index of the entry cell within [`Sector::waypoints`].
    pub fn starting_index(&self) -> usize {
        self.starting_index
    }

    pub fn starting_point(&self) -> Position {
        self.starting_point
    }

    /// Planned visiting order in absolute coordinates; empty until a tour is planned.
    pub fn tour(&self) -> &[Position] {
        &self.tour
    }

    pub fn set_tour(&mut self, tour: Vec<Position>) {
        self.tour = tour;
    }

    /// Simulated seconds a drone patrols before a relief must be dispatched.
    pub fn timer(&self) -> f64 {
        self.timer
    }

    pub fn assigned_drone(&self) -> Option<DroneId> {
        self.assigned_drone
    }

    pub fn is_unassigned(&self) -> bool {
        self.assigned_drone.is_none()
    }

    pub fn assign(&mut self, drone: DroneId) {
        self.assigned_drone = Some(drone);
    }

    pub fn release(&mut self) -> Option<DroneId> {
        self.assigned_drone.take()
    }
}

/// Patrol budget for a sector whose entry is `distance` meters from the tower.
///
/// Two legs of travel are removed from the patrol window and the remainder is
/// rounded down to a whole number of sweep cycles. Non-positive budgets clamp to 0.
pub fn sector_timer(distance: f64, speed_mps: f64) -> f64 {
    let travel_time = distance / speed_mps;
    let raw = PATROL_WINDOW_SECS - 2.0 * travel_time;
    if raw <= 0.0 {
        return 0.0;
    }
    raw - raw % SWEEP_CYCLE_SECS
}

/// The partitioned patrol area.
#[derive(Debug, Clone)]
pub struct SectorGrid {
    spec: GridSpec,
    sectors: Vec<Sector>,
}

impl SectorGrid {
    /// Build the grid. Sector ids follow a row-major scan over the area.
    pub fn build(spec: &GridSpec, cruise_speed_mps: f64) -> Result<Self, GridError> {
        let sectors_per_side = spec.validate()?;
        if !(cruise_speed_mps > 0.0) {
            return Err(GridError::InvalidSpeed(cruise_speed_mps));
        }

        let n = spec.sector_cells;
        let cell = spec.cell_size;
        let sector_size = spec.sector_size();
        let half = spec.area_size / 2.0;
        let center = spec.center();

        let mut sectors = Vec::with_capacity(sectors_per_side * sectors_per_side);
        for sector_row in 0..sectors_per_side {
            for sector_col in 0..sectors_per_side {
                let origin = Position::new(
                    sector_col as f64 * sector_size,
                    sector_row as f64 * sector_size,
                );

                let mut cells = Vec::with_capacity(n * n);
                for i in 0..n {
                    for j in 0..n {
                        let left = origin.x + j as f64 * cell;
                        let top = origin.y + i as f64 * cell;
                        cells.push(Cell::new(left, left + cell, top, top + cell));
                    }
                }

                let region = Region::of(&origin, half);
                let (row, col) = region.entry_cell(n);
                let starting_index = row * n + col;
                let starting_point = cells[starting_index].center();
                let timer = sector_timer(center.distance_to(&starting_point), cruise_speed_mps);

                sectors.push(Sector {
                    id: SectorId(sectors.len()),
                    region,
                    origin,
                    cells,
                    starting_index,
                    starting_point,
                    tour: Vec::new(),
                    timer,
                    assigned_drone: None,
                });
            }
        }

        Ok(Self {
            spec: spec.clone(),
            sectors,
        })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn center(&self) -> Position {
        self.spec.center()
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn sectors_mut(&mut self) -> &mut [Sector] {
        &mut self.sectors
    }

    pub fn sector(&self, id: SectorId) -> Option<&Sector> {
        self.sectors.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn into_sectors(self) -> Vec<Sector> {
        self.sectors
    }
}

fn default_area_size() -> f64 {
    6000.0
}

fn default_cell_size() -> f64 {
    20.0
}

fn default_sector_cells() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEED: f64 = 30.0 / 3.6;

    #[test]
    fn test_timer_for_200m_leg() {
        assert!((sector_timer(200.0, SPEED) - 1680.0).abs() < 1e-9);
    }

    #[test]
    fn test_timer_is_whole_sweeps_and_clamped() {
        for distance in [0.0, 50.0, 127.3, 900.0, 3000.0] {
            let timer = sector_timer(distance, SPEED);
            assert!(timer >= 0.0);
            assert!((timer % SWEEP_CYCLE_SECS).abs() < 1e-9);
        }
        // 1800 s window minus two 7.2 km legs is negative
        assert_eq!(sector_timer(8000.0, SPEED), 0.0);
    }

    #[test]
    fn test_row_major_ids_and_regions() {
        let grid = SectorGrid::build(&GridSpec::new(800.0), SPEED).unwrap();
        assert_eq!(grid.len(), 16);
        for (index, sector) in grid.sectors().iter().enumerate() {
            assert_eq!(sector.id(), SectorId(index));
            assert_eq!(sector.waypoints().len(), 100);
            assert!(sector.tour().is_empty());
            assert!(sector.is_unassigned());
        }
        assert_eq!(grid.sectors()[1].origin(), Position::new(200.0, 0.0));
        assert_eq!(grid.sectors()[4].origin(), Position::new(0.0, 200.0));

        assert_eq!(grid.sectors()[0].region(), Region::UpperLeft);
        assert_eq!(grid.sectors()[3].region(), Region::UpperRight);
        assert_eq!(grid.sectors()[12].region(), Region::LowerLeft);
        assert_eq!(grid.sectors()[15].region(), Region::LowerRight);
        assert_eq!(grid.sectors()[15].region().index(), 3);
    }

    #[test]
    fn test_starting_point_faces_area_center() {
        let grid = SectorGrid::build(&GridSpec::new(800.0), SPEED).unwrap();
        let sectors = grid.sectors();
        // Center-adjacent sectors enter at the cell touching (400, 400)
        assert_eq!(sectors[5].starting_point(), Position::new(390.0, 390.0));
        assert_eq!(sectors[6].starting_point(), Position::new(410.0, 390.0));
        assert_eq!(sectors[9].starting_point(), Position::new(390.0, 410.0));
        assert_eq!(sectors[10].starting_point(), Position::new(410.0, 410.0));
        // Corner sectors enter at their inner corner cell
        assert_eq!(sectors[0].starting_point(), Position::new(190.0, 190.0));
        assert_eq!(sectors[0].starting_index(), 99);
        assert_eq!(sectors[3].starting_index(), 90);
        assert_eq!(sectors[12].starting_index(), 9);
        assert_eq!(sectors[15].starting_index(), 0);
        for sector in sectors {
            assert_eq!(
                sector.waypoints()[sector.starting_index()],
                sector.starting_point()
            );
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let spec = GridSpec::new(1200.0);
        let first = SectorGrid::build(&spec, SPEED).unwrap();
        let second = SectorGrid::build(&spec, SPEED).unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.sectors().iter().zip(second.sectors()) {
            assert_eq!(a.id(), b.id());
            assert_eq!(a.starting_point(), b.starting_point());
            assert_eq!(a.timer(), b.timer());
            assert_eq!(a.waypoints(), b.waypoints());
        }
    }

    #[test]
    fn test_rejects_invalid_dimensions() {
        assert_eq!(
            SectorGrid::build(&GridSpec::new(0.0), SPEED).unwrap_err(),
            GridError::InvalidAreaSize(0.0)
        );
        assert!(matches!(
            SectorGrid::build(&GridSpec::new(500.0), SPEED),
            Err(GridError::UnevenPartition { .. })
        ));
        assert!(matches!(
            SectorGrid::build(&GridSpec::new(100.0), SPEED),
            Err(GridError::UnevenPartition { .. })
        ));
        let spec = GridSpec {
            sector_cells: 0,
            ..GridSpec::new(400.0)
        };
        assert_eq!(spec.validate(), Err(GridError::EmptySector));
        assert_eq!(
            SectorGrid::build(&GridSpec::new(400.0), 0.0).unwrap_err(),
            GridError::InvalidSpeed(0.0)
        );
    }

    #[test]
    fn test_sector_shape_follows_cell_count() {
        let spec = GridSpec {
            area_size: 240.0,
            cell_size: 20.0,
            sector_cells: 6,
        };
        let grid = SectorGrid::build(&spec, SPEED).unwrap();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid.sectors()[0].waypoints().len(), 36);
        assert_eq!(grid.sectors()[0].starting_point(), Position::new(110.0, 110.0));
    }
}
