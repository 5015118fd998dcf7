// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `skywatch grid` - print the sector table

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use skywatch_core::application::TourPlanner;
use skywatch_core::domain::grid::SWEEP_CYCLE_SECS;
use skywatch_core::domain::{path_length, SectorGrid};
use skywatch_core::infrastructure::NearestNeighbourSolver;

use super::load_manifest;

#[derive(Args)]
pub struct GridArgs {
    /// Plan patrol tours and show their length
    #[arg(long)]
    tours: bool,
}

pub async fn handle_command(args: GridArgs, config_path: Option<PathBuf>) -> Result<()> {
    let spec = load_manifest(config_path)?.spec;
    let mut grid = SectorGrid::build(&spec.area, spec.drone.profile.speed_mps())
        .context("Failed to build sector grid")?;

    if args.tours {
        TourPlanner::new(Arc::new(NearestNeighbourSolver::new()), spec.solver.time_budget())
            .plan(&mut grid)
            .context("Tour planning failed")?;
    }

    println!(
        "{}",
        format!(
            "{} sectors over a {} m area, tower at {}",
            grid.len(),
            spec.area.area_size,
            spec.tower_position()
        )
        .bold()
    );
    println!(
        "  {:>4}  {:<11} {:<18} {:<18} {:>7} {:>6} {:>8}",
        "id", "region", "origin", "entry", "timer", "sweeps", "tour m"
    );
    for sector in grid.sectors() {
        let tour = if sector.tour().is_empty() {
            "-".to_string()
        } else {
            let mut closed = sector.tour().to_vec();
            closed.push(sector.starting_point());
            format!("{:.0}", path_length(&closed))
        };
        println!(
            "  {:>4}  {:<11} {:<18} {:<18} {:>7.0} {:>6} {:>8}",
            sector.id().to_string(),
            format!("{:?}", sector.region()),
            sector.origin().to_string(),
            sector.starting_point().to_string(),
            sector.timer(),
            (sector.timer() / SWEEP_CYCLE_SECS).floor(),
            tour
        );
    }
    Ok(())
}
