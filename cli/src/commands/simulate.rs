// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `skywatch simulate` - fly a whole fleet in-process

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use skywatch_core::domain::TimeScale;

use super::load_manifest;
use crate::embedded::{EmbeddedFleet, SimulationReport};

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of drones (default: simulation.drone_count)
    #[arg(short, long)]
    drones: Option<usize>,

    /// Simulated seconds to fly
    #[arg(long, default_value_t = 3600.0)]
    duration: f64,

    /// Simulation speed-up (overrides simulation.time_scale)
    #[arg(long)]
    time_scale: Option<f64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn handle_command(args: SimulateArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut manifest = load_manifest(config_path)?;
    if let Some(factor) = args.time_scale {
        manifest.spec.simulation.time_scale =
            TimeScale::new(factor).context("Invalid --time-scale")?;
    }
    let drones = args.drones.unwrap_or(manifest.spec.simulation.drone_count);
    let duration = args.duration.max(0.0);

    let mut fleet = EmbeddedFleet::start(manifest.spec).await?;
    fleet.launch(drones);

    let progress = ProgressBar::new(duration.ceil() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} simulated s")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );
    fleet
        .fly_for(duration, |elapsed| progress.set_position(elapsed as u64))
        .await;
    progress.finish_and_clear();

    let report = fleet.report(duration).await;
    fleet.shutdown().await;
    let report = report?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!(
        "{}",
        format!("Simulated {:.0} s", report.simulated_secs).bold()
    );
    println!(
        "  Sectors: {} ({} assigned)",
        report.sectors,
        report.assignments.len()
    );
    let epoch = if report.epoch_started {
        "started".green()
    } else {
        "not started".yellow()
    };
    println!("  Patrol epoch: {}", epoch);
    println!("  Visits logged: {}", report.visits_logged);
    if !report.pending_reliefs.is_empty() {
        let pending: Vec<String> = report.pending_reliefs.iter().map(|s| s.to_string()).collect();
        println!("  Pending reliefs: {}", pending.join(", ").yellow());
    }
    println!();

    println!("{}", "Drones:".bold());
    for drone in &report.drones {
        let id = drone
            .drone_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let sector = drone
            .drone_id
            .and_then(|id| report.assignments.iter().find(|(_, d)| *d == id))
            .map(|(sector, _)| sector.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>4}  {:<11} {:>6.1}%  sector {:<4} at {}",
            id,
            drone.state.to_string(),
            drone.battery_level,
            sector,
            drone.position
        );
    }
}
