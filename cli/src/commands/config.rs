// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use skywatch_core::domain::config::FleetConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./skywatch-config.yaml)
        #[arg(short, long, default_value = "./skywatch-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = FleetConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SKYWATCH_CONFIG_PATH: {}",
            std::env::var("SKYWATCH_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./skywatch-config.yaml");
        println!("  4. ~/.skywatch/config.yaml");
        println!("  5. /etc/skywatch/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Area:".bold());
    println!("  Size: {} m", spec.area.area_size);
    println!(
        "  Cells: {} m, {}x{} per sector",
        spec.area.cell_size, spec.area.sector_cells, spec.area.sector_cells
    );
    println!();

    let profile = &spec.drone.profile;
    println!("{}", "Drone:".bold());
    println!("  Speed: {} km/h", profile.speed_kmh);
    println!("  Autonomy: {} min", profile.flight_autonomy_minutes);
    println!(
        "  Recharge: {}-{} h",
        profile.recharge_time_min_hours, profile.recharge_time_max_hours
    );
    println!(
        "  Handshake: {} attempts, {} s apart",
        spec.drone.handshake_attempts, spec.drone.handshake_timeout_secs
    );
    println!();

    println!("{}", "Tower:".bold());
    println!("  Position: {}", spec.tower_position());
    println!("  Status TTL: {} s", spec.tower.status_ttl_secs);
    println!("  Grace period: {} s", spec.tower.grace_period_secs);
    println!("  Poll interval: {} simulated s", spec.tower.poll_interval_secs);
    println!("  Dedupe handshakes: {}", spec.tower.dedupe_handshakes);
    println!(
        "  Relief retry: {}-{} simulated s",
        spec.tower.relief_retry.initial_backoff_secs, spec.tower.relief_retry.max_backoff_secs
    );
    println!();

    println!("{}", "Simulation:".bold());
    println!("  Time scale: x{}", spec.simulation.time_scale.factor());
    println!("  Drones: {}", spec.simulation.drone_count);
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = FleetConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    FleetConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
