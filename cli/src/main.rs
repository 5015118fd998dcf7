// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Skywatch CLI
//!
//! The `skywatch` binary runs a patrol fleet in-process and manages its
//! configuration.
//!
//! ## Commands
//!
//! - `skywatch simulate` - Fly a tower and its drones over the in-memory bus
//! - `skywatch grid` - Print the sector table
//! - `skywatch config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use skywatch::commands::{self, ConfigCommand, GridArgs, SimulateArgs};
use skywatch_core::domain::config::FleetConfigManifest;

/// Skywatch - sector patrol with a self-relieving drone fleet
#[derive(Parser)]
#[command(name = "skywatch")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SKYWATCH_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "SKYWATCH_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a fleet simulation
    #[command(name = "simulate")]
    Simulate(SimulateArgs),

    /// Print the sector grid
    #[command(name = "grid")]
    Grid(GridArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // An unreadable config is reported by the command itself
    let logging = FleetConfigManifest::load_or_default(cli.config.clone())
        .map(|manifest| manifest.spec.logging())
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or(logging.level);
    init_logging(&level, &logging.format)?;

    match cli.command {
        Some(Commands::Simulate(args)) => commands::simulate::handle_command(args, cli.config).await,
        Some(Commands::Grid(args)) => commands::grid::handle_command(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
