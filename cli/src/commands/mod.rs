// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Skywatch CLI

pub mod config;
pub mod grid;
pub mod simulate;

pub use self::config::ConfigCommand;
pub use self::grid::GridArgs;
pub use self::simulate::SimulateArgs;

use anyhow::{Context, Result};
use skywatch_core::domain::config::FleetConfigManifest;
use std::path::PathBuf;

/// Load (environment overrides included) and validate the fleet configuration.
pub(crate) fn load_manifest(config_path: Option<PathBuf>) -> Result<FleetConfigManifest> {
    let manifest =
        FleetConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    manifest
        .validate()
        .context("Configuration validation failed")?;
    Ok(manifest)
}
