// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fleet Configuration Types
//
// Defines the configuration schema shared by the tower and drone agents:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Patrol area dimensions and drone flight profile
// - Tower liveness and relief settings
// - Simulation speed and observability settings

use crate::domain::drone::FlightProfile;
use crate::domain::geometry::Position;
use crate::domain::grid::GridSpec;
use crate::domain::time_scale::TimeScale;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "skywatch/v1";
pub const KIND: &str = "FleetConfig";

const CONFIG_PATH_ENV: &str = "SKYWATCH_CONFIG_PATH";
const TIME_SCALE_ENV: &str = "SKYWATCH_TIME_SCALE";
const DEDUPE_HANDSHAKES_ENV: &str = "SKYWATCH_DEDUPE_HANDSHAKES";
const LOCAL_CONFIG_FILE: &str = "skywatch-config.yaml";

/// Top-level Kubernetes-style fleet configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfigManifest {
    /// API version (must be "skywatch/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "FleetConfig")
    pub kind: String,

    /// Fleet metadata (name, labels, version)
    pub metadata: ManifestMetadata,

    /// Fleet configuration specification
    #[serde(default)]
    pub spec: FleetConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable fleet name
    pub name: String,

    /// Optional: Configuration version for tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Optional: Labels for categorization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Fleet configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfigSpec {
    /// Patrol area dimensions
    #[serde(default)]
    pub area: GridSpec,

    /// Drone flight profile and agent behaviour
    #[serde(default)]
    pub drone: DroneConfig,

    /// Tower settings
    #[serde(default)]
    pub tower: TowerConfig,

    /// Simulation speed and fleet size
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Route solver settings
    #[serde(default)]
    pub solver: SolverConfig,

    /// In-memory bus settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Observability settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroneConfig {
    #[serde(flatten)]
    pub profile: FlightProfile,

    /// Seconds (wall clock) to wait for the tower's reply before handshaking again
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Handshakes sent before giving up
    #[serde(default = "default_handshake_attempts")]
    pub handshake_attempts: u32,

    /// Append every patrolled waypoint to the visit log
    #[serde(default = "default_true")]
    pub log_visits: bool,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            profile: FlightProfile::default(),
            handshake_timeout_secs: default_handshake_timeout(),
            handshake_attempts: default_handshake_attempts(),
            log_visits: true,
        }
    }
}

impl DroneConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TowerConfig {
    /// Tower position; defaults to the area center
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    /// Seconds (wall clock, unscaled) a new registration is exempt from liveness checks
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: f64,

    /// Liveness poll interval in simulated seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Lifetime of a published status, in seconds (wall clock, unscaled)
    #[serde(default = "default_status_ttl")]
    pub status_ttl_secs: f64,

    /// Replay the original registration when a drone repeats its handshake
    #[serde(default)]
    pub dedupe_handshakes: bool,

    /// Retry schedule for sectors waiting for a relief drone
    #[serde(default)]
    pub relief_retry: ReliefRetryPolicy,
}

impl Default for TowerConfig {
    fn default() -> Self {
        Self {
            position: None,
            grace_period_secs: default_grace_period(),
            poll_interval_secs: default_poll_interval(),
            status_ttl_secs: default_status_ttl(),
            dedupe_handshakes: false,
            relief_retry: ReliefRetryPolicy::default(),
        }
    }
}

impl TowerConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs_f64(self.grace_period_secs.max(0.0))
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.status_ttl_secs.max(0.0))
    }
}

/// Exponential backoff, in simulated seconds, between relief attempts for one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliefRetryPolicy {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: f64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: f64,
}

impl Default for ReliefRetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl ReliefRetryPolicy {
    /// Delay before the attempt following `failed_attempts` failures.
    pub fn backoff_secs(&self, failed_attempts: u32) -> f64 {
        let exponent = failed_attempts.saturating_sub(1).min(30) as i32;
        (self.initial_backoff_secs * 2f64.powi(exponent)).min(self.max_backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Divisor applied to every simulated duration
    #[serde(default)]
    pub time_scale: TimeScale,

    /// Drones launched by `skywatch simulate`
    #[serde(default = "default_drone_count")]
    pub drone_count: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_scale: TimeScale::default(),
            drone_count: default_drone_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Time budget of a single route solve, in seconds
    #[serde(default = "default_solver_budget")]
    pub time_budget_secs: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: default_solver_budget(),
        }
    }
}

impl SolverConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs_f64(self.time_budget_secs.max(0.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Messages buffered per channel before slow subscribers lag
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for FleetConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "skywatch-fleet".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: FleetConfigSpec::default(),
        }
    }
}

impl FleetConfigSpec {
    /// Tower position, falling back to the area center.
    pub fn tower_position(&self) -> Position {
        self.tower.position.unwrap_or_else(|| self.area.center())
    }

    pub fn logging(&self) -> LoggingConfig {
        self.observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_default()
    }
}

impl FleetConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// First existing fleet config among `$SKYWATCH_CONFIG_PATH`,
    /// `./skywatch-config.yaml`, `~/.skywatch/config.yaml` and
    /// `/etc/skywatch/config.yaml`.
    pub fn discover_config() -> Option<PathBuf> {
        let mut candidates = Vec::with_capacity(4);
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            candidates.push(PathBuf::from(path));
        }
        candidates.push(PathBuf::from(LOCAL_CONFIG_FILE));
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".skywatch").join("config.yaml"));
        }
        candidates.push(PathBuf::from("/etc/skywatch/config.yaml"));

        candidates.into_iter().find(|path| path.is_file())
    }

    /// Read `path`, or the discovered file when `path` is `None`, falling back
    /// to defaults when nothing is found. Environment overrides apply last.
    ///
    /// An explicit `path` that cannot be read or parsed is an error.
    pub fn load_or_default(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let source = path.or_else(Self::discover_config);
        let mut manifest = match &source {
            Some(path) => {
                let manifest = Self::from_yaml_file(path)
                    .with_context(|| format!("Cannot load fleet config {}", path.display()))?;
                tracing::info!(
                    path = %path.display(),
                    fleet = %manifest.metadata.name,
                    "Fleet config loaded"
                );
                manifest
            }
            None => {
                tracing::debug!("No fleet config file found, using built-in defaults");
                Self::default()
            }
        };
        manifest.apply_env_overrides();
        Ok(manifest)
    }

    /// `SKYWATCH_TIME_SCALE` and `SKYWATCH_DEDUPE_HANDSHAKES`; unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(TIME_SCALE_ENV) {
            match raw.parse::<f64>().ok().and_then(|v| TimeScale::new(v).ok()) {
                Some(scale) => {
                    tracing::info!(time_scale = scale.factor(), "Time scale set from {}", TIME_SCALE_ENV);
                    self.spec.simulation.time_scale = scale;
                }
                None => tracing::warn!(
                    value = %raw,
                    "{} is not a positive number, keeping x{}",
                    TIME_SCALE_ENV,
                    self.spec.simulation.time_scale.factor()
                ),
            }
        }

        if let Ok(raw) = std::env::var(DEDUPE_HANDSHAKES_ENV) {
            match parse_flag(&raw) {
                Some(dedupe) => {
                    tracing::info!(dedupe, "Handshake dedupe set from {}", DEDUPE_HANDSHAKES_ENV);
                    self.spec.tower.dedupe_handshakes = dedupe;
                }
                None => {
                    tracing::warn!(value = %raw, "{} is not a boolean, ignoring it", DEDUPE_HANDSHAKES_ENV)
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;
        spec.area
            .validate()
            .map_err(|e| anyhow::anyhow!("spec.area: {}", e))?;

        let profile = &spec.drone.profile;
        if !(profile.speed_kmh > 0.0) {
            anyhow::bail!("spec.drone.speed_kmh must be positive");
        }
        if !(profile.flight_autonomy_minutes > 0.0) {
            anyhow::bail!("spec.drone.flight_autonomy_minutes must be positive");
        }
        if profile.recharge_time_min_hours < 0.0
            || profile.recharge_time_max_hours < profile.recharge_time_min_hours
        {
            anyhow::bail!(
                "spec.drone recharge range [{}, {}] hours is invalid",
                profile.recharge_time_min_hours,
                profile.recharge_time_max_hours
            );
        }
        if spec.drone.handshake_attempts == 0 {
            anyhow::bail!("spec.drone.handshake_attempts must be at least 1");
        }

        if !(spec.tower.status_ttl_secs > 0.0) {
            anyhow::bail!("spec.tower.status_ttl_secs must be positive");
        }
        if !(spec.tower.poll_interval_secs > 0.0) {
            anyhow::bail!("spec.tower.poll_interval_secs must be positive");
        }
        let retry = &spec.tower.relief_retry;
        if !(retry.initial_backoff_secs > 0.0) || retry.max_backoff_secs < retry.initial_backoff_secs {
            anyhow::bail!("spec.tower.relief_retry backoff range is invalid");
        }

        if spec.bus.channel_capacity == 0 {
            anyhow::bail!("spec.bus.channel_capacity must be positive");
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_true() -> bool {
    true
}

fn default_handshake_timeout() -> u64 {
    5
}

fn default_handshake_attempts() -> u32 {
    5
}

fn default_grace_period() -> f64 {
    5.0
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_status_ttl() -> f64 {
    3.0
}

fn default_initial_backoff() -> f64 {
    5.0
}

fn default_max_backoff() -> f64 {
    120.0
}

fn default_drone_count() -> usize {
    8
}

fn default_solver_budget() -> f64 {
    3.0
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
