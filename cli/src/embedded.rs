// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded fleet
//!
//! Runs a tower and its drones in-process over the in-memory bus.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use skywatch_core::application::TourPlanner;
use skywatch_core::domain::config::FleetConfigSpec;
use skywatch_core::domain::messages::VISIT_LOG;
use skywatch_core::domain::{DroneId, DroneState, MessageBus, Position, SectorGrid, SectorId};
use skywatch_core::infrastructure::{InMemoryMessageBus, NearestNeighbourSolver};
use skywatch_drone::{AgentError, AgentSettings, DroneAgent, DroneClient};
use skywatch_swarm::{TowerOrchestrator, TowerSettings};

/// Per-drone line of a simulation report.
#[derive(Debug, Clone, Serialize)]
pub struct DroneReport {
    pub drone_id: Option<DroneId>,
    pub state: DroneState,
    pub battery_level: f64,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub simulated_secs: f64,
    pub sectors: usize,
    pub assignments: Vec<(SectorId, DroneId)>,
    pub waiting: Vec<DroneId>,
    pub pending_reliefs: Vec<SectorId>,
    pub epoch_started: bool,
    pub drones: Vec<DroneReport>,
    pub visits_logged: usize,
}

pub struct EmbeddedFleet {
    spec: FleetConfigSpec,
    bus: Arc<InMemoryMessageBus>,
    tower: TowerOrchestrator,
    sectors: usize,
    agents: Vec<DroneAgent>,
    flights: Vec<JoinHandle<Result<DroneState, AgentError>>>,
}

impl EmbeddedFleet {
    /// Build the grid, plan the tours and start the tower.
    pub async fn start(spec: FleetConfigSpec) -> Result<Self> {
        let mut grid = SectorGrid::build(&spec.area, spec.drone.profile.speed_mps())
            .context("Failed to build sector grid")?;

        let planner = TourPlanner::new(
            Arc::new(NearestNeighbourSolver::new()),
            spec.solver.time_budget(),
        );
        if let Err(e) = planner.plan(&mut grid) {
            warn!("Tour planning failed, drones will hover at sector entries: {}", e);
        }

        let sectors = grid.len();
        let bus = Arc::new(InMemoryMessageBus::new(spec.bus.channel_capacity));
        let tower = TowerOrchestrator::new(
            bus.clone(),
            grid.into_sectors(),
            TowerSettings::from_config(&spec),
        );
        tower.start().await.context("Failed to start tower")?;

        Ok(Self {
            spec,
            bus,
            tower,
            sectors,
            agents: Vec::new(),
            flights: Vec::new(),
        })
    }

    pub fn tower(&self) -> &TowerOrchestrator {
        &self.tower
    }

    pub fn agents(&self) -> &[DroneAgent] {
        &self.agents
    }

    /// Launch `count` more drones.
    pub fn launch(&mut self, count: usize) {
        let settings = AgentSettings::from_config(&self.spec);
        for _ in 0..count {
            let client = DroneClient::new(self.bus.clone(), settings.status_ttl);
            let agent = DroneAgent::new(client, settings.clone());
            let runner = agent.clone();
            self.flights.push(tokio::spawn(async move { runner.run().await }));
            self.agents.push(agent);
        }
        info!(drones = self.agents.len(), "Drones launched");
    }

    /// Let the fleet fly for `simulated_secs`, reporting progress once per simulated minute.
    pub async fn fly_for(&self, simulated_secs: f64, mut on_progress: impl FnMut(f64)) {
        let time_scale = self.spec.simulation.time_scale;
        let step = 60.0_f64.min(simulated_secs.max(0.0));
        let mut elapsed = 0.0;
        while elapsed < simulated_secs {
            let slice = step.min(simulated_secs - elapsed).max(f64::EPSILON);
            tokio::time::sleep(time_scale.to_wall(slice)).await;
            elapsed += slice;
            on_progress(elapsed.min(simulated_secs));
        }
    }

    pub async fn report(&self, simulated_secs: f64) -> Result<SimulationReport> {
        let snapshot = self.tower.snapshot();
        let visits_logged = self
            .bus
            .range(VISIT_LOG, 0, None)
            .await
            .context("Failed to read visit log")?
            .len();
        let drones = self
            .agents
            .iter()
            .map(|agent| DroneReport {
                drone_id: agent.id(),
                state: agent.state(),
                battery_level: agent.battery_level(),
                position: agent.position(),
            })
            .collect();

        Ok(SimulationReport {
            simulated_secs,
            sectors: self.sectors,
            assignments: snapshot.assignments,
            waiting: snapshot.waiting,
            pending_reliefs: snapshot.pending_reliefs,
            epoch_started: snapshot.epoch_started,
            drones,
            visits_logged,
        })
    }

    /// Terminate every drone, then the tower.
    pub async fn shutdown(self) {
        for agent in &self.agents {
            agent.terminate();
        }
        for flight in self.flights {
            match tokio::time::timeout(Duration::from_secs(5), flight).await {
                Ok(Ok(Ok(_))) => {}
                Ok(Ok(Err(e))) => warn!("Drone stopped with error: {}", e),
                Ok(Err(e)) => warn!("Drone task failed: {}", e),
                Err(_) => warn!("Drone did not stop in time"),
            }
        }
        self.tower.shutdown().await;
    }
}

/// Start a fleet of `drones`, fly it for `simulated_secs` and report.
pub async fn run_simulation(
    spec: FleetConfigSpec,
    drones: usize,
    simulated_secs: f64,
) -> Result<SimulationReport> {
    let mut fleet = EmbeddedFleet::start(spec).await?;
    fleet.launch(drones);
    fleet.fly_for(simulated_secs, |_| {}).await;
    let report = fleet.report(simulated_secs).await;
    fleet.shutdown().await;
    report
}
