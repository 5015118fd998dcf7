// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use skywatch::commands::config::{handle_command, ConfigCommand};
use skywatch::embedded::{run_simulation, EmbeddedFleet};
use skywatch_core::domain::config::{FleetConfigManifest, FleetConfigSpec};
use skywatch_core::domain::{DroneId, DroneState, GridSpec, SectorId, TimeScale};
use tempfile::tempdir;

fn fleet_spec(area: f64) -> FleetConfigSpec {
    let mut spec = FleetConfigSpec::default();
    spec.area = GridSpec::new(area);
    spec.simulation.time_scale = TimeScale::REAL_TIME;
    spec
}

#[tokio::test(start_paused = true)]
async fn test_fleet_reaches_start_and_patrols() {
    let report = run_simulation(fleet_spec(400.0), 4, 300.0).await.unwrap();

    assert_eq!(report.sectors, 4);
    assert_eq!(report.assignments.len(), 4);
    assert!(report.epoch_started);
    assert!(report.visits_logged > 0);
    for drone in &report.drones {
        assert_eq!(drone.state, DroneState::Monitoring, "{drone:?}");
        assert!(drone.battery_level < 100.0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_extra_drones_stand_by_ready() {
    let report = run_simulation(fleet_spec(200.0), 3, 120.0).await.unwrap();

    assert_eq!(report.assignments.len(), 1);
    assert_eq!(report.waiting.len(), 2);
    let ready = report
        .drones
        .iter()
        .filter(|d| d.state == DroneState::Ready)
        .count();
    assert_eq!(ready, 2);
}

#[tokio::test(start_paused = true)]
async fn test_spare_drone_relieves_patrol() {
    let mut fleet = EmbeddedFleet::start(fleet_spec(200.0)).await.unwrap();
    fleet.launch(1);
    // The spare registers second and never owns a sector at first
    fleet.fly_for(5.0, |_| {}).await;
    fleet.launch(1);

    fleet.fly_for(1795.0, |_| {}).await;
    let report = fleet.report(1800.0).await.unwrap();

    let first = fleet.agents()[0].clone();
    let spare = fleet.agents()[1].clone();
    assert_eq!(first.id(), Some(DroneId(1)));
    assert_eq!(spare.id(), Some(DroneId(2)));
    assert_eq!(report.assignments, vec![(SectorId(0), DroneId(2))]);
    assert_eq!(spare.state(), DroneState::Monitoring);
    assert!(matches!(
        first.state(),
        DroneState::Returning | DroneState::Charging
    ));
    assert!(report.pending_reliefs.is_empty());

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sole_drone_patrols_again_after_recharge() {
    let mut fleet = EmbeddedFleet::start(fleet_spec(200.0)).await.unwrap();
    fleet.launch(1);
    let drone = fleet.agents()[0].clone();

    let mut charged = false;
    let mut minutes = 0;
    while minutes < 6 * 60 {
        fleet.fly_for(60.0, |_| {}).await;
        minutes += 1;
        match drone.state() {
            DroneState::Charging => charged = true,
            DroneState::Monitoring if charged => break,
            DroneState::Offline => panic!("battery ran out after {minutes} min"),
            _ => {}
        }
    }

    assert!(charged);
    assert_eq!(drone.state(), DroneState::Monitoring, "after {minutes} min");
    assert!(drone.battery_level() > 90.0);
    let report = fleet.report(minutes as f64 * 60.0).await.unwrap();
    assert_eq!(report.assignments, vec![(SectorId(0), DroneId(1))]);
    assert!(report.pending_reliefs.is_empty());

    fleet.shutdown().await;
}

#[tokio::test]
async fn test_generated_config_validates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("skywatch-config.yaml");

    handle_command(
        ConfigCommand::Generate {
            output: path.clone(),
        },
        None,
    )
    .await
    .unwrap();

    let manifest = FleetConfigManifest::from_yaml_file(&path).unwrap();
    manifest.validate().unwrap();
    assert_eq!(manifest.spec.area.area_size, 6000.0);

    handle_command(ConfigCommand::Validate { file: Some(path) }, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_validate_rejects_bad_area() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(
        &path,
        "apiVersion: skywatch/v1\nkind: FleetConfig\nmetadata:\n  name: bad\nspec:\n  area:\n    area_size: 250\n",
    )
    .unwrap();

    let result = handle_command(ConfigCommand::Validate { file: Some(path) }, None).await;
    assert!(result.is_err());
}
