// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::Utc;
use skywatch_core::domain::messages::{
    self, Handshake, InitMessage, ReliefNotice, ReliefRequest, SectorAssignment, StatusMessage,
    BROADCAST_CHANNEL, HANDSHAKE_CHANNEL, RELIEF_CHANNEL,
};
use skywatch_core::domain::{
    BusError, DroneId, DroneState, GridSpec, MessageBus, Position, SectorGrid, SectorId, TimeScale,
};
use skywatch_core::infrastructure::InMemoryMessageBus;
use skywatch_swarm::{TowerOrchestrator, TowerSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

const STATUS_TTL: Duration = Duration::from_secs(3);

fn settings(area: f64) -> TowerSettings {
    TowerSettings {
        tower_position: Position::new(area / 2.0, area / 2.0),
        time_scale: TimeScale::REAL_TIME,
        grace_period: Duration::from_secs(5),
        poll_interval_secs: 1.0,
        ..TowerSettings::default()
    }
}

async fn start_tower(area: f64, settings: TowerSettings) -> (Arc<InMemoryMessageBus>, TowerOrchestrator) {
    let grid = SectorGrid::build(&GridSpec::new(area), 30.0 / 3.6).unwrap();
    let bus = Arc::new(InMemoryMessageBus::new(64));
    let tower = TowerOrchestrator::new(bus.clone(), grid.into_sectors(), settings);
    tower.start().await.unwrap();
    (bus, tower)
}

async fn handshake_as(bus: &InMemoryMessageBus, drone_uuid: Uuid) -> Result<InitMessage, String> {
    let channel = messages::init_channel(&drone_uuid);
    let mut init = bus.subscribe(&channel).await.unwrap();
    let payload = messages::encode(&Handshake { drone_uuid }).unwrap();
    bus.publish(HANDSHAKE_CHANNEL, &payload).await.unwrap();
    let reply = timeout(Duration::from_secs(2), init.recv())
        .await
        .map_err(|_| "no init reply".to_string())?
        .map_err(|e| e.to_string())?;
    Ok(messages::decode(&channel, &reply).unwrap())
}

async fn handshake(bus: &InMemoryMessageBus) -> InitMessage {
    handshake_as(bus, Uuid::new_v4()).await.unwrap()
}

async fn report(bus: &InMemoryMessageBus, drone_id: DroneId, state: DroneState) {
    let status = StatusMessage {
        drone_id,
        position: Position::default(),
        battery_level: 80.0,
        state,
        timestamp: Utc::now(),
    };
    bus.set_with_ttl(
        &messages::status_key(drone_id),
        &messages::encode(&status).unwrap(),
        STATUS_TTL,
    )
    .await
    .unwrap();
}

async fn request_relief(bus: &InMemoryMessageBus, drone_id: DroneId) {
    let payload = messages::encode(&ReliefRequest { drone_id }).unwrap();
    bus.publish(RELIEF_CHANNEL, &payload).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_handshake_assigns_sector_until_full() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;

    let first = handshake(&bus).await;
    assert_eq!(first.drone_id, DroneId(1));
    assert_eq!(first.tower_position, Position::new(100.0, 100.0));
    let assignment = first.assignment().expect("first drone gets the only sector");
    let sector_start = tower.inspect(|r| r.sectors()[0].starting_point());
    assert_eq!(assignment.starting_point, sector_start);
    assert!(assignment.timer > 0.0);

    let second = handshake(&bus).await;
    assert_eq!(second.drone_id, DroneId(2));
    assert!(second.assignment().is_none());
    assert!(second.timer.is_none() && second.tour.is_none());

    let snapshot = tower.snapshot();
    assert_eq!(snapshot.assignments, vec![(SectorId(0), DroneId(1))]);
    assert_eq!(snapshot.waiting, vec![DroneId(2)]);
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_handshake_is_dropped() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;

    bus.publish(HANDSHAKE_CHANNEL, "not json").await.unwrap();
    bus.publish(HANDSHAKE_CHANNEL, r#"{"drone_uuid":"x","extra":1}"#)
        .await
        .unwrap();

    let init = handshake(&bus).await;
    assert_eq!(init.drone_id, DroneId(1));
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeated_handshake_without_dedupe_registers_twice() {
    let (bus, tower) = start_tower(400.0, settings(400.0)).await;
    let uuid = Uuid::new_v4();

    let first = handshake_as(&bus, uuid).await.unwrap();
    let second = handshake_as(&bus, uuid).await.unwrap();
    assert_ne!(first.drone_id, second.drone_id);
    assert_eq!(tower.snapshot().assignments.len(), 2);
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeated_handshake_with_dedupe_replays_registration() {
    let settings = TowerSettings {
        dedupe_handshakes: true,
        ..settings(400.0)
    };
    let (bus, tower) = start_tower(400.0, settings).await;
    let uuid = Uuid::new_v4();

    let first = handshake_as(&bus, uuid).await.unwrap();
    let second = handshake_as(&bus, uuid).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(tower.snapshot().assignments.len(), 1);
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_drone_is_released_after_grace_period() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;
    let init = handshake(&bus).await;

    sleep(Duration::from_secs(3)).await;
    assert!(tower.inspect(|r| r.is_active(init.drone_id)));

    sleep(Duration::from_secs(4)).await;
    let snapshot = tower.snapshot();
    assert!(snapshot.active.is_empty());
    assert!(snapshot.assignments.is_empty());
    assert_eq!(snapshot.pending_reliefs, vec![SectorId(0)]);
    assert!(tower.inspect(|r| r.record(init.drone_id).is_none()));

    let next = handshake(&bus).await;
    assert_eq!(next.drone_id, DroneId(2));
    assert!(next.assignment().is_some());
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reporting_drone_stays_registered() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;
    let init = handshake(&bus).await;

    for _ in 0..10 {
        report(&bus, init.drone_id, DroneState::Arriving).await;
        sleep(Duration::from_secs(1)).await;
    }
    assert!(tower.inspect(|r| r.is_active(init.drone_id)));
    let state = tower.inspect(|r| r.record(init.drone_id).and_then(|rec| rec.last_state()));
    assert_eq!(state, Some(DroneState::Arriving));
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_waits_for_every_active_drone() {
    let (bus, tower) = start_tower(400.0, settings(400.0)).await;
    let mut broadcast = bus.subscribe(BROADCAST_CHANNEL).await.unwrap();
    let one = handshake(&bus).await.drone_id;
    let two = handshake(&bus).await.drone_id;

    report(&bus, one, DroneState::Waiting).await;
    report(&bus, two, DroneState::Arriving).await;
    sleep(Duration::from_secs(2)).await;
    assert_eq!(broadcast.try_recv(), Err(BusError::Empty));
    assert!(!tower.snapshot().epoch_started);

    report(&bus, one, DroneState::Waiting).await;
    report(&bus, two, DroneState::Waiting).await;
    let token = timeout(Duration::from_secs(2), broadcast.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token, "START");
    assert!(tower.snapshot().epoch_started);
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_relief_hands_sector_to_ready_drone() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;
    let owner = handshake(&bus).await.drone_id;
    let spare = handshake(&bus).await.drone_id;

    report(&bus, owner, DroneState::Monitoring).await;
    report(&bus, spare, DroneState::Ready).await;
    sleep(Duration::from_millis(1500)).await;

    let mut resume = bus.subscribe(&messages::resume_channel(spare)).await.unwrap();
    let mut relieved = bus.subscribe(&messages::relieved_channel(owner)).await.unwrap();
    request_relief(&bus, owner).await;

    let payload = timeout(Duration::from_secs(1), resume.recv()).await.unwrap().unwrap();
    let assignment: SectorAssignment =
        messages::decode(&messages::resume_channel(spare), &payload).unwrap();
    assert_eq!(
        assignment.starting_point,
        tower.inspect(|r| r.sectors()[0].starting_point())
    );

    let snapshot = tower.snapshot();
    assert_eq!(snapshot.assignments, vec![(SectorId(0), spare)]);
    assert_eq!(snapshot.active, vec![spare]);
    assert_eq!(snapshot.waiting, vec![owner]);

    report(&bus, owner, DroneState::Returning).await;
    report(&bus, spare, DroneState::Monitoring).await;
    let payload = timeout(Duration::from_secs(2), relieved.recv()).await.unwrap().unwrap();
    let notice: ReliefNotice =
        messages::decode(&messages::relieved_channel(owner), &payload).unwrap();
    assert_eq!(notice.relieved_by, spare);
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_undelivered_resume_returns_sector_to_owner() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;
    let owner = handshake(&bus).await.drone_id;
    let spare = handshake(&bus).await.drone_id;

    report(&bus, owner, DroneState::Monitoring).await;
    report(&bus, spare, DroneState::Ready).await;
    sleep(Duration::from_millis(1500)).await;

    // Nobody listens on the spare's resume channel
    request_relief(&bus, owner).await;
    sleep(Duration::from_millis(100)).await;

    let snapshot = tower.snapshot();
    assert_eq!(snapshot.assignments, vec![(SectorId(0), owner)]);
    assert_eq!(snapshot.pending_reliefs, vec![SectorId(0)]);
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_deferred_relief_is_retried_when_a_drone_becomes_ready() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;
    let owner = handshake(&bus).await.drone_id;
    report(&bus, owner, DroneState::Monitoring).await;
    sleep(Duration::from_millis(1500)).await;

    request_relief(&bus, owner).await;
    sleep(Duration::from_millis(100)).await;
    let snapshot = tower.snapshot();
    assert_eq!(snapshot.assignments, vec![(SectorId(0), owner)]);
    assert_eq!(snapshot.pending_reliefs, vec![SectorId(0)]);

    let spare = handshake(&bus).await.drone_id;
    let mut resume = bus.subscribe(&messages::resume_channel(spare)).await.unwrap();
    for _ in 0..7 {
        report(&bus, owner, DroneState::Monitoring).await;
        report(&bus, spare, DroneState::Ready).await;
        sleep(Duration::from_secs(1)).await;
    }

    let payload = timeout(Duration::from_secs(1), resume.recv()).await.unwrap().unwrap();
    assert!(messages::decode::<SectorAssignment>("resume", &payload).is_ok());
    let snapshot = tower.snapshot();
    assert_eq!(snapshot.assignments, vec![(SectorId(0), spare)]);
    assert!(snapshot.pending_reliefs.is_empty());
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_recharged_owner_resumes_its_deferred_sector() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;
    let owner = handshake(&bus).await.drone_id;
    let mut resume = bus.subscribe(&messages::resume_channel(owner)).await.unwrap();
    let mut relieved = bus.subscribe(&messages::relieved_channel(owner)).await.unwrap();
    report(&bus, owner, DroneState::Monitoring).await;
    sleep(Duration::from_millis(1500)).await;

    request_relief(&bus, owner).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(tower.snapshot().pending_reliefs, vec![SectorId(0)]);

    for _ in 0..8 {
        report(&bus, owner, DroneState::Ready).await;
        sleep(Duration::from_secs(1)).await;
    }

    let payload = timeout(Duration::from_secs(1), resume.recv()).await.unwrap().unwrap();
    let assignment: SectorAssignment = messages::decode("resume", &payload).unwrap();
    assert_eq!(assignment.timer, tower.inspect(|reg| reg.sectors()[0].timer()));
    let snapshot = tower.snapshot();
    assert_eq!(snapshot.assignments, vec![(SectorId(0), owner)]);
    assert_eq!(snapshot.active, vec![owner]);
    assert!(snapshot.pending_reliefs.is_empty());

    report(&bus, owner, DroneState::Monitoring).await;
    sleep(Duration::from_secs(2)).await;
    assert_eq!(relieved.try_recv(), Err(BusError::Empty));
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_send_command_queues_for_drone() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;

    tower.send_command(DroneId(3), "RETURN").await.unwrap();
    let popped = bus
        .pop_blocking(&messages::command_queue(DroneId(3)), Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(popped.as_deref(), Some("RETURN"));
    tower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_listeners() {
    let (bus, tower) = start_tower(200.0, settings(200.0)).await;
    tower.shutdown().await;

    assert!(handshake_as(&bus, Uuid::new_v4()).await.is_err());
    assert_eq!(bus.subscriber_count(HANDSHAKE_CHANNEL), 0);
}
