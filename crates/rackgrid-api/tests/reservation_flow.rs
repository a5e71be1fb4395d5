//! Reservations racing each other and the health scheduler on one on-disk table.

use std::sync::Arc;
use std::time::Duration;

use rackgrid_api::{DeskError, ReservationManager, snapshot};
use rackgrid_health::testing::ScriptedChannel;
use rackgrid_health::{
    ConnectionManager, Health, HealthScheduler, HealthTable, ProbeCommand, SchedulePolicy,
};
use rackgrid_state::{DeviceLedger, DeviceRecord, Tag};
use tokio::sync::watch;

fn seeded_ledger(dir: &tempfile::TempDir) -> DeviceLedger {
    let ledger =
        DeviceLedger::open(&dir.path().join("devices.redb"), Duration::from_secs(10)).unwrap();
    ledger
        .replace_all(vec![
            DeviceRecord::new("sw-1", "10.0.0.1"),
            DeviceRecord::new("sw-2", "10.0.0.2"),
        ])
        .unwrap();
    ledger
}

#[test]
fn concurrent_reserve_has_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    seeded_ledger(&dir);
    let path = dir.path().join("devices.redb");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            // Each contender opens its own handle, as separate processes would.
            let ledger = DeviceLedger::open(&path, Duration::from_secs(10)).unwrap();
            std::thread::spawn(move || {
                let desk = ReservationManager::new(ledger, HealthTable::new());
                desk.reserve("sw-1", &format!("user-{i}"), 30)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(DeskError::Conflict(_))))
    );

    let ledger = DeviceLedger::open(&path, Duration::from_secs(10)).unwrap();
    let row = ledger.find("sw-1").unwrap().unwrap();
    assert_eq!(row.tag, Tag::Resv);
    assert_eq!(row.current_user, winners[0].user);
}

#[tokio::test]
async fn reservations_and_health_checks_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = seeded_ledger(&dir);

    let channel = ScriptedChannel::new();
    channel.set_status("10.0.0.2", 1);
    let health = HealthTable::new();
    let connection = Arc::new(ConnectionManager::new(
        channel.clone(),
        Duration::from_secs(1),
        Duration::from_millis(100),
    ));
    let policy = SchedulePolicy {
        up_interval: Duration::from_millis(200),
        down_interval: Duration::from_millis(50),
        idle_interval: Duration::from_millis(10),
        ..SchedulePolicy::default()
    };
    let scheduler = HealthScheduler::new(
        ledger.clone(),
        connection,
        health.clone(),
        policy,
        ProbeCommand::new("probe {ip}"),
    );
    let (stop_tx, stop_rx) = watch::channel(false);
    let run = tokio::spawn(scheduler.run(stop_rx));

    let desk = ReservationManager::new(ledger.clone(), health.clone());
    for round in 0..5 {
        desk.reserve("sw-1", &format!("round-{round}"), 15).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        desk.release("sw-1").unwrap();
    }
    desk.reserve("sw-2", "erin", 60).unwrap();
    desk.refresh_health_now("sw-2").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let views = snapshot(&ledger, &health).await.unwrap();
    let sw1 = views.iter().find(|v| v.record.device_id == "sw-1").unwrap();
    let sw2 = views.iter().find(|v| v.record.device_id == "sw-2").unwrap();
    assert_eq!(sw1.health, Health::Up);
    assert_eq!(sw1.record.tag, Tag::Free);
    assert_eq!(sw2.health, Health::Down);
    assert!(sw2.resv_block.starts_with("User: erin, Duration: 1hrs,0mins"));

    stop_tx.send(true).unwrap();
    run.await.unwrap();
    assert!(health.is_empty().await);
    assert!(channel.probes_of("10.0.0.1") >= 1);
}
