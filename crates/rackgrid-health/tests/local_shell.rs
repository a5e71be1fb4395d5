//! Scheduler against a real local shell and an on-disk ledger.

use std::sync::Arc;
use std::time::Duration;

use rackgrid_health::{
    ConnectionManager, Health, HealthScheduler, HealthTable, ProbeCommand, SchedulePolicy,
    ShellChannel,
};
use rackgrid_state::{DeviceLedger, DeviceRecord};

#[tokio::test]
async fn probes_run_through_one_local_shell() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = DeviceLedger::open(&dir.path().join("devices.redb"), Duration::from_secs(2)).unwrap();
    ledger
        .replace_all(vec![
            DeviceRecord::new("sw-1", "10.0.0.1"),
            DeviceRecord::new("sw-2", "10.0.0.2"),
            DeviceRecord::new("sw-3", "not-an-address"),
        ])
        .unwrap();

    let connection = Arc::new(ConnectionManager::new(
        ShellChannel::local(),
        Duration::from_secs(5),
        Duration::from_secs(1),
    ));
    let scheduler = HealthScheduler::new(
        ledger,
        Arc::clone(&connection),
        HealthTable::new(),
        SchedulePolicy::default(),
        // Only 10.0.0.2 "fails".
        ProbeCommand::new("[ {ip} != 10.0.0.2 ]"),
    );
    scheduler.init().await;

    let report = scheduler.tick().await;
    assert_eq!(report.up, 1);
    assert_eq!(report.down, 1);
    assert_eq!(report.unaddressable, 1);

    let table = scheduler.table();
    assert_eq!(table.get("sw-1").await.unwrap().health, Health::Up);
    let sw2 = table.get("sw-2").await.unwrap();
    assert_eq!((sw2.health, sw2.retry_count), (Health::Down, 1));
    assert_eq!(table.get("sw-3").await.unwrap().health, Health::Unknown);

    assert!(connection.is_connected().await);
    connection.close().await;
    assert!(!connection.is_connected().await);
}

#[tokio::test]
async fn slow_probe_times_out_without_losing_the_shell() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = DeviceLedger::open(&dir.path().join("devices.redb"), Duration::from_secs(2)).unwrap();
    ledger
        .replace_all(vec![DeviceRecord::new("sw-1", "10.0.0.1")])
        .unwrap();

    let connection = Arc::new(ConnectionManager::new(
        ShellChannel::local(),
        Duration::from_secs(5),
        Duration::from_secs(1),
    ));
    let policy = SchedulePolicy {
        probe_timeout: Duration::from_millis(100),
        ..SchedulePolicy::default()
    };
    let scheduler = HealthScheduler::new(
        ledger,
        Arc::clone(&connection),
        HealthTable::new(),
        policy,
        ProbeCommand::new("sleep 0.3; true {ip}"),
    );
    scheduler.init().await;

    let report = scheduler.tick().await;
    assert_eq!(report.down, 1);
    assert!(connection.is_connected().await);
    connection.close().await;
}
